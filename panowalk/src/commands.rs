use clap::{arg, command};
use panowalk_crawler::GeoPoint;

pub const DEFAULT_DB_PATH: &str = "~/.config/panowalk/panowalk.db";

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("panowalk")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("panowalk")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner, progress and non-essential output").required(false))
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the panowalk database")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Creates the panowalk database on your filesystem")
                .arg(
                    arg!(-f --"force")
                        .help("Replaces any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("seed")
                .about("Adds candidate locations to the frontier")
                .arg(
                    arg!([FILE])
                        .required_unless_present("point")
                        .help("Newline-delimited file of 'lat,lon' candidates")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-p --"point" <LAT_LON>)
                        .required(false)
                        .help("A single 'lat,lon' candidate; may be repeated")
                        .value_parser(clap::value_parser!(GeoPoint))
                        .allow_hyphen_values(true)
                        .action(clap::ArgAction::Append),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Explores the panorama network inside a geofence, starting from the \
                frontier, until the frontier is exhausted or Ctrl-C is pressed.",
                )
                .arg(
                    arg!(-r --"replay" <PATH>)
                        .required(true)
                        .help("Newline-delimited 'id,lat,lon' walk to step through")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-c --"center" <LAT_LON>)
                        .required(true)
                        .help("Geofence center")
                        .value_parser(clap::value_parser!(GeoPoint))
                        .allow_hyphen_values(true),
                )
                .arg(
                    arg!(--"radius" <METERS>)
                        .required_unless_present("boundary")
                        .help("Geofence radius in meters")
                        .value_parser(clap::value_parser!(f64))
                        .conflicts_with("boundary"),
                )
                .arg(
                    arg!(-b --"boundary" <LAT_LON>)
                        .required(false)
                        .help("A point on the geofence boundary")
                        .value_parser(clap::value_parser!(GeoPoint))
                        .allow_hyphen_values(true),
                )
                .arg(
                    arg!(-m --"match-radius" <METERS>)
                        .required(false)
                        .help("Distance under which two locations are the same node")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"failure-threshold" <COUNT>)
                        .required(false)
                        .help("Consecutive failures tolerated before reseeding")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("2"),
                )
                .arg(
                    arg!(-d --"direction" <DIRECTION>)
                        .required(false)
                        .help("Initial step direction")
                        .value_parser(["forward", "backward"])
                        .default_value("forward"),
                )
                .arg(
                    arg!(--"max-iterations" <COUNT>)
                        .required(false)
                        .help("Stop after this many state transitions")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("summary")
                .about("Shows frontier, visited and session totals")
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("reconcile")
                .about("Finds (and optionally removes) frontier candidates that were already visited")
                .arg(
                    arg!(--"radius" <METERS>)
                        .required(false)
                        .help("Distance to the nearest visited node under which a candidate is stale")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"apply")
                        .required(false)
                        .help("Delete the stale candidates (default: dry run)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-l --"limit" <COUNT>)
                        .required(false)
                        .help("How many of the closest overlaps to list")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20"),
                ),
        )
}
