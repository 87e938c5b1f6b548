use colored::Colorize;
use panowalk::commands::{DEFAULT_DB_PATH, command_argument_builder};
use panowalk::handlers::{
    handle_crawl, handle_init, handle_reconcile, handle_seed, handle_summary, resolve_db_path,
};
use panowalk_core::print_banner;
use tracing_subscriber::EnvFilter;

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(quiet);

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let db_path = resolve_db_path(
        chosen_command
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(DEFAULT_DB_PATH),
    );

    let result = match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(&db_path, primary_command),
        Some(("seed", primary_command)) => handle_seed(&db_path, primary_command),
        Some(("crawl", primary_command)) => handle_crawl(&db_path, primary_command, quiet).await,
        Some(("summary", primary_command)) => handle_summary(&db_path, primary_command),
        Some(("reconcile", primary_command)) => handle_reconcile(&db_path, primary_command),
        // No subcommand provided, just show the banner
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
