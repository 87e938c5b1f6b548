use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use panowalk_core::data::{Database, SessionStatus, SessionTotals, TableCounts};
use panowalk_core::report::{ReportFormat, SessionReport, save_report};
use panowalk_crawler::{
    Candidate, CrawlConfig, CrawlController, CrawlOutcome, Direction, FrontierStore, GeoPoint,
    Geofence, MaterializeCallback, Observation, ReplayStepper, Stepper, StopSignal, VisitedNode,
    VisitedStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

// Helpers for reading seed lists and recorded walks

fn is_content_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

/// Parse a `lat,lon` line
pub fn parse_point_line(line: &str) -> Option<GeoPoint> {
    match line.trim().parse::<GeoPoint>() {
        Ok(point) => Some(point),
        Err(e) => {
            warn!(line = line.trim(), "Skipping invalid point: {}", e);
            None
        }
    }
}

/// Parse an `id,lat,lon` line
pub fn parse_replay_line(line: &str) -> Option<Observation> {
    let Some((id, rest)) = line.trim().split_once(',') else {
        warn!(line = line.trim(), "Skipping replay line without coordinates");
        return None;
    };
    parse_point_line(rest).map(|position| Observation::new(id.trim(), position))
}

pub fn load_points_from_file(path: &Path) -> Result<Vec<GeoPoint>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;

    let points: Vec<GeoPoint> = content
        .lines()
        .filter(|line| is_content_line(line))
        .filter_map(parse_point_line)
        .collect();

    if points.is_empty() {
        bail!("No valid points found in {}", path.display());
    }
    Ok(points)
}

pub fn load_replay_from_file(path: &Path) -> Result<Vec<Observation>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;

    let walk: Vec<Observation> = content
        .lines()
        .filter(|line| is_content_line(line))
        .filter_map(parse_replay_line)
        .collect();

    if walk.is_empty() {
        bail!("No valid observations found in {}", path.display());
    }
    Ok(walk)
}

pub fn resolve_db_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

pub fn build_geofence(
    center: GeoPoint,
    radius_m: Option<f64>,
    boundary: Option<GeoPoint>,
) -> Result<Geofence> {
    let fence = match (radius_m, boundary) {
        (Some(radius), None) => Geofence::new(center, radius)?,
        (None, Some(boundary)) => Geofence::from_reference_points(center, boundary)?,
        _ => bail!("Provide exactly one of --radius or --boundary"),
    };
    Ok(fence)
}

pub fn crawl_config_from_args(args: &ArgMatches) -> Result<CrawlConfig> {
    let mut config = CrawlConfig::new();

    if let Some(radius) = args.get_one::<f64>("match-radius") {
        if !radius.is_finite() || *radius <= 0.0 {
            bail!("--match-radius must be positive, got {}", radius);
        }
        config = config.with_match_radius(*radius);
    }
    if let Some(threshold) = args.get_one::<u32>("failure-threshold") {
        config = config.with_failure_threshold(*threshold);
    }
    if let Some(direction) = args.get_one::<String>("direction") {
        let direction = Direction::from_str(direction)
            .with_context(|| format!("Unknown direction '{}'", direction))?;
        config = config.with_initial_direction(direction);
    }
    Ok(config.with_max_iterations(args.get_one::<u64>("max-iterations").copied()))
}

/// Partial totals for a session that ended with a fatal error.
pub fn failed_totals<S, F, V>(
    controller: &CrawlController<'_, S, F, V>,
    before: TableCounts,
    after: TableCounts,
) -> SessionTotals
where
    S: Stepper,
    F: FrontierStore,
    V: VisitedStore,
{
    SessionTotals {
        iterations: controller.state().iteration_count,
        nodes_added: after.visited.saturating_sub(before.visited),
        candidates_pruned: controller.stats().pruned,
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn report_format(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

pub fn handle_init(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let force = args.get_flag("force");

    if Database::exists(db_path) {
        if !force {
            bail!(
                "A database already exists at {} (use --force to replace it)",
                db_path.display()
            );
        }
        Database::remove(db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Removed existing database", "✓".green().bold());
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Database::new(db_path)
        .with_context(|| format!("Failed to create database at {}", db_path.display()))?;

    println!(
        "{} Database ready at {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    Ok(())
}

pub fn handle_seed(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let mut points = match args.get_one::<PathBuf>("FILE") {
        Some(file) => load_points_from_file(file)?,
        None => Vec::new(),
    };
    if let Some(extra) = args.get_many::<GeoPoint>("point") {
        points.extend(extra.copied());
    }
    if points.is_empty() {
        bail!("Nothing to seed");
    }

    let db = Database::open(db_path)?;
    let candidates: Vec<Candidate> = points.into_iter().map(Candidate::from).collect();
    let added = db.seed(&candidates)?;

    println!(
        "{} Seeded {} candidate(s), {} pending",
        "✓".green().bold(),
        added,
        db.pending()?
    );
    Ok(())
}

pub async fn handle_crawl(db_path: &Path, args: &ArgMatches, quiet: bool) -> Result<()> {
    let replay_path = args
        .get_one::<PathBuf>("replay")
        .context("--replay is required")?;
    let center = *args
        .get_one::<GeoPoint>("center")
        .context("--center is required")?;
    let fence = build_geofence(
        center,
        args.get_one::<f64>("radius").copied(),
        args.get_one::<GeoPoint>("boundary").copied(),
    )?;
    let config = crawl_config_from_args(args)?;
    let walk = load_replay_from_file(replay_path)?;

    let db = Database::open(db_path)?;
    let before = db.counts()?;
    let session_id = db.create_session(&config, &before)?;
    let db = db.with_session(session_id.clone());

    if !quiet {
        print_divider();
        println!("{}", "  PANOWALK CRAWL".bright_white().bold());
        print_divider();
        println!("Session:      {}", session_id);
        println!("Fence:        {} / {:.0}m", fence.center(), fence.radius_meters());
        println!("Match radius: {}m", config.match_radius_m);
        println!("Replay:       {} observations", walk.len());
        println!(
            "Start:        {} visited, {} pending\n",
            before.visited, before.frontier
        );
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Seeking...");
        spinner
    };

    let visited_count = Arc::new(AtomicU64::new(0));
    let progress = spinner.clone();
    let counter = visited_count.clone();
    let materializer: MaterializeCallback = Arc::new(move |node: &VisitedNode| {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        progress.set_message(format!(
            "{} new node(s), last #{} {} at {}",
            n, node.sequence, node.external_id, node.position
        ));
    });

    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            ctrl_c.stop();
        }
    });

    let started = Instant::now();
    let mut controller = CrawlController::new(ReplayStepper::new(walk), &db, &db, fence)
        .with_config(config)
        .with_materializer(materializer)
        .with_stop_signal(stop);
    let result = controller.run().await;
    let elapsed = started.elapsed();
    spinner.finish_and_clear();

    let after = db.counts()?;
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            db.finish_session(
                &session_id,
                SessionStatus::Failed,
                &failed_totals(&controller, before, after),
            )?;
            return Err(e).context("Crawl aborted");
        }
    };

    let status = match summary.outcome {
        CrawlOutcome::Cancelled => SessionStatus::Cancelled,
        CrawlOutcome::Exhausted | CrawlOutcome::IterationLimit => SessionStatus::Completed,
    };
    db.finish_session(
        &session_id,
        status,
        &SessionTotals {
            iterations: summary.iterations,
            nodes_added: after.visited.saturating_sub(before.visited),
            candidates_pruned: summary.stats.pruned,
        },
    )?;

    let report = SessionReport::new(Some(session_id), &summary, before, after, elapsed);
    let rendered = report.render(report_format(args))?;
    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&rendered, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display()
            );
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

pub fn handle_summary(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = Database::open(db_path)?;
    let summary = db.summary()?;

    if report_format(args) == ReportFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_divider();
    println!("{}", "  DATABASE SUMMARY".bright_white().bold());
    print_divider();
    println!("Database:        {}", db_path.display());
    println!(
        "Visited:         {} ({} with id)",
        summary.visited, summary.visited_with_id
    );
    println!("Frontier:        {}", summary.frontier);
    println!("Sessions:        {}", summary.sessions);
    let schema = if summary.schema_ok {
        "ok".green()
    } else {
        "incomplete".red()
    };
    println!("Schema:          {}", schema);
    Ok(())
}

pub fn handle_reconcile(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let radius = args.get_one::<f64>("radius").copied().unwrap_or(10.0);
    let apply = args.get_flag("apply");
    let limit = args.get_one::<usize>("limit").copied().unwrap_or(20);

    let db = Database::open(db_path)?;
    let overlaps = db.frontier_overlaps(radius, Some(limit))?;
    for overlap in &overlaps {
        println!(
            "  {} {} -> #{} {} ({:.1}m)",
            "•".yellow(),
            overlap.candidate.position,
            overlap.nearest.sequence,
            overlap.nearest.external_id,
            overlap.distance_m
        );
    }

    let count = db.reconcile_frontier(radius, !apply)?;
    if apply {
        println!(
            "{} Removed {} stale candidate(s) within {}m of a visited node",
            "✓".green().bold(),
            count,
            radius
        );
    } else {
        println!(
            "{} {} stale candidate(s) within {}m of a visited node (dry run, use --apply to remove)",
            "→".blue(),
            count,
            radius
        );
    }
    Ok(())
}
