use panowalk::command_argument_builder;
use panowalk::handlers::*;
use panowalk_core::data::{Database, SessionStatus, TableCounts};
use panowalk_crawler::{
    Candidate, CrawlConfig, CrawlController, Direction, FrontierStore, GeoPoint, Geofence,
    MemoryFrontier, MemoryVisited, Observation, ReplayStepper, VisitedStore,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

fn sub_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["panowalk"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    sub.clone()
}

fn init_db(dir: &TempDir) -> PathBuf {
    let db_path = dir.path().join("panowalk.db");
    handle_init(&db_path, &sub_matches(&["init"])).unwrap();
    db_path
}

fn write_lines(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

// ============================================================================
// Line Parsing Tests
// ============================================================================

#[test]
fn test_parse_point_line() {
    assert_eq!(
        parse_point_line("48.6930,6.1855"),
        Some(GeoPoint::new(48.6930, 6.1855))
    );
    assert_eq!(
        parse_point_line("  -33.86 , 151.21 "),
        Some(GeoPoint::new(-33.86, 151.21))
    );
}

#[test]
fn test_parse_point_line_invalid() {
    assert_eq!(parse_point_line("not a point"), None);
    assert_eq!(parse_point_line("48.69"), None);
    assert_eq!(parse_point_line("95.0,6.18"), None);
}

#[test]
fn test_parse_replay_line() {
    let obs = parse_replay_line("pano-1,48.6930,6.1855").unwrap();
    assert_eq!(obs.external_id, "pano-1");
    assert_eq!(obs.position, GeoPoint::new(48.6930, 6.1855));

    assert!(parse_replay_line("pano-1").is_none());
    assert!(parse_replay_line("pano-1,north,east").is_none());
}

#[test]
fn test_load_points_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_lines(&[
        "# seed list",
        "48.6930,6.1855",
        "",
        "garbage",
        "48.6940,6.1860",
    ]);

    let points = load_points_from_file(file.path())?;
    assert_eq!(
        points,
        vec![GeoPoint::new(48.6930, 6.1855), GeoPoint::new(48.6940, 6.1860)]
    );
    Ok(())
}

#[test]
fn test_load_points_from_file_empty() {
    let file = write_lines(&["", "   ", "# nothing here"]);
    assert!(load_points_from_file(file.path()).is_err());
}

#[test]
fn test_load_points_from_missing_file() {
    assert!(load_points_from_file(Path::new("/nonexistent/seeds.txt")).is_err());
}

#[test]
fn test_load_replay_from_file() {
    let file = write_lines(&["pano-0,48.6930,6.1855", "pano-1,48.6935,6.1855"]);

    let walk = load_replay_from_file(file.path()).unwrap();
    assert_eq!(walk.len(), 2);
    assert_eq!(walk[1].external_id, "pano-1");
}

#[test]
fn test_resolve_db_path_expands_tilde() {
    let resolved = resolve_db_path("~/panowalk.db");
    assert!(!resolved.to_string_lossy().starts_with('~'));
    assert!(resolved.ends_with("panowalk.db"));

    assert_eq!(resolve_db_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
}

// ============================================================================
// Argument Mapping Tests
// ============================================================================

#[test]
fn test_build_geofence() {
    let center = GeoPoint::new(48.693167, 6.185472);
    let boundary = GeoPoint::new(48.667770, 6.146822);

    let fence = build_geofence(center, None, Some(boundary)).unwrap();
    assert!(fence.contains(boundary));

    let fence = build_geofence(center, Some(500.0), None).unwrap();
    assert!((fence.radius_meters() - 500.0).abs() < 1e-6);

    assert!(build_geofence(center, None, None).is_err());
    assert!(build_geofence(center, Some(-1.0), None).is_err());
}

#[test]
fn test_crawl_config_from_args() {
    let args = sub_matches(&[
        "crawl",
        "--replay",
        "walk.txt",
        "--center",
        "48.69,6.18",
        "--radius",
        "1000",
        "--match-radius",
        "25",
        "--direction",
        "backward",
        "--max-iterations",
        "50",
    ]);

    let config = crawl_config_from_args(&args).unwrap();
    assert_eq!(config.match_radius_m, 25.0);
    assert_eq!(config.initial_direction, Direction::Backward);
    assert_eq!(config.max_iterations, Some(50));
    assert_eq!(config.failure_threshold, CrawlConfig::default().failure_threshold);
}

#[test]
fn test_crawl_requires_radius_or_boundary() {
    let result = command_argument_builder().try_get_matches_from([
        "panowalk",
        "crawl",
        "--replay",
        "walk.txt",
        "--center",
        "48.69,6.18",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_negative_coordinates_are_accepted() {
    let args = sub_matches(&["seed", "--point", "-33.86,151.21"]);
    let points: Vec<GeoPoint> = args.get_many::<GeoPoint>("point").unwrap().copied().collect();
    assert_eq!(points, vec![GeoPoint::new(-33.86, 151.21)]);
}

// ============================================================================
// Handler Tests
// ============================================================================

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    let db_path = init_db(&dir);

    assert!(handle_init(&db_path, &sub_matches(&["init"])).is_err());
    assert!(handle_init(&db_path, &sub_matches(&["init", "--force"])).is_ok());
}

#[test]
fn test_init_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("deeper").join("panowalk.db");

    handle_init(&db_path, &sub_matches(&["init"])).unwrap();
    assert!(Database::open(&db_path).is_ok());
}

#[test]
fn test_seed_from_file_and_points() {
    let dir = TempDir::new().unwrap();
    let db_path = init_db(&dir);
    let file = write_lines(&["48.6930,6.1855", "48.6940,6.1860"]);
    let file_arg = file.path().to_string_lossy().to_string();

    handle_seed(
        &db_path,
        &sub_matches(&["seed", &file_arg, "--point", "48.70,6.19"]),
    )
    .unwrap();

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.pending().unwrap(), 3);
}

#[test]
fn test_seed_requires_existing_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("missing.db");

    let result = handle_seed(&db_path, &sub_matches(&["seed", "--point", "48.70,6.19"]));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_crawl_handler_records_session_and_report() {
    let dir = TempDir::new().unwrap();
    let db_path = init_db(&dir);
    handle_seed(&db_path, &sub_matches(&["seed", "--point", "48.6930,6.1855"])).unwrap();

    let walk = write_lines(&[
        "pano-0,48.6930,6.1855",
        "pano-1,48.6935,6.1855",
        "pano-2,48.6940,6.1855",
    ]);
    let walk_arg = walk.path().to_string_lossy().to_string();
    let report_path = dir.path().join("report.json");
    let report_arg = report_path.to_string_lossy().to_string();

    let args = sub_matches(&[
        "crawl",
        "--replay",
        &walk_arg,
        "--center",
        "48.6930,6.1855",
        "--radius",
        "2000",
        "--format",
        "json",
        "--output",
        &report_arg,
    ]);
    handle_crawl(&db_path, &args, true).await.unwrap();

    let db = Database::open(&db_path).unwrap();
    assert_eq!(VisitedStore::count(&db).unwrap(), 3);
    assert_eq!(db.pending().unwrap(), 0);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    let session = &report["report"]["session"];
    assert_eq!(session["nodes_added"], 3);
    assert_eq!(session["outcome"], "exhausted");

    let session_id = session["session_id"].as_str().unwrap();
    let stored = db.get_session(session_id).unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.nodes_added, 3);
    assert_eq!(db.visited_by_session(session_id).unwrap(), 3);
}

#[tokio::test]
async fn test_failed_totals_come_from_controller_progress() {
    let origin = GeoPoint::new(48.6930, 6.1855);
    let frontier = MemoryFrontier::with_candidates([
        Candidate::new(origin),
        Candidate::new(origin.offset(10.0, 0.0)),
    ]);
    let visited = MemoryVisited::new();
    let walk = vec![
        Observation::new("pano-0", origin),
        Observation::new("pano-1", origin.offset(50.0, 0.0)),
    ];

    let mut controller = CrawlController::new(
        ReplayStepper::new(walk),
        &frontier,
        &visited,
        Geofence::new(origin, 1_000.0).unwrap(),
    )
    .with_config(CrawlConfig::default().with_max_iterations(Some(5)));
    controller.run().await.unwrap();

    let before = TableCounts {
        visited: 4,
        frontier: 2,
    };
    let after = TableCounts {
        visited: 6,
        frontier: 0,
    };
    let totals = failed_totals(&controller, before, after);

    assert_eq!(totals.iterations, controller.state().iteration_count);
    assert_eq!(totals.iterations, 5);
    assert_eq!(totals.candidates_pruned, controller.stats().pruned);
    assert_eq!(totals.nodes_added, 2);
}

#[test]
fn test_reconcile_dry_run_then_apply() {
    let dir = TempDir::new().unwrap();
    let db_path = init_db(&dir);
    {
        let db = Database::open(&db_path).unwrap();
        db.commit("pano-0", GeoPoint::new(48.6930, 6.1855), 30.0)
            .unwrap();
    }
    // Roughly 5m and 1km from the visited node.
    handle_seed(
        &db_path,
        &sub_matches(&[
            "seed",
            "--point",
            "48.69304,6.1855",
            "--point",
            "48.7020,6.1855",
        ]),
    )
    .unwrap();

    handle_reconcile(&db_path, &sub_matches(&["reconcile"])).unwrap();
    assert_eq!(Database::open(&db_path).unwrap().pending().unwrap(), 2);

    handle_reconcile(&db_path, &sub_matches(&["reconcile", "--apply"])).unwrap();
    assert_eq!(Database::open(&db_path).unwrap().pending().unwrap(), 1);
}

#[test]
fn test_summary_handler() {
    let dir = TempDir::new().unwrap();
    let db_path = init_db(&dir);

    assert!(handle_summary(&db_path, &sub_matches(&["summary"])).is_ok());
    assert!(handle_summary(&db_path, &sub_matches(&["summary", "--format", "json"])).is_ok());
}
