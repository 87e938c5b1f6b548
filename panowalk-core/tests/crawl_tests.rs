// End-to-end crawls over the SQLite stores with a recorded walk

use panowalk_core::data::{Database, SessionStatus, SessionTotals};
use panowalk_crawler::{
    Candidate, CrawlConfig, CrawlController, CrawlOutcome, FrontierStore, GeoPoint, Geofence,
    Observation, ReplayStepper, VisitedNode, VisitedStore,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const ORIGIN: GeoPoint = GeoPoint::new(48.6930, 6.1855);

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

/// Five panoramas 50m apart heading north from the origin.
fn northward_walk() -> Vec<Observation> {
    (0..5)
        .map(|i| Observation::new(format!("pano-{}", i), ORIGIN.offset(50.0 * i as f64, 0.0)))
        .collect()
}

fn config() -> CrawlConfig {
    CrawlConfig::default().with_retry_delay(Duration::ZERO)
}

fn seed_frontier(db: &Database, walk: &[Observation]) {
    db.seed(&[
        Candidate::new(ORIGIN),
        Candidate::new(walk[2].position.offset(0.0, 10.0)),
        Candidate::new(ORIGIN.offset(5_000.0, 0.0)),
    ])
    .unwrap();
}

#[tokio::test]
async fn test_crawl_walk_to_exhaustion() {
    let (_temp_dir, db) = create_test_db();
    let walk = northward_walk();
    seed_frontier(&db, &walk);

    let materialized: Arc<Mutex<Vec<VisitedNode>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = materialized.clone();
    let fence = Geofence::new(ORIGIN, 10_000.0).unwrap();

    let mut controller = CrawlController::new(ReplayStepper::new(walk.clone()), &db, &db, fence)
        .with_config(config())
        .with_materializer(Arc::new(move |node: &VisitedNode| {
            sink.lock().unwrap().push(node.clone());
        }));
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.outcome, CrawlOutcome::Exhausted);
    assert_eq!(summary.stats.accepted, 5);
    assert_eq!(summary.stats.pruned, 1);
    assert_eq!(db.pending().unwrap(), 0);

    let visited = db.visited_nodes().unwrap();
    let ids: Vec<&str> = visited.iter().map(|n| n.external_id.as_str()).collect();
    assert_eq!(ids, vec!["pano-0", "pano-1", "pano-2", "pano-3", "pano-4"]);
    assert_eq!(*materialized.lock().unwrap(), visited);
}

#[tokio::test]
async fn test_resumed_crawl_never_duplicates() {
    let (_temp_dir, db) = create_test_db();
    let walk = northward_walk();
    seed_frontier(&db, &walk);
    let fence = Geofence::new(ORIGIN, 10_000.0).unwrap();

    let mut first = CrawlController::new(ReplayStepper::new(walk.clone()), &db, &db, fence)
        .with_config(config().with_max_iterations(Some(4)));
    let summary = first.run().await.unwrap();
    assert_eq!(summary.outcome, CrawlOutcome::IterationLimit);
    assert_eq!(VisitedStore::count(&db).unwrap(), 1);

    let mut second = CrawlController::new(ReplayStepper::new(walk), &db, &db, fence)
        .with_config(config());
    let summary = second.run().await.unwrap();
    assert_eq!(summary.outcome, CrawlOutcome::Exhausted);

    let visited = db.visited_nodes().unwrap();
    let unique: HashSet<&str> = visited.iter().map(|n| n.external_id.as_str()).collect();
    assert_eq!(unique.len(), visited.len());
    assert_eq!(visited.len(), 4);
}

#[tokio::test]
async fn test_session_bookkeeping_around_crawl() {
    let (_temp_dir, db) = create_test_db();
    let walk = northward_walk();
    seed_frontier(&db, &walk);

    let before = db.counts().unwrap();
    let session_id = db.create_session(&config(), &before).unwrap();
    let db = db.with_session(session_id.clone());

    let fence = Geofence::new(ORIGIN, 10_000.0).unwrap();
    let mut controller = CrawlController::new(ReplayStepper::new(walk), &db, &db, fence)
        .with_config(config());
    let summary = controller.run().await.unwrap();

    let after = db.counts().unwrap();
    db.finish_session(
        &session_id,
        SessionStatus::Completed,
        &SessionTotals {
            iterations: summary.iterations,
            nodes_added: after.visited - before.visited,
            candidates_pruned: summary.stats.pruned,
        },
    )
    .unwrap();

    let session = db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.nodes_added, 5);
    assert_eq!(session.initial_frontier, 3);
    assert_eq!(db.visited_by_session(&session_id).unwrap(), 5);
}

#[tokio::test]
async fn test_crawl_stays_inside_geofence() {
    let (_temp_dir, db) = create_test_db();
    let walk = northward_walk();
    db.seed(&[Candidate::new(ORIGIN)]).unwrap();

    // Only the first three panoramas are inside.
    let fence = Geofence::new(ORIGIN, 120.0).unwrap();
    let mut controller = CrawlController::new(ReplayStepper::new(walk), &db, &db, fence)
        .with_config(config());
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.outcome, CrawlOutcome::Exhausted);
    assert_eq!(summary.stats.out_of_bounds, 1);
    let ids: Vec<String> = db
        .visited_nodes()
        .unwrap()
        .into_iter()
        .map(|n| n.external_id)
        .collect();
    assert_eq!(ids, vec!["pano-0", "pano-1", "pano-2"]);
}
