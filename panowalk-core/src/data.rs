use chrono::Utc;
use panowalk_crawler::geo::{BoundingBox, haversine_distance};
use panowalk_crawler::{
    Candidate, CommitOutcome, CrawlConfig, FrontierStore, GeoPoint, RejectReason, StoreError,
    VisitedNode, VisitedStore,
};
use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Result, Transaction, TransactionBehavior,
    params,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits on another session's lock before giving up with
/// `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REQUIRED_TABLES: &[&str] = &["frontier", "visited", "crawl_sessions"];
const REQUIRED_INDEXES: &[&str] = &["idx_frontier_position", "idx_visited_position"];

const FRONTIER_IN_BOX: &str = "SELECT id, latitude, longitude FROM frontier
     WHERE latitude BETWEEN ?1 AND ?2
       AND (longitude BETWEEN ?3 AND ?4 OR longitude BETWEEN ?5 AND ?6)";
const VISITED_POSITIONS_IN_BOX: &str = "SELECT sequence, latitude, longitude FROM visited
     WHERE latitude BETWEEN ?1 AND ?2
       AND (longitude BETWEEN ?3 AND ?4 OR longitude BETWEEN ?5 AND ?6)";
const VISITED_IN_BOX: &str =
    "SELECT sequence, COALESCE(external_id, ''), latitude, longitude FROM visited
     WHERE latitude BETWEEN ?1 AND ?2
       AND (longitude BETWEEN ?3 AND ?4 OR longitude BETWEEN ?5 AND ?6)";

pub struct Database {
    conn: Connection,
    session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSession {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub configuration: Option<String>, // JSON
    pub iterations: u64,
    pub nodes_added: u64,
    pub candidates_pruned: u64,
    pub initial_visited: u64,
    pub initial_frontier: u64,
}

/// Totals recorded on a session row when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub iterations: u64,
    pub nodes_added: u64,
    pub candidates_pruned: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub visited: u64,
    pub frontier: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub visited: u64,
    pub visited_with_id: u64,
    pub frontier: u64,
    pub sessions: u64,
    pub schema_ok: bool,
}

/// A frontier candidate that already has a visited node close by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub candidate_id: i64,
    pub candidate: Candidate,
    pub nearest: VisitedNode,
    pub distance_m: f64,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Maps a SQLite failure onto the store taxonomy. Lock contention and I/O
/// trouble are transient; everything else (missing table, bad schema) means
/// the database is unusable for crawling.
pub fn store_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull
            | ErrorCode::OperationInterrupted,
        ) => StoreError::Fault(err.to_string()),
        _ => StoreError::Fatal(err.to_string()),
    }
}

/// Binds a [`BoundingBox`] to the `?1..?6` placeholders of the `*_IN_BOX`
/// queries.
fn box_params(bbox: &BoundingBox) -> [f64; 6] {
    let [(west_a, east_a), (west_b, east_b)] = bbox.longitude_ranges();
    [bbox.min_lat, bbox.max_lat, west_a, east_a, west_b, east_b]
}

fn within_radius(
    conn: &Connection,
    sql: &str,
    point: GeoPoint,
    radius_m: f64,
) -> Result<Vec<(i64, GeoPoint)>> {
    let bbox = BoundingBox::around(point, radius_m);
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(
            box_params(&bbox),
            |row| Ok((row.get(0)?, GeoPoint::new(row.get(1)?, row.get(2)?))),
        )?
        .collect::<Result<Vec<(i64, GeoPoint)>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(_, p)| haversine_distance(*p, point) <= radius_m)
        .collect())
}

fn nearest_visited(
    conn: &Connection,
    point: GeoPoint,
    radius_m: f64,
) -> Result<Option<(VisitedNode, f64)>> {
    let bbox = BoundingBox::around(point, radius_m);
    let mut stmt = conn.prepare_cached(VISITED_IN_BOX)?;
    let rows = stmt
        .query_map(
            box_params(&bbox),
            |row| {
                Ok(VisitedNode {
                    sequence: row.get::<_, i64>(0)? as u64,
                    external_id: row.get(1)?,
                    position: GeoPoint::new(row.get(2)?, row.get(3)?),
                })
            },
        )?
        .collect::<Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .map(|node| {
            let distance = haversine_distance(node.position, point);
            (node, distance)
        })
        .filter(|(_, distance)| *distance <= radius_m)
        .min_by(|a, b| a.1.total_cmp(&b.1)))
}

fn count_rows(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}

impl Database {
    pub fn remove(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Opens (creating if needed) the database at `path` and installs the
    /// schema.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self::configure(conn)?;
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an existing database without touching its schema. A missing file
    /// or missing table/index is fatal.
    pub fn open(path: &Path) -> std::result::Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Fatal(format!(
                "no database at {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(store_error)?;
        let db = Self::configure(conn).map_err(store_error)?;

        let missing = db.missing_schema_objects().map_err(store_error)?;
        if !missing.is_empty() {
            return Err(StoreError::Fatal(format!(
                "database schema incomplete, missing: {}",
                missing.join(", ")
            )));
        }
        Ok(db)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode answers with a row, so it cannot go through execute_batch
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;  -- 16MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Ok(Database {
            conn,
            session_id: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed', 'cancelled')),
    configuration TEXT,       -- JSON CrawlConfig
    iterations INTEGER NOT NULL DEFAULT 0,
    nodes_added INTEGER NOT NULL DEFAULT 0,
    candidates_pruned INTEGER NOT NULL DEFAULT 0,
    initial_visited INTEGER NOT NULL DEFAULT 0,
    initial_frontier INTEGER NOT NULL DEFAULT 0
);

-- Candidates still to explore, popped in insertion order
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    seeded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_position ON frontier(latitude, longitude);

-- Nodes committed by a crawl; sequence doubles as commit order
CREATE TABLE IF NOT EXISTS visited (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT UNIQUE,  -- NULL when the stepper reported none
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    session_id TEXT,
    visited_at INTEGER NOT NULL,

    FOREIGN KEY(session_id) REFERENCES crawl_sessions(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_visited_position ON visited(latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_visited_session ON visited(session_id);
            ",
        )?;
        Ok(())
    }

    /// Required tables and indexes that are not present.
    pub fn missing_schema_objects(&self) -> Result<Vec<&'static str>> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2")?;

        let mut missing = Vec::new();
        for (kind, names) in [("table", REQUIRED_TABLES), ("index", REQUIRED_INDEXES)] {
            for name in names {
                if !stmt.exists(params![kind, name])? {
                    missing.push(*name);
                }
            }
        }
        Ok(missing)
    }

    /// Binds this handle to a session so the visited rows it commits are
    /// attributed to it.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    // Session management
    pub fn create_session(&self, config: &CrawlConfig, initial: &TableCounts) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let configuration = serde_json::to_string(config)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        self.conn.execute(
            "INSERT INTO crawl_sessions (id, start_time, status, configuration, initial_visited, initial_frontier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &session_id,
                current_timestamp(),
                SessionStatus::Running.as_str(),
                configuration,
                initial.visited as i64,
                initial.frontier as i64,
            ],
        )?;

        info!(session_id = %session_id, "Session started");
        Ok(session_id)
    }

    pub fn finish_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        totals: &SessionTotals,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE crawl_sessions
             SET status = ?1, end_time = ?2, iterations = ?3, nodes_added = ?4, candidates_pruned = ?5
             WHERE id = ?6",
            params![
                status.as_str(),
                current_timestamp(),
                totals.iterations as i64,
                totals.nodes_added as i64,
                totals.candidates_pruned as i64,
                session_id,
            ],
        )?;
        info!(session_id, status = status.as_str(), "Session finished");
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<CrawlSession>> {
        self.conn
            .query_row(
                "SELECT id, start_time, end_time, status, configuration, iterations,
                        nodes_added, candidates_pruned, initial_visited, initial_frontier
                 FROM crawl_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    let status: String = row.get(3)?;
                    Ok(CrawlSession {
                        id: row.get(0)?,
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        status: SessionStatus::from_str(&status).unwrap_or(SessionStatus::Failed),
                        configuration: row.get(4)?,
                        iterations: row.get::<_, i64>(5)? as u64,
                        nodes_added: row.get::<_, i64>(6)? as u64,
                        candidates_pruned: row.get::<_, i64>(7)? as u64,
                        initial_visited: row.get::<_, i64>(8)? as u64,
                        initial_frontier: row.get::<_, i64>(9)? as u64,
                    })
                },
            )
            .optional()
    }

    // Counts
    pub fn counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            visited: count_rows(&self.conn, "SELECT COUNT(*) FROM visited")?,
            frontier: count_rows(&self.conn, "SELECT COUNT(*) FROM frontier")?,
        })
    }

    pub fn summary(&self) -> Result<DatabaseSummary> {
        let counts = self.counts()?;
        Ok(DatabaseSummary {
            visited: counts.visited,
            visited_with_id: count_rows(&self.conn, "SELECT COUNT(external_id) FROM visited")?,
            frontier: counts.frontier,
            sessions: count_rows(&self.conn, "SELECT COUNT(*) FROM crawl_sessions")?,
            schema_ok: self.missing_schema_objects()?.is_empty(),
        })
    }

    // Frontier queries
    pub fn insert_candidates(&self, candidates: &[Candidate]) -> Result<usize> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO frontier (latitude, longitude, seeded_at) VALUES (?1, ?2, ?3)",
            )?;
            let timestamp = current_timestamp();
            for candidate in candidates {
                stmt.execute(params![
                    candidate.position.latitude,
                    candidate.position.longitude,
                    timestamp
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = candidates.len(), "Frontier seeded");
        Ok(candidates.len())
    }

    pub fn pop_candidate(&self) -> Result<Option<Candidate>> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let head = tx
            .query_row(
                "SELECT id, latitude, longitude FROM frontier ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        GeoPoint::new(row.get(1)?, row.get(2)?),
                    ))
                },
            )
            .optional()?;

        let Some((id, position)) = head else {
            return Ok(None);
        };
        tx.execute("DELETE FROM frontier WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(Some(Candidate::new(position)))
    }

    pub fn delete_candidates_near(&self, point: GeoPoint, radius_m: f64) -> Result<usize> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let doomed = within_radius(&tx, FRONTIER_IN_BOX, point, radius_m)?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM frontier WHERE id = ?1")?;
            for (id, _) in &doomed {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(doomed.len())
    }

    pub fn frontier_candidates(&self) -> Result<Vec<Candidate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT latitude, longitude FROM frontier ORDER BY id")?;
        let candidates = stmt
            .query_map([], |row| {
                Ok(Candidate::new(GeoPoint::new(row.get(0)?, row.get(1)?)))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(candidates)
    }

    // Visited queries
    pub fn insert_visited(
        &self,
        external_id: &str,
        position: GeoPoint,
        dedup_radius_m: f64,
    ) -> Result<CommitOutcome> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        if !within_radius(&tx, VISITED_POSITIONS_IN_BOX, position, dedup_radius_m)?.is_empty() {
            return Ok(CommitOutcome::Rejected(RejectReason::AlreadyVisited));
        }

        let external_id = (!external_id.is_empty()).then_some(external_id);
        if let Some(id) = external_id
            && tx
                .prepare_cached("SELECT 1 FROM visited WHERE external_id = ?1")?
                .exists(params![id])?
        {
            return Ok(CommitOutcome::Rejected(RejectReason::DuplicateId));
        }

        tx.execute(
            "INSERT INTO visited (external_id, latitude, longitude, session_id, visited_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                external_id,
                position.latitude,
                position.longitude,
                &self.session_id,
                current_timestamp(),
            ],
        )?;
        let sequence = tx.last_insert_rowid();
        tx.commit()?;

        Ok(CommitOutcome::Accepted(VisitedNode {
            external_id: external_id.unwrap_or_default().to_string(),
            position,
            sequence: sequence as u64,
        }))
    }

    pub fn visited_nodes(&self) -> Result<Vec<VisitedNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, COALESCE(external_id, ''), latitude, longitude
             FROM visited ORDER BY sequence",
        )?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(VisitedNode {
                    sequence: row.get::<_, i64>(0)? as u64,
                    external_id: row.get(1)?,
                    position: GeoPoint::new(row.get(2)?, row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(nodes)
    }

    pub fn visited_by_session(&self, session_id: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visited WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // Reconciliation

    /// Frontier candidates lying within `radius_m` of a visited node, closest
    /// first.
    pub fn frontier_overlaps(&self, radius_m: f64, limit: Option<usize>) -> Result<Vec<Overlap>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, latitude, longitude FROM frontier ORDER BY id")?;
        let candidates = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    GeoPoint::new(row.get(1)?, row.get(2)?),
                ))
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut overlaps = Vec::new();
        for (candidate_id, position) in candidates {
            if let Some((nearest, distance_m)) = nearest_visited(&self.conn, position, radius_m)? {
                overlaps.push(Overlap {
                    candidate_id,
                    candidate: Candidate::new(position),
                    nearest,
                    distance_m,
                });
            }
        }

        overlaps.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        if let Some(limit) = limit {
            overlaps.truncate(limit);
        }
        Ok(overlaps)
    }

    /// Counts (dry run) or deletes every frontier candidate within `radius_m`
    /// of a visited node.
    pub fn reconcile_frontier(&self, radius_m: f64, dry_run: bool) -> Result<usize> {
        let overlaps = self.frontier_overlaps(radius_m, None)?;
        if dry_run || overlaps.is_empty() {
            return Ok(overlaps.len());
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM frontier WHERE id = ?1")?;
            for overlap in &overlaps {
                removed += stmt.execute(params![overlap.candidate_id])?;
            }
        }
        tx.commit()?;

        info!(removed, radius_m, "Frontier reconciled against visited set");
        Ok(removed)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

impl FrontierStore for Database {
    fn seed(&self, candidates: &[Candidate]) -> std::result::Result<usize, StoreError> {
        self.insert_candidates(candidates).map_err(store_error)
    }

    fn pop_one(&self) -> std::result::Result<Option<Candidate>, StoreError> {
        self.pop_candidate().map_err(store_error)
    }

    fn prune_near(&self, point: GeoPoint, radius_m: f64) -> std::result::Result<usize, StoreError> {
        self.delete_candidates_near(point, radius_m)
            .map_err(store_error)
    }

    fn pending(&self) -> std::result::Result<usize, StoreError> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM frontier")
            .map(|n| n as usize)
            .map_err(store_error)
    }
}

impl VisitedStore for Database {
    fn commit(
        &self,
        external_id: &str,
        position: GeoPoint,
        dedup_radius_m: f64,
    ) -> std::result::Result<CommitOutcome, StoreError> {
        self.insert_visited(external_id, position, dedup_radius_m)
            .map_err(store_error)
    }

    fn exists_near(&self, point: GeoPoint, radius_m: f64) -> std::result::Result<bool, StoreError> {
        within_radius(&self.conn, VISITED_POSITIONS_IN_BOX, point, radius_m)
            .map(|hits| !hits.is_empty())
            .map_err(store_error)
    }

    fn count(&self) -> std::result::Result<usize, StoreError> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM visited")
            .map(|n| n as usize)
            .map_err(store_error)
    }
}
