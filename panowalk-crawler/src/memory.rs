//! In-process frontier and visited stores.
//!
//! Both guard their collection with a single mutex, which is enough to make
//! every operation atomic for sessions sharing the store across threads.

use crate::error::StoreError;
use crate::geo::GeoPoint;
use crate::model::{Candidate, CommitOutcome, RejectReason, VisitedNode};
use crate::store::{FrontierStore, VisitedStore};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Fatal("store lock poisoned by a panicking session".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryFrontier {
    queue: Mutex<VecDeque<Candidate>>,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        Self {
            queue: Mutex::new(candidates.into_iter().collect()),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<Candidate>, StoreError> {
        Ok(self.lock()?.iter().copied().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Candidate>>, StoreError> {
        self.queue.lock().map_err(poisoned)
    }
}

impl FrontierStore for MemoryFrontier {
    fn seed(&self, candidates: &[Candidate]) -> Result<usize, StoreError> {
        let mut queue = self.lock()?;
        queue.extend(candidates.iter().copied());
        Ok(candidates.len())
    }

    fn pop_one(&self) -> Result<Option<Candidate>, StoreError> {
        Ok(self.lock()?.pop_front())
    }

    fn prune_near(&self, point: GeoPoint, radius_m: f64) -> Result<usize, StoreError> {
        let mut queue = self.lock()?;
        let before = queue.len();
        queue.retain(|c| c.position.distance_to(&point) > radius_m);
        Ok(before - queue.len())
    }

    fn pending(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }
}

#[derive(Debug, Default)]
struct Ledger {
    nodes: Vec<VisitedNode>,
    ids: HashSet<String>,
    last_sequence: u64,
}

#[derive(Debug, Default)]
pub struct MemoryVisited {
    ledger: Mutex<Ledger>,
}

impl MemoryVisited {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visited nodes in commit order.
    pub fn snapshot(&self) -> Result<Vec<VisitedNode>, StoreError> {
        Ok(self.lock()?.nodes.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>, StoreError> {
        self.ledger.lock().map_err(poisoned)
    }
}

impl VisitedStore for MemoryVisited {
    fn commit(
        &self,
        external_id: &str,
        position: GeoPoint,
        dedup_radius_m: f64,
    ) -> Result<CommitOutcome, StoreError> {
        let mut ledger = self.lock()?;

        if ledger
            .nodes
            .iter()
            .any(|n| n.position.distance_to(&position) <= dedup_radius_m)
        {
            return Ok(CommitOutcome::Rejected(RejectReason::AlreadyVisited));
        }
        if !external_id.is_empty() && ledger.ids.contains(external_id) {
            return Ok(CommitOutcome::Rejected(RejectReason::DuplicateId));
        }

        ledger.last_sequence += 1;
        let node = VisitedNode {
            external_id: external_id.to_string(),
            position,
            sequence: ledger.last_sequence,
        };
        if !external_id.is_empty() {
            ledger.ids.insert(node.external_id.clone());
        }
        ledger.nodes.push(node.clone());
        Ok(CommitOutcome::Accepted(node))
    }

    fn exists_near(&self, point: GeoPoint, radius_m: f64) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .nodes
            .iter()
            .any(|n| n.position.distance_to(&point) <= radius_m))
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.nodes.len())
    }
}
