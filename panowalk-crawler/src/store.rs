//! Storage seams shared by every crawl session.
//!
//! Each call is atomic with respect to every other call on the same store,
//! including calls from other sessions, and completes in bounded time.

use crate::error::StoreError;
use crate::geo::GeoPoint;
use crate::model::{Candidate, CommitOutcome};

pub trait FrontierStore {
    /// Appends candidates in the given order. Returns how many were stored.
    fn seed(&self, candidates: &[Candidate]) -> Result<usize, StoreError>;

    /// Removes and returns the earliest-inserted candidate. `Ok(None)` means
    /// the frontier is exhausted, which is not an error.
    fn pop_one(&self) -> Result<Option<Candidate>, StoreError>;

    /// Deletes every candidate within `radius_m` meters of `point` and
    /// returns how many went.
    fn prune_near(&self, point: GeoPoint, radius_m: f64) -> Result<usize, StoreError>;

    fn pending(&self) -> Result<usize, StoreError>;
}

pub trait VisitedStore {
    /// Inserts a visited node unless one already exists within
    /// `dedup_radius_m` of `position` (or `external_id` was seen before).
    /// Check and insert happen in one transaction.
    fn commit(
        &self,
        external_id: &str,
        position: GeoPoint,
        dedup_radius_m: f64,
    ) -> Result<CommitOutcome, StoreError>;

    fn exists_near(&self, point: GeoPoint, radius_m: f64) -> Result<bool, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}
