use crate::model::Direction;
use serde::{Deserialize, Serialize};

/// How a crawl session ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlOutcome {
    /// The frontier ran dry.
    Exhausted,
    /// The stop signal was raised.
    Cancelled,
    /// The configured iteration cap was reached.
    IterationLimit,
}

impl CrawlOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlOutcome::Exhausted => "exhausted",
            CrawlOutcome::Cancelled => "cancelled",
            CrawlOutcome::IterationLimit => "iteration_limit",
        }
    }
}

/// Running counters kept by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub accepted: u64,
    pub rejected: u64,
    pub reseeds: u64,
    pub skipped_seeds: u64,
    pub stalls: u64,
    pub out_of_bounds: u64,
    pub pruned: u64,
    pub stepper_faults: u64,
    pub storage_faults: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub outcome: CrawlOutcome,
    pub iterations: u64,
    pub final_direction: Direction,
    pub stats: CrawlStats,
}

impl CrawlSummary {
    /// Share of iterations that produced a new visited node, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.stats.accepted as f64 / self.iterations as f64 * 100.0
        }
    }
}
