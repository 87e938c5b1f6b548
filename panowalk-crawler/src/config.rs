use crate::model::Direction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default dedup and prune radius, in meters.
pub const DEFAULT_MATCH_RADIUS_M: f64 = 30.0;
/// A reseed happens once consecutive failures exceed this value.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;
pub const DEFAULT_STEPPER_RETRIES: u32 = 3;
pub const DEFAULT_STORAGE_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Tunables for one crawl session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Radius used both to reject a commit near an existing visited node and
    /// to prune frontier candidates around a newly visited one.
    pub match_radius_m: f64,
    pub failure_threshold: u32,
    /// Attempts per stepper call, including the first.
    pub stepper_retries: u32,
    /// Attempts per store call, including the first.
    pub storage_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_delay`.
    pub retry_delay: Duration,
    pub initial_direction: Direction,
    pub max_iterations: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            match_radius_m: DEFAULT_MATCH_RADIUS_M,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            stepper_retries: DEFAULT_STEPPER_RETRIES,
            storage_retries: DEFAULT_STORAGE_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            initial_direction: Direction::Forward,
            max_iterations: None,
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_radius(mut self, radius_m: f64) -> Self {
        self.match_radius_m = radius_m;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_stepper_retries(mut self, attempts: u32) -> Self {
        self.stepper_retries = attempts.max(1);
        self
    }

    pub fn with_storage_retries(mut self, attempts: u32) -> Self {
        self.storage_retries = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_initial_direction(mut self, direction: Direction) -> Self {
        self.initial_direction = direction;
        self
    }

    pub fn with_max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }
}
