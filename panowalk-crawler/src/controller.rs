//! The crawl state machine.
//!
//! One [`CrawlController`] drives one exploration cursor. Each call to
//! [`CrawlController::step`] performs exactly one transition, finishing any
//! stepper call and store transaction it starts before returning, so the
//! stop signal checked between transitions can never interrupt a commit.

use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result, StoreError};
use crate::geo::{GeoPoint, Geofence};
use crate::model::{CommitOutcome, Direction, Observation, VisitedNode};
use crate::result::{CrawlOutcome, CrawlStats, CrawlSummary};
use crate::stepper::Stepper;
use crate::store::{FrontierStore, VisitedStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Invoked once per accepted visited node, after its commit is durable.
pub type MaterializeCallback = Arc<dyn Fn(&VisitedNode) + Send + Sync>;

/// Cooperative cancellation flag shared between a controller and whoever
/// wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// No active position; a seed must be popped from the frontier.
    Seeking,
    /// Asking the stepper to move.
    Stepping,
    /// Validating and persisting what the stepper reported.
    Committing(Observation),
    /// The cursor did not move, or failed too many times in a row.
    Stalled,
    /// The cursor left the geofence.
    OutOfBounds,
    /// Frontier exhausted. Absorbing.
    Terminal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Seeking => "seeking",
            Phase::Stepping => "stepping",
            Phase::Committing(_) => "committing",
            Phase::Stalled => "stalled",
            Phase::OutOfBounds => "out_of_bounds",
            Phase::Terminal => "terminal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlState {
    /// Last position committed on the current trajectory. Cleared on reseed,
    /// so the first report after a reseed is never mistaken for a stall.
    pub current_position: Option<GeoPoint>,
    /// Seed the stepper was last initialized at.
    pub anchor: Option<GeoPoint>,
    pub consecutive_failures: u32,
    pub direction: Direction,
    /// Transitions taken this session. Never reset.
    pub iteration_count: u64,
}

impl CrawlState {
    fn new(direction: Direction) -> Self {
        Self {
            current_position: None,
            anchor: None,
            consecutive_failures: 0,
            direction,
            iteration_count: 0,
        }
    }
}

pub struct CrawlController<'a, S, F, V> {
    stepper: S,
    frontier: &'a F,
    visited: &'a V,
    geofence: Geofence,
    config: CrawlConfig,
    state: CrawlState,
    phase: Phase,
    stats: CrawlStats,
    materializer: Option<MaterializeCallback>,
    stop: StopSignal,
}

impl<'a, S, F, V> CrawlController<'a, S, F, V>
where
    S: Stepper,
    F: FrontierStore,
    V: VisitedStore,
{
    pub fn new(stepper: S, frontier: &'a F, visited: &'a V, geofence: Geofence) -> Self {
        let config = CrawlConfig::default();
        Self {
            stepper,
            frontier,
            visited,
            geofence,
            state: CrawlState::new(config.initial_direction),
            config,
            phase: Phase::Seeking,
            stats: CrawlStats::default(),
            materializer: None,
            stop: StopSignal::new(),
        }
    }

    pub fn with_config(mut self, config: CrawlConfig) -> Self {
        self.state.direction = config.initial_direction;
        self.config = config;
        self
    }

    pub fn with_materializer(mut self, callback: MaterializeCallback) -> Self {
        self.materializer = Some(callback);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    /// Drives transitions until the frontier is exhausted, the stop signal is
    /// raised or the iteration cap is hit. Only a fatal storage error is
    /// returned as `Err`.
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        info!(
            radius_m = self.config.match_radius_m,
            fence_radius_m = self.geofence.radius_meters(),
            direction = self.state.direction.as_str(),
            "Starting crawl"
        );

        let outcome = loop {
            if self.stop.is_stopped() {
                info!(iteration = self.state.iteration_count, "Crawl cancelled");
                break CrawlOutcome::Cancelled;
            }
            if let Some(max) = self.config.max_iterations
                && self.state.iteration_count >= max
            {
                info!(iteration = self.state.iteration_count, "Iteration limit reached");
                break CrawlOutcome::IterationLimit;
            }
            if *self.step().await? == Phase::Terminal {
                break CrawlOutcome::Exhausted;
            }
        };

        let summary = self.summary(outcome);
        info!(
            outcome = outcome.as_str(),
            iterations = summary.iterations,
            accepted = summary.stats.accepted,
            pruned = summary.stats.pruned,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Performs one transition and returns the phase it led to.
    pub async fn step(&mut self) -> Result<&Phase> {
        let phase = std::mem::replace(&mut self.phase, Phase::Terminal);
        let next = match phase {
            Phase::Terminal => return Ok(&self.phase),
            Phase::Seeking => self.seek().await?,
            Phase::Stepping => self.advance().await,
            Phase::Committing(observation) => self.commit(observation).await?,
            Phase::Stalled => self.reseed(false),
            Phase::OutOfBounds => self.reseed(true),
        };

        self.state.iteration_count += 1;
        debug!(
            iteration = self.state.iteration_count,
            phase = next.as_str(),
            failures = self.state.consecutive_failures,
            "transition"
        );
        self.phase = next;
        Ok(&self.phase)
    }

    pub fn summary(&self, outcome: CrawlOutcome) -> CrawlSummary {
        CrawlSummary {
            outcome,
            iterations: self.state.iteration_count,
            final_direction: self.state.direction,
            stats: self.stats.clone(),
        }
    }

    async fn seek(&mut self) -> Result<Phase> {
        let frontier = self.frontier;
        let candidate = match self.retry_store("pop_one", || frontier.pop_one()).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!(iteration = self.state.iteration_count, "Frontier exhausted");
                return Ok(Phase::Terminal);
            }
            Err(err) => {
                self.fatal_or_continue(err)?;
                self.state.consecutive_failures += 1;
                return Ok(Phase::Seeking);
            }
        };

        let visited = self.visited;
        let radius = self.config.match_radius_m;
        match self
            .retry_store("exists_near", || visited.exists_near(candidate.position, radius))
            .await
        {
            Ok(true) => {
                self.stats.skipped_seeds += 1;
                debug!(
                    latitude = candidate.position.latitude,
                    longitude = candidate.position.longitude,
                    "Seed already covered by a visited node"
                );
                return Ok(Phase::Seeking);
            }
            Ok(false) => {}
            // The commit check still guards against duplicates.
            Err(err) => self.fatal_or_continue(err)?,
        }

        if !self.initialize_stepper(candidate.position).await {
            self.state.consecutive_failures += 1;
            return Ok(Phase::Stalled);
        }

        info!(
            latitude = candidate.position.latitude,
            longitude = candidate.position.longitude,
            direction = self.state.direction.as_str(),
            "Reseeded"
        );
        self.stats.reseeds += 1;
        self.state.anchor = Some(candidate.position);
        self.state.current_position = None;
        self.state.consecutive_failures = 0;
        Ok(Phase::Stepping)
    }

    async fn initialize_stepper(&mut self, position: GeoPoint) -> bool {
        let attempts = self.config.stepper_retries.max(1);
        for attempt in 1..=attempts {
            match self.stepper.initialize(position).await {
                Ok(()) => return true,
                Err(err) => {
                    self.stats.stepper_faults += 1;
                    warn!(attempt, attempts, error = %err, "Stepper failed to initialize");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay * attempt).await;
                    }
                }
            }
        }
        false
    }

    async fn advance(&mut self) -> Phase {
        let attempts = self.config.stepper_retries.max(1);
        let direction = self.state.direction;
        for attempt in 1..=attempts {
            match self.stepper.advance(direction).await {
                Ok(observation) => return Phase::Committing(observation),
                Err(err) => {
                    self.stats.stepper_faults += 1;
                    warn!(attempt, attempts, error = %err, "Stepper failed to advance");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay * attempt).await;
                    }
                }
            }
        }

        self.state.consecutive_failures += 1;
        Phase::Stalled
    }

    async fn commit(&mut self, observation: Observation) -> Result<Phase> {
        let Observation {
            external_id,
            position,
        } = observation;

        if self.state.current_position == Some(position) {
            debug!(external_id = %external_id, "Cursor did not move");
            return Ok(Phase::Stalled);
        }
        if !self.geofence.contains(position) {
            info!(
                latitude = position.latitude,
                longitude = position.longitude,
                "Left the geofence"
            );
            return Ok(Phase::OutOfBounds);
        }

        let visited = self.visited;
        let radius = self.config.match_radius_m;
        match self
            .retry_store("commit", || visited.commit(&external_id, position, radius))
            .await
        {
            Ok(CommitOutcome::Accepted(node)) => {
                self.accept(node).await?;
                Ok(Phase::Stepping)
            }
            Ok(CommitOutcome::Rejected(reason)) => {
                self.stats.rejected += 1;
                debug!(external_id = %external_id, ?reason, "Already seen");
                Ok(self.record_failure())
            }
            Err(err) => {
                self.fatal_or_continue(err)?;
                Ok(self.record_failure())
            }
        }
    }

    /// Bookkeeping for a durable commit. The materializer runs before a
    /// fatal prune error is propagated, since the visited row already exists.
    async fn accept(&mut self, node: VisitedNode) -> Result<()> {
        let frontier = self.frontier;
        let radius = self.config.match_radius_m;
        let pruned = self
            .retry_store("prune_near", || frontier.prune_near(node.position, radius))
            .await;

        self.state.consecutive_failures = 0;
        self.stats.accepted += 1;
        info!(
            sequence = node.sequence,
            external_id = %node.external_id,
            latitude = node.position.latitude,
            longitude = node.position.longitude,
            "Visited"
        );

        if let Some(ref callback) = self.materializer {
            callback(&node);
        }
        self.state.current_position = Some(node.position);

        match pruned {
            Ok(removed) => {
                self.stats.pruned += removed as u64;
                if removed > 0 {
                    debug!(removed, "Pruned frontier candidates");
                }
                Ok(())
            }
            Err(err) => {
                self.fatal_or_continue(err)?;
                warn!(
                    sequence = node.sequence,
                    "Prune failed; nearby candidates stay queued"
                );
                Ok(())
            }
        }
    }

    fn record_failure(&mut self) -> Phase {
        self.state.consecutive_failures += 1;
        if self.state.consecutive_failures > self.config.failure_threshold {
            debug!(
                failures = self.state.consecutive_failures,
                "Too many failures in a row"
            );
            Phase::Stalled
        } else {
            Phase::Stepping
        }
    }

    fn reseed(&mut self, out_of_bounds: bool) -> Phase {
        if out_of_bounds {
            self.stats.out_of_bounds += 1;
        } else {
            self.stats.stalls += 1;
        }
        self.state.direction = self.state.direction.flipped();
        self.state.current_position = None;
        Phase::Seeking
    }

    fn fatal_or_continue(&self, err: StoreError) -> Result<()> {
        if err.is_retryable() {
            warn!(error = %err, "Storage fault absorbed");
            Ok(())
        } else {
            error!(error = %err, "Fatal storage error, aborting session");
            Err(CrawlError::Storage(err))
        }
    }

    async fn retry_store<T>(
        &mut self,
        operation: &'static str,
        mut op: impl FnMut() -> std::result::Result<T, StoreError>,
    ) -> std::result::Result<T, StoreError> {
        let attempts = self.config.storage_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    self.stats.storage_faults += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    warn!(operation, attempt, attempts, error = %err, "Storage fault, retrying");
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
