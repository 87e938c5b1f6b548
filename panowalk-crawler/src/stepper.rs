use crate::error::StepperError;
use crate::geo::GeoPoint;
use crate::model::{Direction, Observation};
use std::future::Future;
use tracing::debug;

/// Whatever moves the exploration cursor through the panorama network: a
/// browser session, a simulation, a recorded walk.
///
/// A stepper is a single serial resource. The controller never calls it
/// concurrently with itself and never holds a store lock across a call.
pub trait Stepper {
    /// Jumps the cursor to the node closest to `position`.
    fn initialize(
        &mut self,
        position: GeoPoint,
    ) -> impl Future<Output = Result<(), StepperError>> + Send;

    /// Moves one step and reports where the cursor ended up.
    fn advance(
        &mut self,
        direction: Direction,
    ) -> impl Future<Output = Result<Observation, StepperError>> + Send;
}

/// Steps through a recorded walk.
///
/// After `initialize` the first `advance` reports the node the cursor landed
/// on without moving. Stepping past either end of the log keeps the cursor
/// where it is, so the same observation is reported again.
#[derive(Debug, Clone)]
pub struct ReplayStepper {
    log: Vec<Observation>,
    cursor: Option<usize>,
    landed: bool,
}

impl ReplayStepper {
    pub fn new(log: Vec<Observation>) -> Self {
        Self {
            log,
            cursor: None,
            landed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    fn nearest_index(&self, position: GeoPoint) -> Option<usize> {
        self.log
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.position
                    .distance_to(&position)
                    .total_cmp(&b.position.distance_to(&position))
            })
            .map(|(idx, _)| idx)
    }
}

impl Stepper for ReplayStepper {
    async fn initialize(&mut self, position: GeoPoint) -> Result<(), StepperError> {
        let idx = self
            .nearest_index(position)
            .ok_or_else(|| StepperError::Failed("replay log is empty".to_string()))?;

        debug!(
            index = idx,
            latitude = position.latitude,
            longitude = position.longitude,
            "replay cursor moved"
        );
        self.cursor = Some(idx);
        self.landed = true;
        Ok(())
    }

    async fn advance(&mut self, direction: Direction) -> Result<Observation, StepperError> {
        let cursor = self.cursor.ok_or_else(|| {
            StepperError::Failed("replay stepper advanced before initialize".to_string())
        })?;

        let next = if self.landed {
            self.landed = false;
            cursor
        } else {
            match direction {
                Direction::Forward => (cursor + 1).min(self.log.len() - 1),
                Direction::Backward => cursor.saturating_sub(1),
            }
        };

        self.cursor = Some(next);
        Ok(self.log[next].clone())
    }
}
