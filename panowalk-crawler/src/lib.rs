pub mod config;
pub mod controller;
pub mod error;
pub mod geo;
pub mod memory;
pub mod model;
pub mod result;
pub mod stepper;
pub mod store;

pub use config::CrawlConfig;
pub use controller::{CrawlController, CrawlState, MaterializeCallback, Phase, StopSignal};
pub use error::{CrawlError, StepperError, StoreError};
pub use geo::{BoundingBox, GeoPoint, Geofence};
pub use memory::{MemoryFrontier, MemoryVisited};
pub use model::{Candidate, CommitOutcome, Direction, Observation, RejectReason, VisitedNode};
pub use result::{CrawlOutcome, CrawlStats, CrawlSummary};
pub use stepper::{ReplayStepper, Stepper};
pub use store::{FrontierStore, VisitedStore};
