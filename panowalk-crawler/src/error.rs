use thiserror::Error;

/// Failures reported by a frontier or visited store.
///
/// `Fault` is transient (store busy, connection dropped) and worth retrying.
/// `Fatal` means the store is misconfigured (missing table or index) and the
/// session must stop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("storage fault: {0}")]
    Fault(String),

    #[error("fatal storage error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Fault(_))
    }
}

#[derive(Error, Debug)]
pub enum StepperError {
    #[error("stepper failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("session aborted: {0}")]
    Storage(StoreError),

    #[error("Invalid geofence: {0}")]
    InvalidGeofence(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
