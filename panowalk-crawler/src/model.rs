use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// An unexplored location waiting in the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub position: GeoPoint,
}

impl Candidate {
    pub const fn new(position: GeoPoint) -> Self {
        Self { position }
    }
}

impl From<GeoPoint> for Candidate {
    fn from(position: GeoPoint) -> Self {
        Self { position }
    }
}

/// A node the crawl has committed to. `sequence` is assigned by the visited
/// store and strictly increases with every accepted commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedNode {
    pub external_id: String,
    pub position: GeoPoint,
    pub sequence: u64,
}

/// What the stepper reports after moving: the node identifier it landed on
/// and where that node is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub external_id: String,
    pub position: GeoPoint,
}

impl Observation {
    pub fn new(external_id: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            external_id: external_id.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "forward" | "fwd" => Some(Direction::Forward),
            "backward" | "back" => Some(Direction::Backward),
            _ => None,
        }
    }
}

/// Why a visited store refused a commit. Neither is a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// A visited node already exists within the dedup radius.
    AlreadyVisited,
    /// The external identifier was committed before at another position.
    DuplicateId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Accepted(VisitedNode),
    Rejected(RejectReason),
}

impl CommitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CommitOutcome::Accepted(_))
    }
}
