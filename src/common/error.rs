//! Error types for rtslam

use thiserror::Error;

use crate::common::types::EntityKind;

/// Main error type for map and state operations
#[derive(Debug, Error)]
pub enum SlamError {
    /// The state arena has no free range large enough for the request
    #[error("Capacity exceeded: requested {requested} states, largest free range is {largest_free} (capacity {capacity})")]
    CapacityExceeded {
        requested: usize,
        largest_free: usize,
        capacity: usize,
    },
    /// Lookup or release of an id that is not currently assigned
    #[error("Unknown {kind} id: {id}")]
    UnknownId { kind: EntityKind, id: usize },
    /// Release or use of a slot that is not currently allocated
    #[error("Unknown slot: [{start}, {end})")]
    UnknownSlot { start: usize, end: usize },
    /// Matrix or vector shape does not match the slot it is applied to
    #[error("Dimension mismatch for {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// A graph link is missing its counterpart
    #[error("Inconsistent map: {0}")]
    Inconsistent(String),
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be parsed
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SlamError {
    /// Creates an unknown-id error.
    pub fn unknown_id(kind: EntityKind, id: impl Into<usize>) -> Self {
        Self::UnknownId { kind, id: id.into() }
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }
}

/// Result type alias for map operations
pub type SlamResult<T> = Result<T, SlamError>;
