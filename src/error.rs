//! Error types for the tile database.

use thiserror::Error;

/// Errors produced by map database operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// Limits or storage path missing or invalid at `init()`
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation was attempted before `init()` succeeded
    #[error("Map database is not initialized")]
    NotInitialized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record does not match the expected layout
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stale handle, unknown layer data or unknown node
    #[error("Not found: {0}")]
    NotFound(String),

    /// Broken tree contract, e.g. subdividing a node twice
    #[error("Topology violation: {0}")]
    Topology(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<bincode::Error> for MapError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => MapError::Io(io),
            other => MapError::Serialization(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
