//! Error types for the scale protocol.

use thiserror::Error;

/// Errors that can occur when working with the scale protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A record from the scale could not be decoded.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A recipe or step violates the device constraints.
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    /// A host command line was not recognized.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Buffer overflow (record too long without a boundary).
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow { max: usize, actual: usize },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
