//! Runner error types.

use scalesync_session::SessionError;
use thiserror::Error;

/// Errors surfaced by the runner and its CLI.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// I/O failure (socket, file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A session request failed.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// A YAML file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The scale bridge did not accept the connection in time.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// Bad command line input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
