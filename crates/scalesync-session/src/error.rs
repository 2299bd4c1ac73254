//! Session error types.

use scalesync_protocol::ProtocolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by a sync session.
///
/// All of them are recoverable at the session level. The type is `Clone` so it
/// can travel inside [`SessionEvent`](crate::SessionEvent)s.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The scale did not answer the probe, or the link is down.
    #[error("scale not connected")]
    NotConnected,

    /// The link went down while a transfer was active.
    #[error("link lost during transfer")]
    LinkLost,

    /// A record arrived in a state where it is not valid.
    #[error("unexpected {record} record while {state}")]
    UnexpectedMessage {
        /// Kind of the record received.
        record: String,
        /// Transfer state at the time.
        state: String,
    },

    /// A titles listing could not be parsed.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A request was made while another one is active, or with bad arguments.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// The scale stopped answering mid-transfer.
    #[error("timed out waiting for the scale")]
    Timeout,

    /// The scale ended its edit session (`EXIT`).
    #[error("scale ended the edit session")]
    SessionEnded,

    /// The scale's recipe storage is full.
    #[error("scale holds at most {max} recipes")]
    CatalogFull {
        /// Device recipe limit.
        max: usize,
    },

    /// The recipe violates the device constraints.
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    /// The transport failed to send.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The session task is gone.
    #[error("session closed")]
    SessionClosed,
}

impl SessionError {
    /// Short reason string for metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::NotConnected => "not_connected",
            SessionError::LinkLost => "link_lost",
            SessionError::UnexpectedMessage { .. } => "unexpected_message",
            SessionError::MalformedRecord(_) => "malformed_record",
            SessionError::ProtocolMisuse(_) => "protocol_misuse",
            SessionError::Timeout => "timeout",
            SessionError::SessionEnded => "session_ended",
            SessionError::CatalogFull { .. } => "catalog_full",
            SessionError::InvalidRecipe(_) => "invalid_recipe",
            SessionError::Transport(_) => "transport",
            SessionError::Config(_) => "config",
            SessionError::SessionClosed => "session_closed",
        }
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedRecord(msg) => SessionError::MalformedRecord(msg),
            ProtocolError::InvalidRecipe(msg) => SessionError::InvalidRecipe(msg),
            other => SessionError::MalformedRecord(other.to_string()),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => SessionError::NotConnected,
            other => SessionError::Transport(other.to_string()),
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
