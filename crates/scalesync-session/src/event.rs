//! Events published by a sync session.

use scalesync_protocol::RecipeStub;

use crate::error::SessionError;
use crate::state::TransferKind;

/// Something the surrounding application may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport link came up.
    Connected,
    /// Transport link went down.
    Disconnected,
    /// The scale confirmed it is in edit mode.
    DeviceReady,
    /// The local recipe list changed (listing, optimistic edit, or rollback).
    RecipeListUpdated(Vec<RecipeStub>),
    /// A transfer was confirmed by the scale.
    TransferDone(TransferKind),
    /// A transfer failed; local edits were rolled back.
    TransferFailed {
        kind: TransferKind,
        error: SessionError,
    },
    /// A record arrived that does not fit the current state. Nothing changed.
    ProtocolViolation(SessionError),
    /// The scale left edit mode; local recipe data was cleared.
    SessionEnded,
}
