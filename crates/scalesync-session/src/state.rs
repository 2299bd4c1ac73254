//! Connection and transfer state.

use scalesync_protocol::Recipe;

/// State of the link to the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Link established; the scale has not confirmed it is in edit mode.
    LinkUp,
    /// The scale answered the `CONN?`/`CONN` handshake.
    DeviceReady,
}

impl ConnectionState {
    /// Whether the transport link is up.
    pub fn is_link_up(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// The transfer in flight. At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Waiting for the scale's titles listing.
    AwaitingTitleList,
    /// `ADD` sent; waiting for `READY` before streaming `recipe`.
    AwaitingDeviceReady(Recipe),
    /// `DELETE_<n>` sent for the entry at `index`; waiting for `SUCCESS`.
    AwaitingDeleteAck(usize),
    /// Recipe records streamed (or streaming); waiting for `SUCCESS`.
    AwaitingAddAck,
}

impl TransferState {
    /// Short state name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Idle => "idle",
            TransferState::AwaitingTitleList => "awaiting title list",
            TransferState::AwaitingDeviceReady(_) => "awaiting device ready",
            TransferState::AwaitingDeleteAck(_) => "awaiting delete ack",
            TransferState::AwaitingAddAck => "awaiting add ack",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TransferState::Idle)
    }
}

/// The kind of transfer a request started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Add,
    Delete,
    List,
}

impl TransferKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Add => "add",
            TransferKind::Delete => "delete",
            TransferKind::List => "list",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
