//! Transport gateway seam.
//!
//! The session does not own the serial link. A [`Transport`] writes lines, and
//! the link's owner pushes [`TransportEvent`]s (received chunks and link state
//! changes) into the channel handed to the session, which serializes them with
//! caller requests on a single task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// Events delivered by the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw bytes received from the scale; may be any fragment of a record.
    Chunk(Vec<u8>),
    /// Link established.
    LinkUp,
    /// Link lost.
    LinkDown,
}

/// Errors returned by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No link to send on.
    #[error("link is down")]
    NotConnected,

    /// The transport has shut down.
    #[error("transport closed")]
    Closed,

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Outbound half of the link to the scale.
pub trait Transport: Send + Sync + 'static {
    /// Queue one record for transmission. The transport adds the line terminator.
    fn send_line(&self, line: &str) -> Result<(), TransportError>;

    /// Drop the link, if the transport supports it.
    fn close(&self) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        (**self).send_line(line)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// In-memory transport for tests and demos.
///
/// Created with [`memory_link`]; the [`MemoryPeer`] plays the scale.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    sent: mpsc::UnboundedSender<String>,
    events: mpsc::Sender<TransportEvent>,
    link_up: Arc<AtomicBool>,
}

impl Transport for MemoryTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if !self.link_up.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.link_up.swap(false, Ordering::SeqCst) {
            let _ = self.events.try_send(TransportEvent::LinkDown);
        }
    }
}

/// The scale's end of an in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    events: mpsc::Sender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<String>,
    link_up: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Bring the link up.
    pub async fn link_up(&self) {
        self.link_up.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::LinkUp).await;
    }

    /// Take the link down.
    pub async fn link_down(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::LinkDown).await;
    }

    /// Deliver a chunk of bytes as if received from the scale.
    pub async fn deliver(&self, chunk: impl AsRef<[u8]>) {
        let _ = self
            .events
            .send(TransportEvent::Chunk(chunk.as_ref().to_vec()))
            .await;
    }

    /// Wait for the next line the host sent.
    pub async fn recv_line(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Take a line the host sent, if one is queued.
    pub fn try_recv_line(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Drain every line queued so far.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.try_recv_line() {
            lines.push(line);
        }
        lines
    }

    /// Whether the link is currently up.
    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }
}

/// Create an in-memory link: the transport, the event stream for the session,
/// and the peer that plays the scale. The link starts down.
pub fn memory_link(capacity: usize) -> (MemoryTransport, mpsc::Receiver<TransportEvent>, MemoryPeer) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let link_up = Arc::new(AtomicBool::new(false));

    let transport = MemoryTransport {
        sent: sent_tx,
        events: events_tx.clone(),
        link_up: link_up.clone(),
    };
    let peer = MemoryPeer {
        events: events_tx,
        sent: sent_rx,
        link_up,
    };
    (transport, events_rx, peer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_requires_link() {
        let (transport, mut events, mut peer) = memory_link(8);
        assert_eq!(transport.send_line("CONN"), Err(TransportError::NotConnected));

        peer.link_up().await;
        assert_eq!(events.recv().await, Some(TransportEvent::LinkUp));

        transport.send_line("CONN").unwrap();
        assert_eq!(peer.recv_line().await, Some("CONN".to_string()));
    }

    #[tokio::test]
    async fn test_close_reports_link_down() {
        let (transport, mut events, peer) = memory_link(8);
        peer.link_up().await;
        let _ = events.recv().await;

        transport.close();
        assert!(!peer.is_link_up());
        assert_eq!(events.recv().await, Some(TransportEvent::LinkDown));

        // Closing twice reports once.
        transport.close();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_chunk() {
        let (_transport, mut events, peer) = memory_link(8);
        peer.deliver("REA").await;
        assert_eq!(events.recv().await, Some(TransportEvent::Chunk(b"REA".to_vec())));
    }
}
