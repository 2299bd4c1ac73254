//! TCP transport to a serial bridge.
//!
//! The scale's serial link is reached through a TCP bridge, the same way the
//! emulator (or a serial-to-network adapter) exposes it. Reads are forwarded to
//! the session as raw chunks; lines queued by the session are written by the
//! connection task.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use scalesync_protocol::encode_line;
use scalesync_session::{Transport, TransportError, TransportEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound queue of one live connection.
struct Link {
    id: u64,
    queue: mpsc::UnboundedSender<Vec<u8>>,
}

#[derive(Default)]
struct LinkSlot {
    current: Option<Link>,
    next_id: u64,
}

struct TcpInner {
    link: Mutex<LinkSlot>,
    events: mpsc::Sender<TransportEvent>,
}

/// [`Transport`] over a TCP stream. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpInner>,
}

impl TcpTransport {
    /// Create a transport that reports to `events`. Not connected yet.
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        TcpTransport {
            inner: Arc::new(TcpInner {
                link: Mutex::new(LinkSlot::default()),
                events,
            }),
        }
    }

    /// Connect to the bridge and report `LinkUp`.
    pub async fn connect(&self, addr: impl ToSocketAddrs) -> io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("TcpTransport: connected to {}", peer);

        let (queue, outbound) = mpsc::unbounded_channel();
        let id = {
            let mut slot = self.inner.link.lock();
            let id = slot.next_id;
            slot.next_id += 1;
            // Replacing the queue ends any previous connection task.
            slot.current = Some(Link { id, queue });
            id
        };

        let _ = self.inner.events.send(TransportEvent::LinkUp).await;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = run_connection(stream, outbound, &inner.events).await {
                warn!("TcpTransport: connection to {} failed: {}", peer, e);
            }
            let replaced = {
                let mut slot = inner.link.lock();
                match slot.current {
                    Some(ref link) if link.id != id => true,
                    _ => {
                        slot.current = None;
                        false
                    }
                }
            };
            // A newer connection owns the link state now.
            if !replaced {
                debug!("TcpTransport: link to {} down", peer);
                let _ = inner.events.send(TransportEvent::LinkDown).await;
            }
        });

        Ok(())
    }

    /// Whether a connection is live.
    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().current.is_some()
    }
}

impl Transport for TcpTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        match self.inner.link.lock().current {
            Some(ref link) => link
                .queue
                .send(encode_line(line))
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::NotConnected),
        }
    }

    fn close(&self) {
        if self.inner.link.lock().current.take().is_some() {
            debug!("TcpTransport: closing link");
        }
    }
}

/// Pump one connection until either side closes.
async fn run_connection(
    mut stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: &mpsc::Sender<TransportEvent>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                if events.send(TransportEvent::Chunk(read_buf[..n].to_vec())).await.is_err() {
                    // Session gone
                    return Ok(());
                }
            }

            data = outbound.recv() => match data {
                Some(data) => {
                    writer.write_all(&data).await?;
                    writer.flush().await?;
                }
                // Transport closed locally.
                None => return Ok(()),
            }
        }
    }
}
