//! Host-side session over TCP.

use scalesync_session::{Session, SessionError, SessionEvent, SessionHandle, TransferKind};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::tcp_transport::TcpTransport;

/// A [`Session`] connected to a scale through a [`TcpTransport`].
pub struct ScaleClient {
    handle: SessionHandle,
    transport: TcpTransport,
    task: JoinHandle<()>,
}

impl ScaleClient {
    /// Connect to `config.address` and wait for the scale's listing when the
    /// session requests one on connect.
    pub async fn connect(config: &RunnerConfig) -> RunnerResult<Self> {
        let (events_tx, events_rx) = mpsc::channel(config.session.event_capacity.max(1));
        let transport = TcpTransport::new(events_tx);
        let (handle, task) = Session::spawn(config.session.clone(), transport.clone(), events_rx);

        // Subscribe before the link comes up so the listing cannot be missed.
        let mut events = handle.events();

        match timeout(config.connect_timeout(), transport.connect(config.address.as_str())).await {
            Ok(result) => result?,
            Err(_) => return Err(RunnerError::ConnectTimeout(config.address.clone())),
        }
        info!("Connected to scale bridge at {}", config.address);

        let client = ScaleClient {
            handle,
            transport,
            task,
        };
        if config.session.list_on_connect {
            wait_for_listing(&mut events).await?;
        }
        Ok(client)
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn transport(&self) -> &TcpTransport {
        &self.transport
    }

    /// Stop the session and drop the link.
    pub async fn close(self) {
        self.handle.shutdown().await;
        let _ = self.task.await;
    }
}

/// Wait for the listing transfer started on connect to finish.
async fn wait_for_listing(events: &mut broadcast::Receiver<SessionEvent>) -> RunnerResult<()> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::TransferDone(TransferKind::List)) => return Ok(()),
            Ok(SessionEvent::TransferFailed {
                kind: TransferKind::List,
                error,
            }) => return Err(error.into()),
            Ok(SessionEvent::SessionEnded) => return Err(SessionError::SessionEnded.into()),
            Ok(event) => debug!("Waiting for listing, got {:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Waiting for listing, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(SessionError::SessionClosed.into());
            }
        }
    }
}
