//! Async session driver.
//!
//! [`Session`] runs a [`SessionMachine`] on its own task. Transport events,
//! caller requests, and the machine's deadlines are merged in one `select!`
//! loop, so every input is applied in a single order. Callers talk to the task
//! through a cloneable [`SessionHandle`].

use scalesync_protocol::{Recipe, RecipeStub};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::event::SessionEvent;
use crate::machine::{Output, SessionMachine};
use crate::state::{ConnectionState, TransferKind};
use crate::transport::{Transport, TransportEvent};

/// Capacity of the request channel.
const COMMAND_CAPACITY: usize = 16;

type Reply = oneshot::Sender<SessionResult<()>>;

/// Requests from a [`SessionHandle`] to the session task.
#[derive(Debug)]
enum SessionCommand {
    Add { recipe: Recipe, reply: Reply },
    Delete { index: usize, reply: Reply },
    List { reply: Reply },
    Shutdown,
}

// ============================================================================
// Session Task
// ============================================================================

/// Owns the machine and the transport; lives on its own task.
pub struct Session<T: Transport> {
    machine: SessionMachine,
    transport: T,
    transport_events: mpsc::Receiver<TransportEvent>,
    transport_open: bool,
    commands: mpsc::Receiver<SessionCommand>,
    /// Callers waiting for a transfer; several may join one listing.
    pending: Vec<(TransferKind, Reply)>,
    recipes_tx: watch::Sender<Vec<RecipeStub>>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Spawn a session on the current runtime.
    ///
    /// `transport_events` is the stream the transport's owner feeds with
    /// received chunks and link changes.
    pub fn spawn(
        config: SessionConfig,
        transport: T,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (recipes_tx, recipes_rx) = watch::channel(Vec::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let handle = SessionHandle {
            commands: commands_tx,
            recipes: recipes_rx,
            state: state_rx,
            events: events_tx.clone(),
        };

        let session = Session {
            machine: SessionMachine::new(config),
            transport,
            transport_events,
            transport_open: true,
            commands,
            pending: Vec::new(),
            recipes_tx,
            state_tx,
            events_tx,
        };
        let task = tokio::spawn(session.run());

        (handle, task)
    }

    async fn run(mut self) {
        info!("Session[{}]: started", self.machine.config().name);

        loop {
            let deadline = self.machine.next_deadline();

            tokio::select! {
                event = self.transport_events.recv(), if self.transport_open => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        debug!("Session[{}]: transport event stream closed", self.machine.config().name);
                        self.transport_open = false;
                        if self.machine.connection_state().is_link_up() {
                            self.machine.link_down(Instant::now());
                        }
                    }
                },

                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.machine.poll_timers(Instant::now());
                }
            }

            self.flush();
        }

        for (kind, reply) in self.pending.drain(..) {
            trace!("Session[{}]: abandoning {} request", self.machine.config().name, kind);
            let _ = reply.send(Err(SessionError::SessionClosed));
        }
        self.transport.close();
        info!("Session[{}]: stopped", self.machine.config().name);
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let now = Instant::now();
        match event {
            TransportEvent::Chunk(data) => self.machine.receive(&data, now),
            TransportEvent::LinkUp => self.machine.link_up(now),
            TransportEvent::LinkDown => self.machine.link_down(now),
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        let now = Instant::now();
        let (kind, result, reply) = match command {
            SessionCommand::Add { recipe, reply } => {
                (TransferKind::Add, self.machine.request_add(recipe, now), reply)
            }
            SessionCommand::Delete { index, reply } => {
                (TransferKind::Delete, self.machine.request_delete(index, now), reply)
            }
            SessionCommand::List { reply } => {
                (TransferKind::List, self.machine.request_list(now), reply)
            }
            SessionCommand::Shutdown => return,
        };

        match result {
            Ok(()) => self.pending.push((kind, reply)),
            Err(e) => {
                debug!("Session[{}]: {} rejected: {}", self.machine.config().name, kind, e);
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Carry out everything the machine produced, including follow-up output
    /// from link failures detected while sending.
    fn flush(&mut self) {
        let mut send_failed = false;

        loop {
            let output = self.machine.drain_output();
            if output.is_empty() {
                break;
            }

            for item in output {
                match item {
                    Output::Send(command) => {
                        if send_failed {
                            continue;
                        }
                        let line = command.to_command_string();
                        if let Err(e) = self.transport.send_line(&line) {
                            warn!(
                                "Session[{}]: failed to send '{}': {}",
                                self.machine.config().name,
                                line,
                                e
                            );
                            send_failed = true;
                            self.machine.link_down(Instant::now());
                        }
                    }
                    Output::Event(event) => self.publish(event),
                    Output::Complete { kind, result } => self.complete(kind, result),
                    Output::CloseLink => self.transport.close(),
                }
            }
        }

        let current = self.machine.connection_state();
        self.state_tx.send_if_modified(|state| {
            if *state != current {
                *state = current;
                true
            } else {
                false
            }
        });
    }

    fn publish(&mut self, event: SessionEvent) {
        if let SessionEvent::RecipeListUpdated(ref recipes) = event {
            self.recipes_tx.send_replace(recipes.clone());
        }
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn complete(&mut self, kind: TransferKind, result: SessionResult<()>) {
        let (waiting, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(pending_kind, _)| *pending_kind == kind);
        self.pending = rest;

        if waiting.is_empty() {
            // Transfers started by the session itself have no caller.
            trace!("Session[{}]: {} finished without caller", self.machine.config().name, kind);
        }
        for (_, reply) in waiting {
            let _ = reply.send(result.clone());
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    recipes: watch::Receiver<Vec<RecipeStub>>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Add `recipe` to the scale. Resolves once the scale confirms or the
    /// transfer fails.
    pub async fn request_add(&self, recipe: Recipe) -> SessionResult<()> {
        self.request(|reply| SessionCommand::Add { recipe, reply }).await
    }

    /// Delete the recipe at the 0-based `index` of the current list.
    pub async fn request_delete(&self, index: usize) -> SessionResult<()> {
        self.request(|reply| SessionCommand::Delete { index, reply }).await
    }

    /// Wait for the scale's next titles listing.
    pub async fn request_list(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::List { reply }).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> SessionCommand) -> SessionResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// The local recipe list, including unconfirmed edits.
    pub fn current_recipe_list(&self) -> Vec<RecipeStub> {
        self.recipes.borrow().clone()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to session events from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Watch the recipe list for changes.
    pub fn watch_recipes(&self) -> watch::Receiver<Vec<RecipeStub>> {
        self.recipes.clone()
    }

    /// Wait until the connection reaches `target`, up to `limit`.
    pub async fn wait_for_state(&self, target: ConnectionState, limit: Duration) -> SessionResult<()> {
        let mut state = self.state.clone();
        let result = match timeout(limit, state.wait_for(|s| *s == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(SessionError::SessionClosed),
            Err(_) => Err(SessionError::Timeout),
        };
        result
    }

    /// Stop the session task. Outstanding requests fail with `SessionClosed`.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}
