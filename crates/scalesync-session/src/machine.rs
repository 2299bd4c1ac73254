//! Session state machine.
//!
//! [`SessionMachine`] owns the connection and transfer state, the record framer,
//! the local recipe list, and every deadline. It performs no I/O: inputs are
//! method calls stamped with the current [`Instant`], and outputs (lines to send,
//! events, request completions) accumulate until the driver drains them with
//! [`SessionMachine::drain_output`]. The async [`Session`](crate::Session) feeds
//! it from one task, which gives the single-writer timeline the protocol needs.
//!
//! The add flow, end to end:
//!
//! ```text
//! request_add ─► send CONN, arm probe timer
//! CONN?       ─► reply CONN, DeviceReady, append recipe, send ADD
//! READY       ─► queue TITLE_/steps/#, AwaitingAddAck, one record per pacing tick
//! SUCCESS     ─► commit, Idle, request resolves Ok
//! ```

use std::collections::VecDeque;

use scalesync_metrics::{metric_defs, MetricLabels};
use scalesync_protocol::{recipe_transfer, Command, Recipe, RecipeStub, Record, RecordFramer};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::event::SessionEvent;
use crate::state::{ConnectionState, TransferKind, TransferState};

// ============================================================================
// Outputs
// ============================================================================

/// Work the driver must carry out after feeding the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Write this record to the transport.
    Send(Command),
    /// Publish an event.
    Event(SessionEvent),
    /// Resolve the caller's outstanding request.
    Complete {
        kind: TransferKind,
        result: SessionResult<()>,
    },
    /// Drop the transport link.
    CloseLink,
}

// ============================================================================
// Internal State
// ============================================================================

/// Request waiting for the probe handshake.
#[derive(Debug, Clone)]
enum ProbePurpose {
    Add(Recipe),
    Delete(usize),
}

#[derive(Debug, Clone)]
struct PendingProbe {
    purpose: ProbePurpose,
    deadline: Instant,
}

/// The request a transfer belongs to.
#[derive(Debug, Clone, Copy)]
struct ActiveRequest {
    kind: TransferKind,
    started: Instant,
}

// ============================================================================
// Session Machine
// ============================================================================

/// Sans-I/O protocol engine for one scale connection.
pub struct SessionMachine {
    config: SessionConfig,
    labels: MetricLabels,

    framer: RecordFramer,
    connection: ConnectionState,
    transfer: TransferState,

    probe: Option<PendingProbe>,
    active: Option<ActiveRequest>,

    /// Local view, including optimistic edits.
    recipes: Vec<RecipeStub>,
    /// Last list the scale confirmed.
    confirmed: Vec<RecipeStub>,
    /// Optimistically appended recipe of the add in flight.
    pending_add: Option<RecipeStub>,

    /// Recipe records waiting for their pacing slot.
    outbox: VecDeque<Command>,
    next_send_at: Option<Instant>,
    response_deadline: Option<Instant>,

    output: Vec<Output>,
}

impl SessionMachine {
    /// Create a machine in the `Disconnected`/`Idle` state.
    pub fn new(config: SessionConfig) -> Self {
        let labels = MetricLabels::new(config.name.clone());
        SessionMachine {
            config,
            labels,
            framer: RecordFramer::new(),
            connection: ConnectionState::Disconnected,
            transfer: TransferState::Idle,
            probe: None,
            active: None,
            recipes: Vec::new(),
            confirmed: Vec::new(),
            pending_add: None,
            outbox: VecDeque::new(),
            next_send_at: None,
            response_deadline: None,
            output: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn transfer_state(&self) -> &TransferState {
        &self.transfer
    }

    /// The local recipe list, including unconfirmed edits.
    pub fn recipes(&self) -> &[RecipeStub] {
        &self.recipes
    }

    /// The last list confirmed by the scale.
    pub fn confirmed_recipes(&self) -> &[RecipeStub] {
        &self.confirmed
    }

    /// Whether a request or transfer is in flight.
    pub fn is_busy(&self) -> bool {
        self.probe.is_some() || !self.transfer.is_idle()
    }

    /// Bytes held by the framer waiting for a record boundary.
    pub fn buffered_len(&self) -> usize {
        self.framer.buffered_len()
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        let send_at = if self.outbox.is_empty() { None } else { self.next_send_at };
        [send_at, self.probe.as_ref().map(|p| p.deadline), self.response_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Take the outputs accumulated so far.
    pub fn drain_output(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.output)
    }

    // ========================================================================
    // Link Events
    // ========================================================================

    /// The transport link came up.
    pub fn link_up(&mut self, now: Instant) {
        debug!("Session[{}]: link up", self.config.name);

        if self.is_busy() {
            self.fail_active(SessionError::LinkLost);
        }
        self.framer.clear();
        self.connection = ConnectionState::LinkUp;
        self.emit(SessionEvent::Connected);

        if self.config.list_on_connect {
            self.start_list(now);
        }
    }

    /// The transport link went down. Cancels every timer and aborts the transfer.
    pub fn link_down(&mut self, _now: Instant) {
        debug!("Session[{}]: link down ({})", self.config.name, self.transfer.name());
        metrics::counter!(metric_defs::LINK_DOWN.name, &self.labels.to_labels()).increment(1);

        self.connection = ConnectionState::Disconnected;
        self.framer.clear();
        if self.is_busy() {
            self.fail_active(SessionError::LinkLost);
        }
        self.clear_timers();
        self.emit(SessionEvent::Disconnected);
    }

    /// Feed a chunk received from the scale.
    pub fn receive(&mut self, chunk: &[u8], now: Instant) {
        for text in self.framer.feed(chunk) {
            match Record::parse(&text, self.config.title_format) {
                Ok(record) => self.handle_record(record, now),
                Err(e) => self.handle_malformed(SessionError::from(e)),
            }
        }
    }

    // ========================================================================
    // Caller Requests
    // ========================================================================

    /// Start adding `recipe`. `Err` means the request was rejected and nothing
    /// changed; `Ok` means the outcome arrives later as [`Output::Complete`].
    pub fn request_add(&mut self, recipe: Recipe, now: Instant) -> SessionResult<()> {
        self.ensure_available()?;
        recipe.validate()?;
        if let Some(max) = self.config.max_recipes {
            if self.recipes.len() >= max {
                return Err(SessionError::CatalogFull { max });
            }
        }
        self.ensure_link()?;

        debug!(
            "Session[{}]: add '{}' ({} steps)",
            self.config.name,
            recipe.title,
            recipe.steps.len()
        );
        self.start_probe(ProbePurpose::Add(recipe), TransferKind::Add, now);
        Ok(())
    }

    /// Start deleting the recipe at the 0-based `index` of the local list.
    pub fn request_delete(&mut self, index: usize, now: Instant) -> SessionResult<()> {
        self.ensure_available()?;
        if index >= self.recipes.len() {
            return Err(SessionError::ProtocolMisuse(format!(
                "delete index {} out of range ({} recipes)",
                index,
                self.recipes.len()
            )));
        }
        self.ensure_link()?;

        debug!(
            "Session[{}]: delete #{} '{}'",
            self.config.name,
            index + 1,
            self.recipes[index].title
        );
        self.start_probe(ProbePurpose::Delete(index), TransferKind::Delete, now);
        Ok(())
    }

    /// Wait for the next titles listing from the scale. Joins a listing that is
    /// already awaited, such as the one requested on connect.
    pub fn request_list(&mut self, now: Instant) -> SessionResult<()> {
        if self.transfer == TransferState::AwaitingTitleList {
            return Ok(());
        }
        self.ensure_available()?;
        self.ensure_link()?;
        self.start_list(now);
        Ok(())
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Handle every deadline that has passed by `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        if let Some(at) = self.next_send_at {
            if at <= now && !self.outbox.is_empty() {
                self.send_next_record(now);
            }
        }

        if let Some(ref probe) = self.probe {
            if probe.deadline <= now {
                debug!("Session[{}]: probe timed out", self.config.name);
                self.fail_active(SessionError::NotConnected);
            }
        }

        if let Some(at) = self.response_deadline {
            if at <= now {
                warn!(
                    "Session[{}]: no response while {}",
                    self.config.name,
                    self.transfer.name()
                );
                self.fail_active(SessionError::Timeout);
            }
        }
    }

    // ========================================================================
    // Record Handling
    // ========================================================================

    fn handle_record(&mut self, record: Record, now: Instant) {
        trace!(
            "Session[{}]: record {} while {}",
            self.config.name,
            record.kind(),
            self.transfer.name()
        );
        metrics::counter!(
            metric_defs::RECORDS_RECEIVED.name,
            &self.labels.with(&[("record", record.kind().to_string())])
        )
        .increment(1);

        match record {
            Record::ConnQuery => {
                self.send(Command::Probe);
                self.mark_device_ready(now);
            }

            Record::Ready => match std::mem::take(&mut self.transfer) {
                TransferState::AwaitingDeviceReady(recipe) => {
                    debug!(
                        "Session[{}]: scale ready, streaming '{}'",
                        self.config.name, recipe.title
                    );
                    self.connection = ConnectionState::DeviceReady;
                    self.outbox.extend(recipe_transfer(&recipe));
                    self.next_send_at = Some(now + self.config.pacing_delay());
                    self.response_deadline = None;
                    self.transfer = TransferState::AwaitingAddAck;
                }
                other => {
                    self.transfer = other;
                    self.unexpected("READY");
                }
            },

            Record::Titles(stubs) => {
                debug!("Session[{}]: scale lists {} recipes", self.config.name, stubs.len());
                self.confirmed = stubs.clone();
                let mut recipes = stubs;
                if let Some(ref stub) = self.pending_add {
                    recipes.push(stub.clone());
                }
                self.set_recipes(recipes);
                self.mark_device_ready(now);
                if self.transfer == TransferState::AwaitingTitleList {
                    self.complete_active();
                }
            }

            Record::Success => match self.transfer {
                TransferState::AwaitingAddAck if self.outbox.is_empty() => self.complete_active(),
                TransferState::AwaitingDeleteAck(_) => self.complete_active(),
                TransferState::Idle => {
                    trace!("Session[{}]: duplicate SUCCESS ignored", self.config.name);
                }
                _ => self.unexpected("SUCCESS"),
            },

            Record::Exit => self.end_session(),

            Record::Unknown(text) => {
                debug!("Session[{}]: unknown record {:?}", self.config.name, text);
                self.unexpected("unknown");
            }
        }
    }

    fn handle_malformed(&mut self, error: SessionError) {
        warn!("Session[{}]: {}", self.config.name, error);
        if self.transfer == TransferState::AwaitingTitleList {
            self.fail_active(error);
        } else {
            metrics::counter!(metric_defs::PROTOCOL_VIOLATIONS.name, &self.labels.to_labels())
                .increment(1);
            self.emit(SessionEvent::ProtocolViolation(error));
        }
    }

    /// A record arrived in a state where it has no meaning. State is untouched,
    /// and bytes the framer holds for the next record are kept.
    fn unexpected(&mut self, record: &str) {
        let error = SessionError::UnexpectedMessage {
            record: record.to_string(),
            state: self.transfer.name().to_string(),
        };
        debug!("Session[{}]: {}", self.config.name, error);
        metrics::counter!(metric_defs::PROTOCOL_VIOLATIONS.name, &self.labels.to_labels())
            .increment(1);
        self.emit(SessionEvent::ProtocolViolation(error));
    }

    fn mark_device_ready(&mut self, now: Instant) {
        if self.connection != ConnectionState::DeviceReady {
            self.connection = ConnectionState::DeviceReady;
            self.emit(SessionEvent::DeviceReady);
        }
        if let Some(probe) = self.probe.take() {
            self.probe_confirmed(probe.purpose, now);
        }
    }

    /// The scale left edit mode: nothing local is authoritative any more.
    fn end_session(&mut self) {
        debug!("Session[{}]: scale ended the edit session", self.config.name);
        if self.is_busy() {
            self.fail_active(SessionError::SessionEnded);
        }
        self.clear_timers();
        self.framer.clear();
        self.connection = ConnectionState::Disconnected;
        self.transfer = TransferState::Idle;
        self.confirmed.clear();
        self.set_recipes(Vec::new());
        self.emit(SessionEvent::SessionEnded);
        self.output.push(Output::CloseLink);
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    fn ensure_available(&self) -> SessionResult<()> {
        if self.is_busy() {
            let what = match self.active {
                Some(active) => active.kind.as_str(),
                None => self.transfer.name(),
            };
            return Err(SessionError::ProtocolMisuse(format!(
                "a {} transfer is already active",
                what
            )));
        }
        Ok(())
    }

    fn ensure_link(&self) -> SessionResult<()> {
        if self.connection.is_link_up() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Enter a new transfer state. Only legal from `Idle`.
    fn enter_transfer(&mut self, state: TransferState) -> SessionResult<()> {
        if !self.transfer.is_idle() {
            return Err(SessionError::ProtocolMisuse(format!(
                "cannot enter {} while {}",
                state.name(),
                self.transfer.name()
            )));
        }
        self.transfer = state;
        Ok(())
    }

    fn begin_request(&mut self, kind: TransferKind, now: Instant) {
        metrics::counter!(
            metric_defs::TRANSFER_STARTED.name,
            &self.labels.with(&[("transfer", kind.to_string())])
        )
        .increment(1);
        self.active = Some(ActiveRequest { kind, started: now });
    }

    fn start_list(&mut self, now: Instant) {
        if self.enter_transfer(TransferState::AwaitingTitleList).is_ok() {
            self.begin_request(TransferKind::List, now);
            self.response_deadline = Some(now + self.config.response_timeout());
        }
    }

    fn start_probe(&mut self, purpose: ProbePurpose, kind: TransferKind, now: Instant) {
        self.begin_request(kind, now);
        // Readiness must be re-confirmed for every transfer.
        if self.connection == ConnectionState::DeviceReady {
            self.connection = ConnectionState::LinkUp;
        }
        self.probe = Some(PendingProbe {
            purpose,
            deadline: now + self.config.probe_timeout(),
        });
        self.send(Command::Probe);
    }

    fn probe_confirmed(&mut self, purpose: ProbePurpose, now: Instant) {
        let entered = match purpose {
            ProbePurpose::Add(recipe) => {
                let stub = recipe.stub();
                self.enter_transfer(TransferState::AwaitingDeviceReady(recipe))
                    .map(|()| {
                        let mut recipes = self.recipes.clone();
                        recipes.push(stub.clone());
                        self.set_recipes(recipes);
                        self.pending_add = Some(stub);
                        self.send(Command::Add);
                    })
            }
            ProbePurpose::Delete(index) => {
                if index >= self.recipes.len() {
                    // The listing changed while probing.
                    Err(SessionError::ProtocolMisuse(format!(
                        "delete index {} out of range ({} recipes)",
                        index,
                        self.recipes.len()
                    )))
                } else {
                    self.enter_transfer(TransferState::AwaitingDeleteAck(index))
                        .map(|()| {
                            let mut recipes = self.recipes.clone();
                            recipes.remove(index);
                            self.set_recipes(recipes);
                            self.send(Command::Delete { index });
                        })
                }
            }
        };

        match entered {
            Ok(()) => self.response_deadline = Some(now + self.config.response_timeout()),
            Err(e) => self.fail_active(e),
        }
    }

    fn send_next_record(&mut self, now: Instant) {
        if let Some(record) = self.outbox.pop_front() {
            self.send(record);
        }
        if self.outbox.is_empty() {
            self.next_send_at = None;
            self.response_deadline = Some(now + self.config.response_timeout());
        } else {
            self.next_send_at = Some(now + self.config.pacing_delay());
        }
    }

    /// The scale confirmed the active transfer.
    fn complete_active(&mut self) {
        self.transfer = TransferState::Idle;
        self.pending_add = None;
        self.clear_timers();
        self.confirmed = self.recipes.clone();

        if let Some(active) = self.active.take() {
            debug!("Session[{}]: {} confirmed", self.config.name, active.kind);
            let labels = self.labels.with(&[("transfer", active.kind.to_string())]);
            metrics::counter!(metric_defs::TRANSFER_COMPLETED.name, &labels).increment(1);
            metrics::histogram!(metric_defs::TRANSFER_DURATION.name, &labels)
                .record(active.started.elapsed().as_secs_f64() * 1000.0);

            self.output.push(Output::Complete {
                kind: active.kind,
                result: Ok(()),
            });
            self.emit(SessionEvent::TransferDone(active.kind));
        }
    }

    /// Abort whatever is in flight and roll back to the confirmed list.
    fn fail_active(&mut self, error: SessionError) {
        self.probe = None;
        self.pending_add = None;
        self.clear_timers();
        self.transfer = TransferState::Idle;

        if self.recipes != self.confirmed {
            let confirmed = self.confirmed.clone();
            self.set_recipes(confirmed);
        }

        if let Some(active) = self.active.take() {
            debug!("Session[{}]: {} failed: {}", self.config.name, active.kind, error);
            metrics::counter!(
                metric_defs::TRANSFER_FAILED.name,
                &self.labels.with(&[
                    ("transfer", active.kind.to_string()),
                    ("reason", error.reason().to_string()),
                ])
            )
            .increment(1);

            self.output.push(Output::Complete {
                kind: active.kind,
                result: Err(error.clone()),
            });
            self.emit(SessionEvent::TransferFailed {
                kind: active.kind,
                error,
            });
        }
    }

    fn clear_timers(&mut self) {
        self.outbox.clear();
        self.next_send_at = None;
        self.response_deadline = None;
    }

    // ========================================================================
    // Output Helpers
    // ========================================================================

    fn send(&mut self, command: Command) {
        trace!("Session[{}]: send '{}'", self.config.name, command.to_command_string());
        metrics::counter!(metric_defs::LINES_SENT.name, &self.labels.to_labels()).increment(1);
        self.output.push(Output::Send(command));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.output.push(Output::Event(event));
    }

    fn set_recipes(&mut self, recipes: Vec<RecipeStub>) {
        self.recipes = recipes;
        metrics::gauge!(metric_defs::CATALOG_RECIPES.name, &self.labels.to_labels())
            .set(self.recipes.len() as f64);
        self.emit(SessionEvent::RecipeListUpdated(self.recipes.clone()));
    }
}

// ============================================================================
// Tests
// ============================================================================
