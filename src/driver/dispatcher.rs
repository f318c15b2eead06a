//! Per-driver command dispatcher.
//!
//! The dispatcher owns one driver's link, its submission queue and its
//! in-flight window. It runs on the machine executor thread; the reader
//! thread only posts [`ReaderEvent`]s, which the dispatcher drains while it
//! waits. Commands are written strictly in submission order and confirmed
//! FIFO against the oldest in-flight command.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use heapless::Deque;
use tracing::{debug, error, info, trace, warn};

use crate::command::{Captures, Command, CommandClass, CommandEncoder, LineMatch, Variables};
use crate::config::{DriverConfig, FlowControl, MAX_QUEUE_DEPTH};
use crate::error::{CommunicationError, Error, Result};
use crate::machine::{MachineContext, MachineEvent};
use crate::transport::{spawn_reader, Link, LinkEvent, ReaderEvent, ReaderHandle, Transport};

use super::pending::{CommandId, PendingCommand, PendingState};
use super::registry;
use super::state::ConnectionState;

/// Longest the dispatcher blocks on the reader queue before rechecking
/// timeouts and the abort signal.
const EVENT_POLL: Duration = Duration::from_millis(20);

/// A confirmed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed {
    /// Command identifier.
    pub id: CommandId,
    /// Values captured from the response lines.
    pub captures: Captures,
    /// Time from first send to confirmation.
    pub elapsed: Duration,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Confirmation flow control: the command is confirmed.
    Confirmed(Confirmed),
    /// Queued or handshake flow control: the command was written and will
    /// resolve asynchronously.
    Queued(CommandId),
}

struct ActiveLink {
    writer: Box<dyn Write + Send>,
    reader: ReaderHandle,
}

impl fmt::Debug for ActiveLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveLink")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

/// Command dispatcher for one driver.
#[derive(Debug)]
pub struct Dispatcher {
    name: String,
    config: DriverConfig,
    context: MachineContext,
    encoder: CommandEncoder,
    transport: Box<dyn Transport>,
    state: ConnectionState,
    link: Option<ActiveLink>,
    events_tx: Sender<ReaderEvent>,
    events_rx: Receiver<ReaderEvent>,
    generation: u64,
    queue: VecDeque<PendingCommand>,
    in_flight: Deque<PendingCommand, MAX_QUEUE_DEPTH>,
    outcomes: BTreeMap<CommandId, Result<Confirmed>>,
    /// Written asynchronously with no waiter: only failures are kept.
    detached: BTreeSet<CommandId>,
    next_id: CommandId,
    consecutive_timeouts: u32,
    last_activity: Instant,
}

impl Dispatcher {
    /// Create a dispatcher for a configured driver.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the driver is unknown or its
    /// templates or patterns are invalid.
    pub fn new(name: &str, context: &MachineContext, transport: Box<dyn Transport>) -> Result<Self> {
        let config = context.driver_config(name)?.clone();
        let encoder = CommandEncoder::new(name, &config, registry::protocol_for(config.kind))?;
        let (events_tx, events_rx) = mpsc::channel();

        Ok(Self {
            name: name.to_string(),
            config,
            context: context.clone(),
            encoder,
            transport,
            state: ConnectionState::Disconnected,
            link: None,
            events_tx,
            events_rx,
            generation: 0,
            queue: VecDeque::new(),
            in_flight: Deque::new(),
            outcomes: BTreeMap::new(),
            detached: BTreeSet::new(),
            next_id: 1,
            consecutive_timeouts: 0,
            last_activity: Instant::now(),
        })
    }

    /// Driver name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Command encoder bound to this driver.
    #[inline]
    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    /// Flow-control policy.
    #[inline]
    pub fn flow_control(&self) -> FlowControl {
        self.config.flow_control
    }

    /// Check if submissions are accepted.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.state.is_connected()
    }

    /// Commands waiting to be written.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Commands written and awaiting confirmation.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Check if nothing is queued or in flight.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Timeouts since the last confirmation or error response.
    #[inline]
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// State of a command that has not been collected yet.
    pub fn pending_state(&self, id: CommandId) -> Option<PendingState> {
        self.queue
            .iter()
            .chain(self.in_flight.iter())
            .find(|p| p.id() == id)
            .map(PendingCommand::state)
    }

    // ---- connection lifecycle ----

    /// Open the link and send the connect commands.
    ///
    /// The open is attempted once plus `reconnect_attempts` times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverUnavailable`] if the driver is faulted, or the
    /// link or command failure otherwise.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Enabled => return Ok(()),
            ConnectionState::Fault => return Err(Error::DriverUnavailable(self.name.clone())),
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }

        self.set_state(ConnectionState::Connecting);
        if let Err(source) = self.open_link(self.config.reconnect_attempts.saturating_add(1), false) {
            self.set_state(ConnectionState::Disconnected);
            return Err(Error::Link {
                driver: self.name.clone(),
                source,
            });
        }
        self.set_state(ConnectionState::Connected);

        if let Err(e) = self.run_class(CommandClass::Connect) {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Send the enable commands.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverUnavailable`] if the link is not open.
    pub fn enable(&mut self) -> Result<()> {
        if !self.state.is_connected() {
            return Err(Error::DriverUnavailable(self.name.clone()));
        }
        self.run_class(CommandClass::Enable)?;
        self.set_state(ConnectionState::Enabled);
        Ok(())
    }

    /// Send the disable commands.
    pub fn disable(&mut self) -> Result<()> {
        if self.state != ConnectionState::Enabled {
            return Ok(());
        }
        self.run_class(CommandClass::Disable)?;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Close the link. Outstanding commands fail with
    /// [`CommunicationError::Disconnected`].
    pub fn disconnect(&mut self) {
        self.close_link();
        self.fail_outstanding(|_| CommunicationError::Disconnected);
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Clear a fault and reconnect.
    ///
    /// # Errors
    ///
    /// Returns the connect failure.
    pub fn reset(&mut self) -> Result<()> {
        info!(driver = %self.name, state = %self.state, "Resetting driver");
        self.disconnect();
        self.outcomes.clear();
        self.detached.clear();
        self.consecutive_timeouts = 0;
        self.connect()
    }

    /// Process link events and send the ping command if the link has been
    /// idle longer than the keep-alive interval.
    ///
    /// # Errors
    ///
    /// Returns the ping failure.
    pub fn keep_alive(&mut self) -> Result<()> {
        self.pump();
        let Some(interval) = self.config.keep_alive else {
            return Ok(());
        };
        if !self.state.is_connected()
            || !self.is_idle()
            || !self.encoder.has(CommandClass::Ping)
            || self.last_activity.elapsed() < interval.as_duration()
        {
            return Ok(());
        }
        trace!(driver = %self.name, "Keep-alive");
        self.run_class(CommandClass::Ping)
    }

    // ---- submission ----

    /// Append a command to the submission queue without writing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverUnavailable`] if the driver is faulted or
    /// disconnected.
    pub fn enqueue(&mut self, command: Command) -> Result<CommandId> {
        if !self.state.is_connected() {
            return Err(Error::DriverUnavailable(self.name.clone()));
        }
        let id = self.next_id;
        self.next_id += 1;
        trace!(driver = %self.name, id, class = %command.class, text = %command.text, "Queued");
        self.queue.push_back(PendingCommand::new(id, command));
        Ok(id)
    }

    /// Cancel a command that has not been written yet.
    ///
    /// Returns `false` if the command was already sent or is unknown.
    pub fn cancel(&mut self, id: CommandId) -> bool {
        let Some(index) = self.queue.iter().position(|p| p.id() == id) else {
            return false;
        };
        let Some(pending) = self.queue.remove(index) else {
            return false;
        };
        debug!(driver = %self.name, id, "Cancelled");
        self.resolve_failed(pending, PendingState::Cancelled, CommunicationError::Cancelled);
        true
    }

    /// Submit a command.
    ///
    /// Under confirmation flow control this blocks until the command is
    /// confirmed. Under queued and handshake flow control it blocks only
    /// while the in-flight window is full and returns once the command is
    /// written; a failure of an earlier asynchronous command is reported
    /// by the next submission or [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverUnavailable`] for a faulted or disconnected
    /// driver, [`Error::Aborted`] if the machine aborts, or the command
    /// failure wrapped in [`Error::Command`].
    pub fn submit(&mut self, command: Command) -> Result<Completion> {
        if self.config.flow_control != FlowControl::Confirmation {
            self.pump();
            if let Some(e) = self.take_failure() {
                return Err(e);
            }
        }

        let id = self.enqueue(command)?;
        match self.config.flow_control {
            FlowControl::Confirmation => self.wait(id).map(Completion::Confirmed),
            FlowControl::Handshake | FlowControl::Queued => {
                self.drive(|d| !d.queue.iter().any(|p| p.id() == id))?;
                match self.outcomes.get(&id) {
                    Some(Err(_)) => self.collect(id).map(Completion::Confirmed),
                    Some(Ok(_)) => {
                        self.outcomes.remove(&id);
                        Ok(Completion::Queued(id))
                    }
                    None => {
                        self.detached.insert(id);
                        Ok(Completion::Queued(id))
                    }
                }
            }
        }
    }

    /// Submit a command and wait for its confirmation, whatever the flow
    /// control.
    pub fn execute(&mut self, command: Command) -> Result<Confirmed> {
        let id = self.enqueue(command)?;
        self.wait(id)
    }

    /// Wait for a command to resolve.
    ///
    /// A [`Completion::Queued`] id can be waited on only while it is still
    /// in flight; once confirmed its outcome is discarded.
    ///
    /// # Errors
    ///
    /// Returns the command failure, [`Error::Aborted`], or
    /// [`CommunicationError::UnknownCommand`] if the id is not pending.
    pub fn wait(&mut self, id: CommandId) -> Result<Confirmed> {
        self.detached.remove(&id);
        if self.pending_state(id).is_none() && !self.outcomes.contains_key(&id) {
            return Err(self.unknown(id));
        }
        self.drive(|d| d.outcomes.contains_key(&id))?;
        self.collect(id)
    }

    /// Wait until every queued and in-flight command has resolved.
    ///
    /// # Errors
    ///
    /// Returns the first failure among the resolved commands, ignoring
    /// cancellations.
    pub fn flush(&mut self) -> Result<()> {
        self.drive(Dispatcher::is_idle)?;
        let failure = self.take_failure();
        self.outcomes.clear();
        self.detached.clear();
        failure.map_or(Ok(()), Err)
    }

    /// Abort: fail everything outstanding, send the emergency stop and
    /// close the link. Sent but unconfirmed commands are not retried.
    pub fn abort(&mut self) {
        let queued = self.queue.len();
        let in_flight = self.in_flight.len();
        self.fail_outstanding(|_| CommunicationError::Aborted);
        self.outcomes.clear();
        self.detached.clear();

        if self.state.is_connected() {
            match self.encoder.encode_optional(CommandClass::EmergencyStop, &Variables::new()) {
                Ok(commands) => {
                    for command in commands {
                        if let Err(e) = self.write_line(&command.text) {
                            warn!(driver = %self.name, error = %e, "Emergency stop not written");
                            break;
                        }
                    }
                }
                Err(e) => warn!(driver = %self.name, error = %e, "Emergency stop not encoded"),
            }
        }

        warn!(driver = %self.name, queued, in_flight, "Aborted");
        self.close_link();
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    // ---- internals ----

    fn run_class(&mut self, class: CommandClass) -> Result<()> {
        for command in self.encoder.encode_optional(class, &Variables::new())? {
            self.execute(command)?;
        }
        Ok(())
    }

    fn window(&self) -> usize {
        match self.config.flow_control {
            FlowControl::Confirmation => 1,
            FlowControl::Handshake => MAX_QUEUE_DEPTH,
            FlowControl::Queued => self.config.queue_depth.clamp(1, MAX_QUEUE_DEPTH),
        }
    }

    /// Run the event loop until `done` holds, the dispatcher goes idle, or
    /// the machine aborts.
    fn drive(&mut self, done: impl Fn(&Self) -> bool) -> Result<()> {
        loop {
            if self.context.abort().is_triggered() {
                return Err(Error::Aborted);
            }
            self.pump();
            if done(self) || self.is_idle() {
                return Ok(());
            }

            let wait = self
                .in_flight
                .front()
                .and_then(PendingCommand::deadline)
                .map(|d| d.saturating_duration_since(Instant::now()))
                .map_or(EVENT_POLL, |d| d.min(EVENT_POLL));
            match self.events_rx.recv_timeout(wait) {
                Ok(event) => self.handle_event(event),
                // The dispatcher holds a sender, so the queue never disconnects.
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    /// Drain link events, expire timeouts and fill the in-flight window.
    fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        self.check_timeouts();

        while self.state.is_connected() && self.in_flight.len() < self.window() {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            self.send(pending);
        }

        if !self.state.is_connected() {
            let name = self.name.clone();
            while let Some(pending) = self.queue.pop_front() {
                self.resolve_error(pending, PendingState::Failed, Error::DriverUnavailable(name.clone()));
            }
        }
    }

    fn send(&mut self, mut pending: PendingCommand) {
        let text = pending.command().text.clone();
        if let Err(e) = self.write_line(&text) {
            warn!(driver = %self.name, id = pending.id(), error = %e, "Write failed");
            let cause = CommunicationError::from(e);
            self.resolve_failed(pending, PendingState::Failed, cause.clone());
            self.handle_link_failure(cause);
            return;
        }

        pending.transition(PendingState::Sent);
        debug!(driver = %self.name, id = pending.id(), attempt = pending.attempts(), ">> {}", text);
        pending.transition(PendingState::AwaitingConfirmation);

        if let Err(pending) = self.in_flight.push_back(pending) {
            self.resolve_failed(
                pending,
                PendingState::Failed,
                CommunicationError::Malformed("in-flight window full".to_string()),
            );
        }
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "link closed"))?;
        link.writer.write_all(text.as_bytes())?;
        link.writer.write_all(self.config.line_ending.as_str().as_bytes())?;
        link.writer.flush()?;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn handle_event(&mut self, event: ReaderEvent) {
        if event.generation != self.generation {
            trace!(driver = %self.name, generation = event.generation, "Stale link event");
            return;
        }
        match event.event {
            LinkEvent::Line(line) => self.handle_line(&line),
            LinkEvent::Closed => self.handle_link_failure(CommunicationError::Disconnected),
            LinkEvent::Failed(cause) => self.handle_link_failure(cause),
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.last_activity = Instant::now();
        let Some(head) = self.in_flight.front_mut() else {
            trace!(driver = %self.name, line, "Unsolicited line");
            return;
        };

        match head.command().matcher.classify(line) {
            LineMatch::Confirmed(captures) => {
                head.capture(captures);
                if let Some(pending) = self.in_flight.pop_front() {
                    self.resolve_confirmed(pending);
                }
                self.rearm_head();
            }
            LineMatch::Failed(message) => {
                if let Some(pending) = self.in_flight.pop_front() {
                    warn!(driver = %self.name, id = pending.id(), response = %message, "Error response");
                    self.consecutive_timeouts = 0;
                    self.resolve_failed(
                        pending,
                        PendingState::Failed,
                        CommunicationError::ErrorResponse(message),
                    );
                }
                self.rearm_head();
            }
            LineMatch::Captured(captures) => head.capture(captures),
            LineMatch::Unrelated => trace!(driver = %self.name, line, "Ignored line"),
        }
    }

    fn rearm_head(&mut self) {
        if let Some(head) = self.in_flight.front_mut() {
            head.rearm();
        }
    }

    fn check_timeouts(&mut self) {
        let now = Instant::now();
        let expired = matches!(
            self.in_flight.front().and_then(PendingCommand::deadline),
            Some(deadline) if deadline <= now
        );
        if !expired {
            return;
        }
        let Some(head) = self.in_flight.pop_front() else {
            return;
        };

        if self.config.flow_control == FlowControl::Confirmation && head.can_retry() {
            warn!(
                driver = %self.name,
                id = head.id(),
                attempt = head.attempts(),
                "No confirmation, resending"
            );
            self.send(head);
            return;
        }

        let timeout = head.command().timeout;
        let class = head.command().class;
        self.consecutive_timeouts += 1;
        warn!(
            driver = %self.name,
            id = head.id(),
            %class,
            ?timeout,
            consecutive = self.consecutive_timeouts,
            "Command timed out"
        );
        self.resolve_failed(head, PendingState::TimedOut, CommunicationError::Timeout(timeout));
        self.context.emit(MachineEvent::CommandTimedOut {
            driver: self.name.clone(),
            class,
        });

        if self.consecutive_timeouts >= self.config.max_consecutive_timeouts {
            self.enter_fault();
        } else {
            self.rearm_head();
        }
    }

    fn enter_fault(&mut self) {
        error!(
            driver = %self.name,
            timeouts = self.consecutive_timeouts,
            "Driver faulted, submissions suspended until reset"
        );
        self.close_link();
        let name = self.name.clone();
        let outstanding: Vec<_> = self.queue.drain(..).collect();
        for pending in outstanding {
            self.resolve_error(pending, PendingState::Failed, Error::DriverUnavailable(name.clone()));
        }
        while let Some(pending) = self.in_flight.pop_front() {
            self.resolve_error(pending, PendingState::Failed, Error::DriverUnavailable(name.clone()));
        }
        self.set_state(ConnectionState::Fault);
    }

    /// Reopen a failed link. In-flight commands fail because the
    /// controller may or may not have executed them; queued commands are
    /// kept and written after the reconnect.
    fn handle_link_failure(&mut self, cause: CommunicationError) {
        if !self.state.is_connected() {
            return;
        }
        warn!(driver = %self.name, error = %cause, "Link failed");
        let was_enabled = self.state == ConnectionState::Enabled;
        self.close_link();
        while let Some(pending) = self.in_flight.pop_front() {
            self.resolve_failed(pending, PendingState::Failed, cause.clone());
        }

        self.set_state(ConnectionState::Connecting);
        match self.open_link(self.config.reconnect_attempts, true) {
            Ok(()) => {
                info!(driver = %self.name, "Reconnected");
                self.set_state(ConnectionState::Connected);
                let mut classes = vec![CommandClass::Connect];
                if was_enabled {
                    classes.push(CommandClass::Enable);
                }
                // Replay the session setup ahead of anything still queued.
                let mut setup = Vec::new();
                for class in classes {
                    match self.encoder.encode_optional(class, &Variables::new()) {
                        Ok(commands) => setup.extend(commands),
                        Err(e) => warn!(driver = %self.name, %class, error = %e, "Setup not encoded"),
                    }
                }
                for command in setup.into_iter().rev() {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.queue.push_front(PendingCommand::new(id, command));
                }
                if was_enabled {
                    self.set_state(ConnectionState::Enabled);
                }
            }
            Err(e) => {
                error!(driver = %self.name, error = %e, "Reconnect failed");
                let outstanding: Vec<_> = self.queue.drain(..).collect();
                for pending in outstanding {
                    self.resolve_failed(pending, PendingState::Failed, e.clone());
                }
                self.set_state(ConnectionState::Fault);
            }
        }
    }

    fn open_link(
        &mut self,
        attempts: u32,
        backoff_first: bool,
    ) -> core::result::Result<(), CommunicationError> {
        let mut last = CommunicationError::Disconnected;
        for attempt in 0..attempts {
            if attempt > 0 || backoff_first {
                thread::sleep(self.config.reconnect_backoff.as_duration());
            }
            if self.context.abort().is_triggered() {
                return Err(CommunicationError::Aborted);
            }
            match self.transport.open(self.config.connect_timeout.as_duration()) {
                Ok(link) => return self.install(link),
                Err(e) => {
                    warn!(
                        driver = %self.name,
                        link = %self.transport.describe(),
                        attempt = attempt + 1,
                        error = %e,
                        "Open failed"
                    );
                    last = e.into();
                }
            }
        }
        Err(last)
    }

    fn install(&mut self, link: Link) -> core::result::Result<(), CommunicationError> {
        self.generation += 1;
        let reader = spawn_reader(&self.name, self.generation, link.reader, self.events_tx.clone())?;
        self.link = Some(ActiveLink {
            writer: link.writer,
            reader,
        });
        self.last_activity = Instant::now();
        debug!(
            driver = %self.name,
            link = %self.transport.describe(),
            generation = self.generation,
            "Link open"
        );
        Ok(())
    }

    fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.reader.stop();
        }
        // Events still queued from the closed link are stale.
        self.generation += 1;
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            warn!(driver = %self.name, %from, %to, "Invalid driver transition");
            return;
        }
        self.state = to;
        info!(driver = %self.name, %from, %to, "Driver state");
        self.context.emit(MachineEvent::DriverState {
            driver: self.name.clone(),
            from,
            to,
        });
    }

    fn fail_outstanding(&mut self, cause: impl Fn(&PendingCommand) -> CommunicationError) {
        let queued: Vec<_> = self.queue.drain(..).collect();
        for pending in queued {
            let source = cause(&pending);
            self.resolve_failed(pending, PendingState::Failed, source);
        }
        while let Some(pending) = self.in_flight.pop_front() {
            let source = cause(&pending);
            self.resolve_failed(pending, PendingState::Failed, source);
        }
    }

    fn resolve_confirmed(&mut self, mut pending: PendingCommand) {
        pending.transition(PendingState::Confirmed);
        self.consecutive_timeouts = 0;
        let confirmed = Confirmed {
            id: pending.id(),
            captures: pending.take_captures(),
            elapsed: pending.elapsed(),
        };
        debug!(driver = %self.name, id = confirmed.id, elapsed = ?confirmed.elapsed, "Confirmed");
        if !self.detached.remove(&confirmed.id) {
            self.outcomes.insert(confirmed.id, Ok(confirmed));
        }
    }

    fn resolve_failed(&mut self, pending: PendingCommand, state: PendingState, source: CommunicationError) {
        let error = self.command_error(pending.command(), source);
        self.resolve_error(pending, state, error);
    }

    fn resolve_error(&mut self, mut pending: PendingCommand, state: PendingState, error: Error) {
        pending.transition(state);
        self.detached.remove(&pending.id());
        self.outcomes.insert(pending.id(), Err(error));
    }

    fn collect(&mut self, id: CommandId) -> Result<Confirmed> {
        self.outcomes.remove(&id).unwrap_or_else(|| Err(self.unknown(id)))
    }

    fn take_failure(&mut self) -> Option<Error> {
        let id = self.outcomes.iter().find_map(|(id, outcome)| match outcome {
            Err(e) if e.communication() != Some(&CommunicationError::Cancelled) => Some(*id),
            _ => None,
        })?;
        self.outcomes.remove(&id).and_then(core::result::Result::err)
    }

    fn unknown(&self, id: CommandId) -> Error {
        Error::Link {
            driver: self.name.clone(),
            source: CommunicationError::UnknownCommand(id),
        }
    }

    fn command_error(&self, command: &Command, source: CommunicationError) -> Error {
        Error::Command {
            driver: self.name.clone(),
            class: command.class,
            template: command.template.clone(),
            axis: command.axis.clone(),
            source,
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close_link();
    }
}
