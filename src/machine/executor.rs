//! Machine executor thread.
//!
//! All motion and actuation runs on one thread that owns the [`Machine`].
//! Callers talk to it through a cloneable [`MachineHandle`]; requests are
//! served strictly in arrival order. Coordinated moves that are already
//! queued when a move starts are planned together, so continuous motion
//! can blend their junctions.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::axis::{Location, Position};
use crate::command::Captures;
use crate::config::PlannerSettings;
use crate::error::{Error, Result};
use crate::motion::MoveOptions;

use super::context::{AbortSignal, MachineContext};
use super::events::EventBus;
use super::machine::{ActuatorValue, Machine};

/// Idle interval between keep-alive checks.
const IDLE_POLL: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce(Option<&mut Machine>) + Send>;

type MoveRequest = (Location, MoveOptions, Sender<Result<()>>);

enum Message {
    /// Run against the machine; `None` means the job was flushed by an abort.
    Job(Job),
    Move(MoveRequest),
    Abort,
    Shutdown,
}

/// Pending result of a queued move.
#[derive(Debug)]
pub struct MoveTicket(Receiver<Result<()>>);

impl MoveTicket {
    /// Wait for the move to be issued.
    ///
    /// # Errors
    ///
    /// Returns the move failure, or [`Error::ExecutorStopped`].
    pub fn wait(self) -> Result<()> {
        self.0.recv().map_err(|_| Error::ExecutorStopped)?
    }
}

/// Cloneable handle to a running machine executor.
#[derive(Debug, Clone)]
pub struct MachineHandle {
    tx: Sender<Message>,
    context: MachineContext,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Job(_) => f.write_str("Job"),
            Message::Move((target, ..)) => write!(f, "Move({})", target),
            Message::Abort => f.write_str("Abort"),
            Message::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl MachineHandle {
    /// Run a closure on the executor thread and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, [`Error::Aborted`] if an abort flushed
    /// the request, or [`Error::ExecutorStopped`].
    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Machine) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move |machine| {
            let result = match machine {
                Some(machine) => f(machine),
                None => Err(Error::Aborted),
            };
            let _ = tx.send(result);
        });
        self.tx
            .send(Message::Job(job))
            .map_err(|_| Error::ExecutorStopped)?;
        rx.recv().map_err(|_| Error::ExecutorStopped)?
    }

    /// Event bus of the machine.
    pub fn events(&self) -> &EventBus {
        self.context.events()
    }

    /// Connect and enable every driver.
    pub fn connect(&self) -> Result<()> {
        self.call(Machine::connect)
    }

    /// Home the machine.
    pub fn home(&self) -> Result<()> {
        self.call(Machine::home)
    }

    /// Queue a move without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutorStopped`] if the executor is gone.
    pub fn queue_move(&self, target: Location, options: MoveOptions) -> Result<MoveTicket> {
        let (tx, rx) = mpsc::channel();
        self.tx
            .send(Message::Move((target, options, tx)))
            .map_err(|_| Error::ExecutorStopped)?;
        Ok(MoveTicket(rx))
    }

    /// Move to a location and wait until it is issued.
    pub fn move_to(&self, target: Location, options: MoveOptions) -> Result<()> {
        self.queue_move(target, options)?.wait()
    }

    /// Move to a location through safe Z.
    pub fn move_to_at_safe_z(&self, target: Location, options: MoveOptions) -> Result<()> {
        self.call(move |m| m.move_to_at_safe_z(target, options))
    }

    /// Plan and issue a run of moves together.
    pub fn move_path(&self, moves: Vec<(Location, MoveOptions)>) -> Result<()> {
        self.call(move |m| m.move_path(&moves))
    }

    /// Write an actuator.
    pub fn actuate(&self, name: &str, value: impl Into<ActuatorValue>) -> Result<()> {
        let name = name.to_string();
        let value = value.into();
        self.call(move |m| m.actuate(&name, value))
    }

    /// Read an actuator.
    pub fn read_actuator(&self, name: &str) -> Result<String> {
        let name = name.to_string();
        self.call(move |m| m.read_actuator(&name))
    }

    /// Read the position back from the controllers.
    pub fn read_position(&self) -> Result<Location> {
        self.call(Machine::read_position)
    }

    /// Current tracked position.
    pub fn position(&self) -> Result<Position> {
        self.call(|m| Ok(*m.position()))
    }

    /// Send a literal line to a driver.
    pub fn send_raw(&self, driver: &str, text: &str) -> Result<Captures> {
        let driver = driver.to_string();
        let text = text.to_string();
        self.call(move |m| m.send_raw(&driver, &text))
    }

    /// Wait for all motion to finish.
    pub fn wait_for_completion(&self) -> Result<()> {
        self.call(Machine::wait_for_completion)
    }

    /// Replace the planner settings.
    pub fn set_planner_settings(&self, settings: PlannerSettings) -> Result<()> {
        self.call(move |m| {
            m.set_planner_settings(settings);
            Ok(())
        })
    }

    /// Abort everything. Takes effect immediately, even while the executor
    /// is blocked waiting for a confirmation; queued requests fail with
    /// [`Error::Aborted`].
    pub fn abort(&self) {
        self.context.abort().trigger();
        let _ = self.tx.send(Message::Abort);
    }

    /// Clear an abort or driver fault and reconnect.
    pub fn reset(&self) -> Result<()> {
        self.call(Machine::reset)
    }

    /// Ask the executor to stop after the requests already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Owner of the executor thread.
#[derive(Debug)]
pub struct MachineExecutor {
    handle: MachineHandle,
    thread: Option<JoinHandle<()>>,
}

impl MachineExecutor {
    /// Move the machine onto its own thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(machine: Machine) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let context = machine.context().clone();
        let thread = thread::Builder::new()
            .name("machine-executor".to_string())
            .spawn(move || run(machine, rx))?;

        Ok(Self {
            handle: MachineHandle { tx, context },
            thread: Some(thread),
        })
    }

    /// Handle for submitting requests.
    pub fn handle(&self) -> MachineHandle {
        self.handle.clone()
    }

    /// Stop the executor and wait for it. Drivers are disconnected.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Machine executor panicked");
            }
        }
    }
}

impl Drop for MachineExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut machine: Machine, rx: Receiver<Message>) {
    let abort = machine.context().abort().clone();
    let mut held: Option<Message> = None;
    info!("Machine executor started");

    loop {
        if abort.is_triggered() {
            if handle_abort(&mut machine, &abort, &rx, &mut held) {
                break;
            }
            continue;
        }

        let message = match held.take() {
            Some(message) => message,
            None => match rx.recv_timeout(IDLE_POLL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    machine.keep_alive();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        match message {
            Message::Job(job) => job(Some(&mut machine)),
            Message::Move(request) => {
                let batch = collect_batch(&machine, request, &rx, &mut held);
                run_batch(&mut machine, batch);
            }
            // Handled at the top of the loop while the signal is raised;
            // a late message for an abort already handled is ignored.
            Message::Abort => {}
            Message::Shutdown => break,
        }
    }

    machine.disconnect();
    info!("Machine executor stopped");
}

/// Gather coordinated moves already waiting behind `first`, up to the
/// lookahead window.
fn collect_batch(
    machine: &Machine,
    first: MoveRequest,
    rx: &Receiver<Message>,
    held: &mut Option<Message>,
) -> Vec<MoveRequest> {
    let settings = machine.planner().settings();
    let blend = settings.continuous_motion && first.1.coordinated;
    let mut batch = vec![first];
    if !blend {
        return batch;
    }

    while batch.len() < settings.lookahead {
        match rx.try_recv() {
            Ok(Message::Move(request)) if request.1.coordinated => batch.push(request),
            Ok(other) => {
                *held = Some(other);
                break;
            }
            Err(_) => break,
        }
    }
    batch
}

fn run_batch(machine: &mut Machine, batch: Vec<MoveRequest>) {
    if batch.len() > 1 {
        debug!(moves = batch.len(), "Planning queued moves together");
    }
    let moves: Vec<_> = batch.iter().map(|(target, options, _)| (*target, *options)).collect();

    match machine.move_path(&moves) {
        Ok(()) => {
            for (_, _, reply) in batch {
                let _ = reply.send(Ok(()));
            }
        }
        Err(e) => {
            let aborted = e.is_aborted();
            let message = e.to_string();
            let mut replies = batch.into_iter().map(|(_, _, reply)| reply);
            if let Some(first) = replies.next() {
                let _ = first.send(Err(e));
            }
            for reply in replies {
                let error = if aborted {
                    Error::Aborted
                } else {
                    Error::NotExecuted(message.clone())
                };
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Run the machine abort and fail every request still queued. Returns
/// `true` if a shutdown was among them.
fn handle_abort(
    machine: &mut Machine,
    abort: &AbortSignal,
    rx: &Receiver<Message>,
    held: &mut Option<Message>,
) -> bool {
    machine.abort();

    let mut shutdown = false;
    let mut flushed = 0usize;
    for message in held.take().into_iter().chain(rx.try_iter()) {
        match message {
            Message::Job(job) => {
                flushed += 1;
                job(None);
            }
            Message::Move((_, _, reply)) => {
                flushed += 1;
                let _ = reply.send(Err(Error::Aborted));
            }
            Message::Abort => {}
            Message::Shutdown => shutdown = true,
        }
    }
    if flushed > 0 {
        debug!(flushed, "Flushed queued requests");
    }

    abort.clear();
    shutdown
}
