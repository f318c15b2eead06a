//! Commands owned by a dispatcher.

use std::time::{Duration, Instant};

use crate::command::{Captures, Command};

/// Dispatcher-assigned command identifier, unique per driver.
pub type CommandId = u64;

/// Lifecycle of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting in the submission queue; may still be cancelled.
    Queued,
    /// Written to the link.
    Sent,
    /// Waiting for a confirmation line.
    AwaitingConfirmation,
    /// Confirmed by the controller.
    Confirmed,
    /// No confirmation within the timeout and retry budget.
    TimedOut,
    /// Failed by an error response, link failure or abort.
    Failed,
    /// Cancelled before it was sent.
    Cancelled,
}

impl PendingState {
    /// Check if a transition is valid.
    pub fn can_transition_to(self, next: PendingState) -> bool {
        use PendingState::*;
        matches!(
            (self, next),
            (Queued, Sent | Cancelled | Failed)
                | (Sent, AwaitingConfirmation | Failed)
                | (AwaitingConfirmation, Sent | Confirmed | TimedOut | Failed)
        )
    }

    /// Check if the command has resolved.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PendingState::Confirmed
                | PendingState::TimedOut
                | PendingState::Failed
                | PendingState::Cancelled
        )
    }
}

/// A command plus its dispatch bookkeeping.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    id: CommandId,
    command: Command,
    state: PendingState,
    submitted_at: Instant,
    sent_at: Option<Instant>,
    armed_at: Option<Instant>,
    attempts: u8,
    captures: Captures,
}

impl PendingCommand {
    /// Wrap a command in the queued state.
    pub fn new(id: CommandId, command: Command) -> Self {
        Self {
            id,
            command,
            state: PendingState::Queued,
            submitted_at: Instant::now(),
            sent_at: None,
            armed_at: None,
            attempts: 0,
            captures: Captures::new(),
        }
    }

    /// Identifier.
    #[inline]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// The command.
    #[inline]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> PendingState {
        self.state
    }

    /// Move to a new state. Returns `false` and leaves the state unchanged
    /// if the transition is invalid.
    pub fn transition(&mut self, to: PendingState) -> bool {
        if !self.state.can_transition_to(to) {
            return false;
        }
        let now = Instant::now();
        match to {
            PendingState::Sent => {
                self.sent_at = Some(now);
                self.attempts = self.attempts.saturating_add(1);
            }
            PendingState::AwaitingConfirmation => self.armed_at = Some(now),
            _ => {}
        }
        self.state = to;
        true
    }

    /// Restart the confirmation timer, used when the command reaches the
    /// head of the in-flight window.
    pub fn rearm(&mut self) {
        if self.state == PendingState::AwaitingConfirmation {
            self.armed_at = Some(Instant::now());
        }
    }

    /// Instant the confirmation timer expires.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed_at.map(|t| t + self.command.timeout)
    }

    /// Time since the first send, or since submission if never sent.
    pub fn elapsed(&self) -> Duration {
        self.sent_at.unwrap_or(self.submitted_at).elapsed()
    }

    /// Sends so far.
    #[inline]
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Check if a resend is still allowed.
    #[inline]
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.command.retries
    }

    /// Record values captured from a response line.
    pub fn capture(&mut self, captures: Captures) {
        self.captures.extend(captures);
    }

    /// Take the captured values.
    pub fn take_captures(&mut self) -> Captures {
        std::mem::take(&mut self.captures)
    }
}
