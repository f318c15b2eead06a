//! Machine event callbacks.
//!
//! Listeners are plain closures registered on the [`EventBus`]. They run on
//! the thread that emits the event, usually the machine executor, and must
//! not block.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::axis::Location;
use crate::command::CommandClass;
use crate::config::PlannerSettings;
use crate::driver::ConnectionState;

/// Something observers may want to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// A driver changed connection state.
    DriverState {
        /// Driver name.
        driver: String,
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// A command timed out.
    CommandTimedOut {
        /// Driver name.
        driver: String,
        /// Command class.
        class: CommandClass,
    },
    /// The machine was homed.
    Homed(Location),
    /// A move was issued to its drivers.
    MoveCompleted {
        /// End location.
        end: Location,
        /// Planned duration in seconds.
        duration: f64,
    },
    /// A move fell back to a single moderated command.
    InterpolationFallback {
        /// Start location.
        start: Location,
        /// End location.
        end: Location,
    },
    /// A machine-wide abort ran.
    Aborted,
    /// Planner settings were replaced.
    PlannerSettingsChanged(PlannerSettings),
}

/// Listener registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&MachineEvent) + Send + Sync>;

/// Registry of event listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MachineEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: &MachineEvent) {
        for (_, listener) in self.listeners.read().iter() {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = bus.subscribe(move |e| sink.lock().push(e.clone()));

        bus.emit(&MachineEvent::Aborted);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&MachineEvent::Aborted);

        assert_eq!(*seen.lock(), vec![MachineEvent::Aborted]);
        assert!(bus.is_empty());
    }
}
