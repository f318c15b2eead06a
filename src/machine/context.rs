//! Shared machine context.
//!
//! The context is built once from the configuration snapshot and handed to
//! every component constructor. Nothing reaches configuration through
//! globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{DriverConfig, MachineConfig};
use crate::error::{ConfigError, Result};

use super::events::{EventBus, MachineEvent};

/// Machine-wide abort flag.
///
/// Set from any thread; blocking waits on the executor observe it and bail
/// out with [`Error::Aborted`](crate::Error::Aborted).
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the signal.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Check if the signal is raised.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration snapshot, event bus and abort signal.
#[derive(Debug, Clone)]
pub struct MachineContext {
    config: Arc<MachineConfig>,
    events: Arc<EventBus>,
    abort: AbortSignal,
}

impl MachineContext {
    /// Create a context for a validated configuration.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config: Arc::new(config),
            events: Arc::new(EventBus::new()),
            abort: AbortSignal::new(),
        }
    }

    /// Configuration snapshot.
    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Driver configuration by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDriver`] if no such driver exists.
    pub fn driver_config(&self, name: &str) -> Result<&DriverConfig> {
        self.config.driver(name).ok_or_else(|| {
            ConfigError::UnknownDriver {
                owner: "machine".to_string(),
                driver: name.to_string(),
            }
            .into()
        })
    }

    /// Event bus.
    #[inline]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Emit an event.
    pub fn emit(&self, event: MachineEvent) {
        self.events.emit(&event);
    }

    /// Abort signal.
    #[inline]
    pub fn abort(&self) -> &AbortSignal {
        &self.abort
    }
}
