//! Machine construction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::axis::AxisMap;
use crate::config::{load_config, validate_config, MachineConfig};
use crate::driver::{registry, Dispatcher};
use crate::error::{ConfigError, Result};
use crate::motion::MotionPlanner;
use crate::transport::Transport;

use super::context::MachineContext;
use super::machine::{Actuator, Machine};

/// Builder wiring a configuration to its transports.
///
/// Drivers without an injected transport get the one their configuration
/// describes.
///
/// # Example
///
/// ```rust,ignore
/// use pnp_motion::{MachineBuilder, MockController};
///
/// let controller = MockController::new().reply_ok();
/// let machine = MachineBuilder::from_file("machine.toml")?
///     .transport("main", controller.transport())
///     .build()?;
/// ```
#[derive(Debug)]
pub struct MachineBuilder {
    config: MachineConfig,
    transports: BTreeMap<String, Box<dyn Transport>>,
}

impl MachineBuilder {
    /// Start from a configuration.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            transports: BTreeMap::new(),
        }
    }

    /// Start from a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or
    /// validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(path).map(Self::new)
    }

    /// Use `transport` for driver `driver`.
    pub fn transport(mut self, driver: impl Into<String>, transport: impl Transport + 'static) -> Self {
        self.transports.insert(driver.into(), Box::new(transport));
        self
    }

    /// Validate the configuration and build the machine. Links are not
    /// opened until [`Machine::connect`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid configurations or
    /// transports injected for unknown drivers.
    pub fn build(mut self) -> Result<Machine> {
        validate_config(&self.config)?;
        if let Some(name) = self.transports.keys().find(|n| self.config.driver(n).is_none()) {
            return Err(ConfigError::UnknownDriver {
                owner: "transport".to_string(),
                driver: name.clone(),
            }
            .into());
        }

        let axes = Arc::new(AxisMap::resolve(&self.config)?);
        let planner = MotionPlanner::new(self.config.planner.clone(), Arc::clone(&axes));

        let mut actuators = BTreeMap::new();
        for (name, actuator) in &self.config.actuators {
            actuators.insert(name.clone(), Actuator::parse(actuator)?);
        }

        let context = MachineContext::new(self.config);
        let mut drivers = BTreeMap::new();
        for (name, driver) in &context.config().drivers {
            let transport = self
                .transports
                .remove(name)
                .unwrap_or_else(|| registry::transport_for(&driver.transport));
            debug!(driver = %name, link = %transport.describe(), "Driver configured");
            drivers.insert(name.clone(), Dispatcher::new(name, &context, transport)?);
        }

        Ok(Machine::new(context, axes, planner, drivers, actuators))
    }
}
