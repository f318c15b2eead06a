//! Machine configuration - root configuration structure.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::actuator::ActuatorConfig;
use super::axis::AxisConfig;
use super::driver::DriverConfig;
use super::planner::PlannerSettings;

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MachineConfig {
    /// Planner settings.
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Z coordinate considered safe for travel moves.
    #[serde(default)]
    pub safe_z: f64,

    /// Named drivers.
    #[serde(default)]
    pub drivers: BTreeMap<String, DriverConfig>,

    /// Named axes.
    #[serde(default)]
    pub axes: BTreeMap<String, AxisConfig>,

    /// Named actuators.
    #[serde(default)]
    pub actuators: BTreeMap<String, ActuatorConfig>,
}

impl MachineConfig {
    /// Get a driver configuration by name.
    pub fn driver(&self, name: &str) -> Option<&DriverConfig> {
        self.drivers.get(name)
    }

    /// Get an axis configuration by name.
    pub fn axis(&self, name: &str) -> Option<&AxisConfig> {
        self.axes.get(name)
    }

    /// Get an actuator configuration by name.
    pub fn actuator(&self, name: &str) -> Option<&ActuatorConfig> {
        self.actuators.get(name)
    }

    /// List all driver names.
    pub fn driver_names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(|s| s.as_str())
    }

    /// List all axis names.
    pub fn axis_names(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(|s| s.as_str())
    }
}
