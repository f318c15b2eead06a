//! Actuator configuration.

use serde::Deserialize;

/// Actuator bound to a driver.
///
/// Templates receive `{Index}`, `{True}`/`{False}` (boolean) and
/// `{DoubleValue}`/`{IntegerValue}` (numeric) variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActuatorConfig {
    /// Driver that executes the actuator commands.
    pub driver: String,

    /// Controller index passed as `{Index}`.
    #[serde(default)]
    pub index: Option<u32>,

    /// Template for boolean actuation (`{True:M808}{False:M809}`).
    #[serde(default)]
    pub actuate_boolean: Option<String>,

    /// Template for numeric actuation (`M3 {DoubleValue:S%.0f}`).
    #[serde(default)]
    pub actuate_double: Option<String>,

    /// Template requesting a reading.
    #[serde(default)]
    pub read: Option<String>,

    /// Regex capturing the reading in a `Value` named group.
    #[serde(default)]
    pub read_regex: Option<String>,

    /// Wait for all motion on the driver before actuating.
    #[serde(default = "default_coordinated")]
    pub coordinated: bool,
}

fn default_coordinated() -> bool {
    true
}
