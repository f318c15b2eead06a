//! Configuration module for pnp-motion.
//!
//! Provides types for loading and validating the machine configuration
//! document: drivers and their links, axes and transforms, actuators and
//! planner settings.

mod actuator;
mod axis;
mod driver;
mod limits;
mod loader;
mod machine;
mod planner;
pub mod units;
mod validation;

pub use actuator::ActuatorConfig;
pub use axis::{AxisConfig, TransformConfig};
pub use driver::{
    CommandTemplates, DriverConfig, DriverKind, FlowControl, LineEnding, Parity, PatternConfig,
    SerialFlowControl, SerialSettings, TransportConfig, MAX_QUEUE_DEPTH,
};
pub use limits::{LimitPolicy, SoftLimits};
pub use loader::{load_config, parse_config};
pub use machine::MachineConfig;
pub use planner::PlannerSettings;
pub use validation::validate_config;
