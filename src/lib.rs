//! # pnp-motion
//!
//! Motion planning and controller driver core for pick-and-place machines.
//!
//! ## Features
//!
//! - **Configuration-driven**: Define drivers, axes and actuators in TOML files
//! - **Jerk-limited planning**: Seven-phase S-curve profiles with junction blending
//! - **Axis transforms**: Negated and scaled axes flatten to one affine map
//! - **Template commands**: G-code style text or single-key JSON protocols
//! - **Flow control**: Confirmation, hardware handshake or queued pipelining
//! - **Fault handling**: Timeouts escalate to a driver fault, I/O failures reconnect
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pnp_motion::{Location, MachineBuilder, MachineExecutor, MoveOptions};
//!
//! // Load configuration and open the links
//! let mut machine = MachineBuilder::from_file("machine.toml")?.build()?;
//! machine.connect()?;
//!
//! // Run the machine on its executor thread
//! let executor = MachineExecutor::spawn(machine)?;
//! let handle = executor.handle();
//!
//! handle.home()?;
//! handle.move_to_at_safe_z(Location::new(120.0, 80.0, -10.0, 90.0), MoveOptions::default())?;
//! handle.actuate("vacuum", true)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `serial` (default): Enables the serial port transport

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]

// Core modules
pub mod axis;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod machine;
pub mod motion;
pub mod transport;

// Re-exports for ergonomic API
pub use axis::{AxisMap, AxisRole, Location, Position};
pub use command::{Command, CommandClass, CommandEncoder, Template, Variables};
pub use config::{load_config, parse_config, validate_config, MachineConfig, PlannerSettings};
pub use driver::{Completion, ConnectionState, Dispatcher};
pub use error::{CommunicationError, ConfigError, Error, MotionError, Result};
pub use machine::{
    ActuatorValue, Machine, MachineBuilder, MachineContext, MachineEvent, MachineExecutor,
    MachineHandle, MoveTicket,
};
pub use motion::{MotionPhase, MotionPlanner, MotionProfile, MotionSegment, MoveOptions};
pub use transport::{MockController, Transport};
