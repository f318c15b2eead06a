//! Error types for pnp-motion.
//!
//! Provides unified error handling across configuration, motion planning,
//! controller communication and machine-level operations.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::axis::AxisRole;
use crate::command::CommandClass;
use crate::motion::SegmentState;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all pnp-motion operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration parsing or validation error (fatal at load).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Motion planning error.
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    /// Communication failure without command context (connect, reconnect).
    #[error("Communication error on driver '{driver}': {source}")]
    Link {
        /// Driver that owns the link.
        driver: String,
        /// Underlying failure.
        #[source]
        source: CommunicationError,
    },

    /// A command failed; wraps the transport failure with command context.
    #[error(
        "{class} command on driver '{driver}'{} failed{}",
        describe_axis(.axis),
        describe_template(.template)
    )]
    Command {
        /// Driver the command was bound to.
        driver: String,
        /// Command class.
        class: CommandClass,
        /// Template the command was rendered from, if any.
        template: Option<String>,
        /// Axis the command addressed, if any.
        axis: Option<String>,
        /// Underlying failure.
        #[source]
        source: CommunicationError,
    },

    /// The driver is faulted or disconnected and rejects submissions.
    #[error("Driver '{0}' unavailable")]
    DriverUnavailable(String),

    /// A machine-level operation failed; carries the move/actuation context.
    #[error("{context}")]
    Operation {
        /// Human readable operation context ("move to ...", "actuate vacuum").
        context: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Operator or safety abort; never retried.
    #[error("Operation aborted")]
    Aborted,

    /// A batched move was skipped because an earlier move in its batch failed.
    #[error("Move not executed: {0}")]
    NotExecuted(String),

    /// The machine executor thread is no longer running.
    #[error("Machine executor stopped")]
    ExecutorStopped,
}

fn describe_axis(axis: &Option<String>) -> String {
    match axis {
        Some(a) => format!(" for axis '{}'", a),
        None => String::new(),
    }
}

fn describe_template(template: &Option<String>) -> String {
    match template {
        Some(t) => format!(" (template `{}`)", t),
        None => String::new(),
    }
}

impl Error {
    /// Attach operation context, preserving the causal chain.
    pub fn context(self, context: impl Into<String>) -> Self {
        match self {
            // Aborts stay recognisable at the top level.
            Error::Aborted => Error::Aborted,
            other => Error::Operation {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost communication failure, if this error carries one.
    pub fn communication(&self) -> Option<&CommunicationError> {
        match self {
            Error::Link { source, .. } | Error::Command { source, .. } => Some(source),
            Error::Operation { source, .. } => source.communication(),
            _ => None,
        }
    }

    /// Check whether this error is (or wraps) a driver-unavailable rejection.
    pub fn is_driver_unavailable(&self) -> bool {
        match self {
            Error::DriverUnavailable(_) => true,
            Error::Operation { source, .. } => source.is_driver_unavailable(),
            _ => false,
        }
    }

    /// Check whether this error is (or wraps) an abort.
    pub fn is_aborted(&self) -> bool {
        match self {
            Error::Aborted => true,
            Error::Operation { source, .. } => source.is_aborted(),
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Failed to parse the TOML document.
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Soft limits where min is not below max.
    #[error("Axis '{axis}': invalid soft limits, min ({min}) must be < max ({max})")]
    InvalidLimits {
        /// Axis name.
        axis: String,
        /// Minimum limit.
        min: f64,
        /// Maximum limit.
        max: f64,
    },

    /// Non-positive or non-finite kinematic limit.
    #[error("Axis '{axis}': {field} must be > 0, got {value}")]
    InvalidKinematics {
        /// Axis name.
        axis: String,
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Non-positive resolution.
    #[error("Axis '{axis}': ticks_per_unit must be > 0, got {value}")]
    InvalidResolution {
        /// Axis name.
        axis: String,
        /// Offending value.
        value: f64,
    },

    /// Transform references a missing axis.
    #[error("Axis '{axis}' references unknown axis '{reference}'")]
    UnknownAxis {
        /// Referencing axis.
        axis: String,
        /// Missing axis.
        reference: String,
    },

    /// Transform chain loops back on itself.
    #[error("Axis transform chain starting at '{0}' is cyclic")]
    TransformCycle(String),

    /// Axis is neither bound to a driver nor transformed, or is both.
    #[error("Axis '{axis}': {message}")]
    AxisBinding {
        /// Axis name.
        axis: String,
        /// Reason.
        message: String,
    },

    /// Degenerate linear transform.
    #[error("Axis '{0}': transform scale must be non-zero")]
    InvalidTransform(String),

    /// Two axes claim the same role.
    #[error("Role {role} bound to both '{first}' and '{second}'")]
    DuplicateRole {
        /// Contested role.
        role: AxisRole,
        /// First axis claiming the role.
        first: String,
        /// Second axis claiming the role.
        second: String,
    },

    /// An axis or actuator names a driver that does not exist.
    #[error("'{owner}' references unknown driver '{driver}'")]
    UnknownDriver {
        /// Axis or actuator name.
        owner: String,
        /// Missing driver.
        driver: String,
    },

    /// A per-class table names a class that does not exist.
    #[error("Driver '{driver}': {field} names unknown command class '{key}'")]
    UnknownCommandClass {
        /// Driver name.
        driver: String,
        /// Table holding the key.
        field: &'static str,
        /// Offending key.
        key: String,
    },

    /// A regular expression does not compile.
    #[error("Driver '{driver}': invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// Driver name.
        driver: String,
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// Template syntax error.
    #[error("Invalid template `{template}`: {message}")]
    InvalidTemplate {
        /// Offending template.
        template: String,
        /// Parser message.
        message: String,
    },

    /// Interpolation or junction parameter out of range.
    #[error("Planner setting {field} out of range: {value}")]
    InvalidPlanner {
        /// Setting name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Serial port settings out of range.
    #[error("Driver '{driver}': invalid serial settings: {message}")]
    InvalidSerial {
        /// Driver name.
        driver: String,
        /// Reason.
        message: String,
    },

    /// TCP settings out of range.
    #[error("Driver '{driver}': invalid TCP settings: {message}")]
    InvalidTcp {
        /// Driver name.
        driver: String,
        /// Reason.
        message: String,
    },

    /// Async queue depth out of range.
    #[error("Driver '{driver}': queue depth {depth} outside 1..={max}")]
    InvalidQueueDepth {
        /// Driver name.
        driver: String,
        /// Requested depth.
        depth: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Zero timeout.
    #[error("Driver '{driver}': {field} must be > 0")]
    InvalidTimeout {
        /// Driver name.
        driver: String,
        /// Offending field.
        field: &'static str,
    },

    /// Driver has no template for a required command class.
    #[error("Driver '{driver}' has no {class} command configured")]
    MissingTemplate {
        /// Driver name.
        driver: String,
        /// Missing class.
        class: CommandClass,
    },

    /// Actuator name not found.
    #[error("Actuator '{0}' not found")]
    UnknownActuator(String),

    /// No transport available for a driver.
    #[error("No transport available for driver '{0}'")]
    MissingTransport(String),
}

/// Kinematic quantity, used when reporting clamped requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Velocity (units/s).
    Velocity,
    /// Acceleration (units/s²).
    Acceleration,
    /// Jerk (units/s³).
    Jerk,
    /// Speed factor (fraction of maximum).
    SpeedFactor,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Velocity => write!(f, "velocity"),
            Quantity::Acceleration => write!(f, "acceleration"),
            Quantity::Jerk => write!(f, "jerk"),
            Quantity::SpeedFactor => write!(f, "speed factor"),
        }
    }
}

/// Motion planning errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// Requested kinematics exceed capability; clamped and reported.
    #[error("Requested {quantity} {requested} exceeds capability {max}, clamped")]
    ExceedsCapability {
        /// Clamped quantity.
        quantity: Quantity,
        /// Requested value.
        requested: f64,
        /// Value actually used.
        max: f64,
    },

    /// Target lies outside soft limits under the reject policy.
    #[error("Axis '{axis}' target {target} outside soft limits [{min}, {max}]")]
    SoftLimit {
        /// Axis name.
        axis: String,
        /// Requested logical coordinate.
        target: f64,
        /// Minimum limit.
        min: f64,
        /// Maximum limit.
        max: f64,
    },

    /// Target coordinate is not a finite number.
    #[error("Target coordinate for {0} is not finite")]
    InvalidTarget(AxisRole),

    /// The position was lost by an abort; home or read it back first.
    #[error("Position unknown since abort, home or read back the position first")]
    PositionUnknown,

    /// Segment state machine violation.
    #[error("Invalid segment transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SegmentState,
        /// Requested state.
        to: SegmentState,
    },
}

/// Controller communication failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommunicationError {
    /// No confirmation arrived within the command timeout.
    #[error("No confirmation within {0:?}")]
    Timeout(Duration),

    /// A response matched the driver's error pattern.
    #[error("Controller reported error: {0}")]
    ErrorResponse(String),

    /// A response could not be interpreted.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Transport-level I/O failure.
    #[error("I/O failure ({kind:?}): {message}")]
    Io {
        /// Error kind.
        kind: io::ErrorKind,
        /// Error message.
        message: String,
    },

    /// The link closed while the command was outstanding.
    #[error("Link closed")]
    Disconnected,

    /// Cancelled before it was sent.
    #[error("Cancelled before send")]
    Cancelled,

    /// Flushed by a machine-wide abort.
    #[error("Aborted")]
    Aborted,

    /// No command with this id is queued, in flight or awaiting collection.
    #[error("No pending command {0}")]
    UnknownCommand(u64),
}

impl From<io::Error> for CommunicationError {
    fn from(e: io::Error) -> Self {
        CommunicationError::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.message().to_string())
    }
}
