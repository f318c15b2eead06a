//! Axis configuration from TOML.

use serde::Deserialize;

use crate::axis::AxisRole;

use super::limits::SoftLimits;

/// Complete axis configuration from TOML.
///
/// An axis is either bound to a controller channel (`driver` + `letter`)
/// or derived from another axis through a `transform`.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Logical role this axis fills, if any.
    #[serde(default)]
    pub role: Option<AxisRole>,

    /// Driver owning the controller channel.
    #[serde(default)]
    pub driver: Option<String>,

    /// Controller channel letter (`X`, `Y`, `Z`, `A`, ...).
    #[serde(default)]
    pub letter: Option<String>,

    /// Transform deriving this axis from another one.
    #[serde(default)]
    pub transform: Option<TransformConfig>,

    /// Home coordinate in logical units.
    #[serde(default)]
    pub home: f64,

    /// Controller resolution in ticks per unit.
    #[serde(default = "default_ticks_per_unit")]
    pub ticks_per_unit: f64,

    /// Maximum velocity in units per second.
    #[serde(default)]
    pub max_velocity: Option<f64>,

    /// Maximum acceleration in units per second squared.
    #[serde(default)]
    pub max_acceleration: Option<f64>,

    /// Maximum jerk in units per second cubed.
    #[serde(default)]
    pub max_jerk: Option<f64>,

    /// Optional soft limits.
    #[serde(default)]
    pub limits: Option<SoftLimits>,
}

fn default_ticks_per_unit() -> f64 {
    1000.0
}

/// Transform deriving a logical axis from a source axis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    /// `value = -source`.
    Negate {
        /// Source axis name.
        source: String,
    },
    /// `value = scale * source + offset`.
    Map {
        /// Source axis name.
        source: String,
        /// Scale factor (non-zero).
        scale: f64,
        /// Offset in logical units.
        #[serde(default)]
        offset: f64,
    },
}

impl TransformConfig {
    /// Name of the wrapped axis.
    pub fn source(&self) -> &str {
        match self {
            TransformConfig::Negate { source } | TransformConfig::Map { source, .. } => source,
        }
    }

    /// Affine coefficients `(scale, offset)` of this single step.
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            TransformConfig::Negate { .. } => (-1.0, 0.0),
            TransformConfig::Map { scale, offset, .. } => (*scale, *offset),
        }
    }
}

impl AxisConfig {
    /// Check if this axis talks to a controller directly.
    pub fn is_controller_axis(&self) -> bool {
        self.driver.is_some()
    }
}
