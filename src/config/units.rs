//! Unit helpers for controller-facing quantities.
//!
//! Logical coordinates are plain `f64` in machine units (mm or degrees);
//! these types cover the places where the controller's view differs:
//! integer ticks, per-minute feedrates and millisecond settings.

use core::ops::{Add, Sub};
use std::time::Duration;

use serde::Deserialize;

/// Controller position in resolution ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Ticks(pub i64);

impl Ticks {
    /// Convert a coordinate to the nearest tick.
    #[inline]
    pub fn from_units(value: f64, ticks_per_unit: f64) -> Self {
        Self((value * ticks_per_unit).round() as i64)
    }

    /// Convert back to machine units.
    #[inline]
    pub fn to_units(self, ticks_per_unit: f64) -> f64 {
        self.0 as f64 / ticks_per_unit
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Add for Ticks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Ticks {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Snap a coordinate to the axis resolution grid.
#[inline]
pub fn snap(value: f64, ticks_per_unit: f64) -> f64 {
    Ticks::from_units(value, ticks_per_unit).to_units(ticks_per_unit)
}

/// Convert units/s to the units/min feedrate G-code controllers expect.
#[inline]
pub fn per_minute(per_second: f64) -> f64 {
    per_second * 60.0
}

/// Millisecond setting from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(transparent)]
pub struct Millis(pub u64);

impl Millis {
    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Convert to a [`Duration`].
    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for Millis {
    fn from(d: Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_round_to_nearest() {
        assert_eq!(Ticks::from_units(1.00049, 1000.0), Ticks(1000));
        assert_eq!(Ticks::from_units(1.0006, 1000.0), Ticks(1001));
        assert_eq!(Ticks::from_units(-0.0026, 1000.0), Ticks(-3));
    }

    #[test]
    fn test_snap() {
        assert!((snap(10.12345, 100.0) - 10.12).abs() < 1e-12);
        assert!((snap(-3.3333, 80.0) - (-267.0 / 80.0)).abs() < 1e-12);
    }

    #[test]
    fn test_feedrate_conversion() {
        assert!((per_minute(250.0) - 15000.0).abs() < 1e-9);
    }
}
