//! Logical axis roles and machine locations.

use core::fmt;

use serde::Deserialize;

/// Logical role an axis fills in the canonical coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRole {
    /// Linear X.
    X,
    /// Linear Y.
    Y,
    /// Linear Z.
    Z,
    /// Nozzle rotation (degrees).
    Rotation,
}

impl AxisRole {
    /// Every role, in coordinate order.
    pub const ALL: [AxisRole; 4] = [AxisRole::X, AxisRole::Y, AxisRole::Z, AxisRole::Rotation];

    /// Index into coordinate arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            AxisRole::X => 0,
            AxisRole::Y => 1,
            AxisRole::Z => 2,
            AxisRole::Rotation => 3,
        }
    }

    /// Template variable name for this role.
    #[inline]
    pub const fn variable(self) -> &'static str {
        match self {
            AxisRole::X => "X",
            AxisRole::Y => "Y",
            AxisRole::Z => "Z",
            AxisRole::Rotation => "Rotation",
        }
    }

    /// Check if the role contributes to Cartesian path length.
    #[inline]
    pub const fn is_linear(self) -> bool {
        !matches!(self, AxisRole::Rotation)
    }
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variable())
    }
}

/// A target or current location in logical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Rotation in degrees.
    pub rotation: f64,
}

impl Location {
    /// Create a new location.
    pub const fn new(x: f64, y: f64, z: f64, rotation: f64) -> Self {
        Self { x, y, z, rotation }
    }

    /// Build from a coordinate array indexed by [`AxisRole::index`].
    pub const fn from_array(c: [f64; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }

    /// Coordinates indexed by [`AxisRole::index`].
    pub const fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.rotation]
    }

    /// Coordinate for a role.
    pub fn get(&self, role: AxisRole) -> f64 {
        self.to_array()[role.index()]
    }

    /// Replace the coordinate for a role.
    pub fn with(self, role: AxisRole, value: f64) -> Self {
        let mut c = self.to_array();
        c[role.index()] = value;
        Self::from_array(c)
    }

    /// Per-role difference `other - self`.
    pub fn delta_to(&self, other: &Location) -> [f64; 4] {
        let a = self.to_array();
        let b = other.to_array();
        [b[0] - a[0], b[1] - a[1], b[2] - a[2], b[3] - a[3]]
    }

    /// Cartesian distance over X, Y and Z.
    pub fn linear_distance(&self, other: &Location) -> f64 {
        let d = self.delta_to(other);
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }

    /// Check if all coordinates are within `tolerance`.
    pub fn approx_eq(&self, other: &Location, tolerance: f64) -> bool {
        self.delta_to(other).iter().all(|d| d.abs() <= tolerance)
    }

    /// Check if every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}, {:.4})",
            self.x, self.y, self.z, self.rotation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_and_get() {
        let loc = Location::new(1.0, 2.0, 3.0, 4.0).with(AxisRole::Z, -5.0);
        assert_eq!(loc.get(AxisRole::Z), -5.0);
        assert_eq!(loc.get(AxisRole::Rotation), 4.0);
    }

    #[test]
    fn test_linear_distance_ignores_rotation() {
        let a = Location::new(0.0, 0.0, 0.0, 0.0);
        let b = Location::new(3.0, 4.0, 0.0, 90.0);
        assert!((a.linear_distance(&b) - 5.0).abs() < 1e-12);
    }
}
