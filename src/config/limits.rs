//! Soft limit configuration and types.

use serde::Deserialize;

/// Policy for handling limit violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Reject moves that would exceed limits.
    #[default]
    Reject,
    /// Clamp target to nearest limit.
    Clamp,
}

/// Soft limits in logical axis units (from configuration).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SoftLimits {
    /// Minimum allowed coordinate.
    pub min: f64,

    /// Maximum allowed coordinate.
    pub max: f64,

    /// What to do when limit is exceeded.
    #[serde(default)]
    pub policy: LimitPolicy,
}

impl SoftLimits {
    /// Create new soft limits.
    pub fn new(min: f64, max: f64, policy: LimitPolicy) -> Self {
        Self { min, max, policy }
    }

    /// Check if limits are valid (min < max).
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }

    /// Check if a coordinate is within limits.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Apply limit policy to a target coordinate.
    ///
    /// Returns `Some(value)` if valid or clamped, `None` if rejected.
    pub fn apply(&self, target: f64) -> Option<f64> {
        if self.contains(target) {
            Some(target)
        } else {
            match self.policy {
                LimitPolicy::Reject => None,
                LimitPolicy::Clamp => Some(target.clamp(self.min, self.max)),
            }
        }
    }

    /// Map limits through an affine transform `scale * v + offset`.
    ///
    /// A negative scale swaps the bounds.
    pub fn transformed(&self, scale: f64, offset: f64) -> Self {
        let a = scale * self.min + offset;
        let b = scale * self.max + offset;
        Self {
            min: a.min(b),
            max: a.max(b),
            policy: self.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_limits_reject() {
        let limits = SoftLimits::new(-180.0, 180.0, LimitPolicy::Reject);

        assert!(limits.apply(0.0).is_some());
        assert!(limits.apply(180.0).is_some());
        assert!(limits.apply(-180.0).is_some());
        assert!(limits.apply(181.0).is_none());
        assert!(limits.apply(-181.0).is_none());
    }

    #[test]
    fn test_soft_limits_clamp() {
        let limits = SoftLimits::new(-180.0, 180.0, LimitPolicy::Clamp);

        assert_eq!(limits.apply(0.0).unwrap(), 0.0);
        assert_eq!(limits.apply(360.0).unwrap(), 180.0);
        assert_eq!(limits.apply(-360.0).unwrap(), -180.0);
    }

    #[test]
    fn test_negated_limits_swap() {
        let limits = SoftLimits::new(-5.0, 40.0, LimitPolicy::Reject).transformed(-1.0, 0.0);
        assert_eq!(limits.min, -40.0);
        assert_eq!(limits.max, 5.0);
    }
}
