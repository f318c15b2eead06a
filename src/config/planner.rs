//! Motion planner settings.

use serde::Deserialize;

/// Interpolation and blending settings shared by every move.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Blend consecutive coordinated moves through their junctions.
    pub continuous_motion: bool,

    /// Maximum lateral deviation tolerated at a corner (units).
    pub junction_deviation: f64,

    /// Break jerk ramps into constant-acceleration waypoints.
    pub interpolation: bool,

    /// Maximum waypoints per move before falling back to a single move.
    pub max_steps: usize,

    /// Maximum waypoints per jerk ramp.
    pub max_jerk_steps: usize,

    /// Minimum time between waypoints (seconds).
    pub min_time_step: f64,

    /// Minimum waypoint spacing in controller ticks.
    pub min_resolution_ticks: f64,

    /// Moves planned together in one lookahead window.
    pub lookahead: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            continuous_motion: true,
            junction_deviation: 0.05,
            interpolation: true,
            max_steps: 32,
            max_jerk_steps: 4,
            min_time_step: 0.001,
            min_resolution_ticks: 1.0,
            lookahead: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings: PlannerSettings = toml::from_str("max_steps = 50\ncontinuous_motion = false").unwrap();
        assert_eq!(settings.max_steps, 50);
        assert!(!settings.continuous_motion);
        assert_eq!(settings.max_jerk_steps, 4);
        assert!((settings.junction_deviation - 0.05).abs() < 1e-12);
    }
}
