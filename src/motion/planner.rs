//! Motion planner.
//!
//! Turns target locations into planned [`MotionSegment`]s: soft limits and
//! resolution snapping, path limits, junction blending over a lookahead
//! window, jerk-limited profiles and waypoint interpolation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::axis::{AxisMap, Location};
use crate::config::PlannerSettings;
use crate::error::Result;

use super::interpolation::interpolate;
use super::junction::plan_junctions;
use super::profile::{MotionProfile, EPSILON};
use super::segment::{MotionSegment, MoveOptions, SegmentState};

/// Plans moves in logical coordinates.
#[derive(Debug, Clone)]
pub struct MotionPlanner {
    settings: PlannerSettings,
    axes: Arc<AxisMap>,
}

impl MotionPlanner {
    /// Create a planner over resolved axes.
    pub fn new(settings: PlannerSettings, axes: Arc<AxisMap>) -> Self {
        Self { settings, axes }
    }

    /// Current settings.
    #[inline]
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Replace the settings used for subsequent plans.
    pub fn set_settings(&mut self, settings: PlannerSettings) {
        self.settings = settings;
    }

    /// Resolved axes.
    #[inline]
    pub fn axes(&self) -> &AxisMap {
        &self.axes
    }

    /// Plan one stop-to-stop move.
    ///
    /// # Errors
    ///
    /// Returns a motion error if the target violates a reject-policy soft
    /// limit or is not finite.
    pub fn plan_move(
        &self,
        start: Location,
        target: Location,
        options: &MoveOptions,
    ) -> Result<MotionSegment> {
        let mut segments = self.plan_path(start, &[(target, *options)])?;
        // plan_path yields exactly one segment per target
        Ok(segments.remove(0))
    }

    /// Plan a run of moves, blending their junctions when continuous motion
    /// is enabled.
    ///
    /// Segments are planned in windows of `lookahead`; the last segment of
    /// each window ends at rest. Zero-length moves produce zero-duration
    /// segments and are skipped by the junction chain.
    ///
    /// # Errors
    ///
    /// Returns a motion error if any target violates a reject-policy soft
    /// limit; no segment is planned in that case.
    pub fn plan_path(
        &self,
        start: Location,
        moves: &[(Location, MoveOptions)],
    ) -> Result<Vec<MotionSegment>> {
        let mut segments = Vec::with_capacity(moves.len());
        let mut from = start;
        for (target, options) in moves {
            let end = self.axes.constrain(target, &from)?;
            let mut segment = MotionSegment::new(from, end, &self.axes, options);
            segment.transition(SegmentState::Planning)?;
            segments.push(segment);
            from = end;
        }

        let moving: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_zero())
            .map(|(i, _)| i)
            .collect();

        let window = self.settings.lookahead.max(1);
        for chunk in moving.chunks(window) {
            let inputs: Vec<_> = chunk
                .iter()
                .map(|&i| segments[i].junction_input(self.settings.continuous_motion))
                .collect();
            let velocities = plan_junctions(&inputs, 0.0, self.settings.junction_deviation);

            for (k, &i) in chunk.iter().enumerate() {
                let segment = &mut segments[i];
                let profile = MotionProfile::plan(
                    segment.length(),
                    velocities[k],
                    velocities[k + 1],
                    segment.limits(),
                );
                let result = interpolate(&profile, &self.settings, self.min_spacing(segment));
                if result.interpolation_failed {
                    warn!(
                        start = %segment.start(),
                        end = %segment.end(),
                        "Move degraded to a single moderated command"
                    );
                }
                segment.set_plan(profile, result.waypoints, result.interpolation_failed);
            }
        }

        for segment in segments.iter_mut() {
            segment.transition(SegmentState::Queued)?;
            debug!(
                end = %segment.end(),
                length = segment.length(),
                duration = segment.duration(),
                entry = segment.profile().entry_velocity(),
                exit = segment.profile().exit_velocity(),
                waypoints = segment.waypoints().len(),
                "Planned segment"
            );
        }

        Ok(segments)
    }

    /// Smallest path step that moves some axis by `min_resolution_ticks`.
    fn min_spacing(&self, segment: &MotionSegment) -> f64 {
        let unit = segment.unit();
        self.axes
            .iter()
            .filter_map(|axis| {
                let u = unit[axis.role.index()].abs();
                (u > EPSILON)
                    .then(|| self.settings.min_resolution_ticks / (axis.ticks_per_unit * u))
            })
            .fold(f64::INFINITY, f64::min)
            .min(segment.length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[planner]
junction_deviation = 0.05

[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 200.0
max_acceleration = 2000.0
max_jerk = 50000.0
limits = { min = 0.0, max = 300.0 }

[axes.y]
role = "y"
driver = "main"
letter = "Y"
max_velocity = 200.0
max_acceleration = 2000.0
max_jerk = 50000.0
"#;

    fn planner() -> MotionPlanner {
        let config = parse_config(CONFIG).unwrap();
        let axes = AxisMap::resolve(&config).unwrap();
        MotionPlanner::new(config.planner, Arc::new(axes))
    }

    #[test]
    fn test_single_move_stops_at_both_ends() {
        let seg = planner()
            .plan_move(
                Location::default(),
                Location::new(100.0, 0.0, 0.0, 0.0),
                &MoveOptions::default(),
            )
            .unwrap();
        assert_eq!(seg.state(), SegmentState::Queued);
        assert_eq!(seg.profile().entry_velocity(), 0.0);
        assert_eq!(seg.profile().exit_velocity(), 0.0);
        assert!(!seg.waypoints().is_empty());
        assert_eq!(seg.waypoints().last().unwrap().sample.position, 100.0);
    }

    #[test]
    fn test_collinear_path_blends() {
        let moves = [
            (Location::new(50.0, 0.0, 0.0, 0.0), MoveOptions::default()),
            (Location::new(100.0, 0.0, 0.0, 0.0), MoveOptions::default()),
        ];
        let segs = planner().plan_path(Location::default(), &moves).unwrap();
        assert!(segs[0].profile().exit_velocity() > 100.0);
        assert_eq!(segs[1].profile().entry_velocity(), segs[0].profile().exit_velocity());
        assert_eq!(segs[1].profile().exit_velocity(), 0.0);
    }

    #[test]
    fn test_uncoordinated_move_stops() {
        let moves = [
            (Location::new(50.0, 0.0, 0.0, 0.0), MoveOptions::default()),
            (Location::new(100.0, 0.0, 0.0, 0.0), MoveOptions::uncoordinated()),
        ];
        let segs = planner().plan_path(Location::default(), &moves).unwrap();
        assert_eq!(segs[0].profile().exit_velocity(), 0.0);
    }

    #[test]
    fn test_soft_limit_rejects_whole_path() {
        let moves = [
            (Location::new(50.0, 0.0, 0.0, 0.0), MoveOptions::default()),
            (Location::new(500.0, 0.0, 0.0, 0.0), MoveOptions::default()),
        ];
        assert!(planner().plan_path(Location::default(), &moves).is_err());
    }

    #[test]
    fn test_zero_distance_move() {
        let here = Location::new(10.0, 10.0, 0.0, 0.0);
        let seg = planner()
            .plan_move(here, here, &MoveOptions::default())
            .unwrap();
        assert!(seg.is_zero());
        assert_eq!(seg.duration(), 0.0);
        assert!(seg.waypoints().is_empty());
    }
}
