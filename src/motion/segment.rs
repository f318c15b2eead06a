//! Motion segments and their lifecycle.

use tracing::{trace, warn};

use crate::axis::{AxisMap, AxisRole, Kinematics, Location};
use crate::error::{MotionError, Quantity, Result};

use super::interpolation::Waypoint;
use super::junction::JunctionInput;
use super::profile::{MotionProfile, EPSILON};

/// Lowest accepted speed factor.
pub const MIN_SPEED: f64 = 0.01;

/// Segment lifecycle: `Idle → Planning → Queued → Executing → {Completed | Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Created, not yet planned.
    Idle,
    /// Profile being computed.
    Planning,
    /// Planned and waiting for execution.
    Queued,
    /// Commands being issued.
    Executing,
    /// All commands confirmed or submitted.
    Completed,
    /// Aborted before completion.
    Aborted,
}

impl SegmentState {
    /// Check if a transition is allowed.
    pub fn can_transition_to(self, next: SegmentState) -> bool {
        use SegmentState::*;
        matches!(
            (self, next),
            (Idle, Planning)
                | (Planning, Queued)
                | (Queued, Executing)
                | (Executing, Completed)
                | (Idle | Planning | Queued | Executing, Aborted)
        )
    }

    /// Check if the segment is finished.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SegmentState::Completed | SegmentState::Aborted)
    }
}

/// Per-move options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOptions {
    /// Fraction of the machine's capability, in `(0, 1]`.
    pub speed: f64,
    /// Coordinated moves may blend; uncoordinated ones stop before and after.
    pub coordinated: bool,
    /// Path velocity override (units/s).
    pub max_velocity: Option<f64>,
    /// Path acceleration override (units/s²).
    pub max_acceleration: Option<f64>,
    /// Path jerk override (units/s³).
    pub max_jerk: Option<f64>,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            coordinated: true,
            max_velocity: None,
            max_acceleration: None,
            max_jerk: None,
        }
    }
}

impl MoveOptions {
    /// Options at a speed factor.
    pub fn at_speed(speed: f64) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }

    /// Options for a move that must stop before and after.
    pub fn uncoordinated() -> Self {
        Self {
            coordinated: false,
            ..Self::default()
        }
    }
}

/// One straight move between two logical locations.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSegment {
    start: Location,
    end: Location,
    /// Per-role displacement per unit of path length
    unit: [f64; 4],
    length: f64,
    limits: Kinematics,
    coordinated: bool,
    profile: MotionProfile,
    waypoints: Vec<Waypoint>,
    interpolation_failed: bool,
    warnings: Vec<MotionError>,
    state: SegmentState,
}

impl MotionSegment {
    /// Build an unplanned segment and derive its path limits.
    ///
    /// Path length is the XYZ distance, or the rotation travel for
    /// rotation-only moves. Requested kinematics beyond the axes'
    /// capability are clamped and recorded as warnings.
    pub fn new(start: Location, end: Location, axes: &AxisMap, options: &MoveOptions) -> Self {
        let delta = start.delta_to(&end);
        let linear = start.linear_distance(&end);
        let length = if linear > EPSILON {
            linear
        } else {
            delta[AxisRole::Rotation.index()].abs()
        };

        let unit = if length > EPSILON {
            delta.map(|d| d / length)
        } else {
            [0.0; 4]
        };

        let mut warnings = Vec::new();
        let limits = path_limits(&unit, axes, options, &mut warnings);

        Self {
            start,
            end,
            unit,
            length: if length > EPSILON { length } else { 0.0 },
            limits,
            coordinated: options.coordinated,
            profile: MotionProfile::zero(),
            waypoints: Vec::new(),
            interpolation_failed: false,
            warnings,
            state: SegmentState::Idle,
        }
    }

    /// Move to a new lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidTransition`] if the transition is not allowed.
    pub fn transition(&mut self, to: SegmentState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(MotionError::InvalidTransition {
                from: self.state,
                to,
            }
            .into());
        }
        trace!(from = ?self.state, to = ?to, "Segment transition");
        self.state = to;
        Ok(())
    }

    /// Attach the planned profile and waypoints.
    pub(crate) fn set_plan(
        &mut self,
        profile: MotionProfile,
        waypoints: Vec<Waypoint>,
        interpolation_failed: bool,
    ) {
        self.profile = profile;
        self.waypoints = waypoints;
        self.interpolation_failed = interpolation_failed;
    }

    /// Lookahead view of this segment.
    pub(crate) fn junction_input(&self, continuous: bool) -> JunctionInput {
        JunctionInput {
            direction: [self.unit[0], self.unit[1], self.unit[2]],
            length: self.length,
            limits: self.limits,
            blendable: continuous && self.coordinated,
        }
    }

    /// Location at a distance along the path.
    pub fn location_at(&self, distance: f64) -> Location {
        if distance >= self.length {
            return self.end;
        }
        let s = self.start.to_array();
        Location::from_array([
            s[0] + self.unit[0] * distance,
            s[1] + self.unit[1] * distance,
            s[2] + self.unit[2] * distance,
            s[3] + self.unit[3] * distance,
        ])
    }

    /// Start location.
    #[inline]
    pub fn start(&self) -> Location {
        self.start
    }

    /// End location.
    #[inline]
    pub fn end(&self) -> Location {
        self.end
    }

    /// Path length.
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Per-role displacement per unit of path length.
    #[inline]
    pub fn unit(&self) -> [f64; 4] {
        self.unit
    }

    /// Check if the segment moves at all.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.length <= EPSILON
    }

    /// Path limits after clamping.
    #[inline]
    pub fn limits(&self) -> &Kinematics {
        &self.limits
    }

    /// Check if the segment may blend with neighbours.
    #[inline]
    pub fn is_coordinated(&self) -> bool {
        self.coordinated
    }

    /// Planned profile.
    #[inline]
    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }

    /// Planned duration.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.profile.duration()
    }

    /// Planned controller moves.
    #[inline]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Set when interpolation fell back to a single move.
    #[inline]
    pub fn interpolation_failed(&self) -> bool {
        self.interpolation_failed
    }

    /// Clamped requests.
    #[inline]
    pub fn warnings(&self) -> &[MotionError] {
        &self.warnings
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SegmentState {
        self.state
    }
}

/// Path limits from every moving axis: `min_i(limit_i / |unit_i|)`.
fn path_limits(
    unit: &[f64; 4],
    axes: &AxisMap,
    options: &MoveOptions,
    warnings: &mut Vec<MotionError>,
) -> Kinematics {
    let mut limits = Kinematics {
        max_velocity: f64::INFINITY,
        max_acceleration: f64::INFINITY,
        max_jerk: f64::INFINITY,
    };

    for axis in axes.iter() {
        let u = unit[axis.role.index()].abs();
        if u <= EPSILON {
            continue;
        }
        let k = &axis.kinematics;
        limits.max_velocity = limits.max_velocity.min(k.max_velocity / u);
        limits.max_acceleration = limits.max_acceleration.min(k.max_acceleration / u);
        limits.max_jerk = limits.max_jerk.min(k.max_jerk / u);
    }

    if !limits.max_velocity.is_finite() {
        // Nothing bound moves
        return Kinematics {
            max_velocity: 0.0,
            max_acceleration: 0.0,
            max_jerk: 0.0,
        };
    }

    let speed = clamp_request(
        Quantity::SpeedFactor,
        if options.speed.is_finite() { options.speed } else { 1.0 },
        1.0,
        warnings,
    )
    .max(MIN_SPEED);

    limits.max_velocity *= speed;
    limits.max_acceleration *= speed * speed;
    limits.max_jerk *= speed * speed * speed;

    if let Some(v) = options.max_velocity {
        limits.max_velocity = clamp_request(Quantity::Velocity, v, limits.max_velocity, warnings);
    }
    if let Some(a) = options.max_acceleration {
        limits.max_acceleration =
            clamp_request(Quantity::Acceleration, a, limits.max_acceleration, warnings);
    }
    if let Some(j) = options.max_jerk {
        limits.max_jerk = clamp_request(Quantity::Jerk, j, limits.max_jerk, warnings);
    }

    limits
}

fn clamp_request(
    quantity: Quantity,
    requested: f64,
    max: f64,
    warnings: &mut Vec<MotionError>,
) -> f64 {
    if requested > max {
        warn!(%quantity, requested, max, "Requested kinematics exceed capability, clamped");
        warnings.push(MotionError::ExceedsCapability {
            quantity,
            requested,
            max,
        });
        max
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn axes() -> AxisMap {
        let config = parse_config(
            r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 300.0
max_acceleration = 3000.0
max_jerk = 60000.0

[axes.y]
role = "y"
driver = "main"
letter = "Y"
max_velocity = 100.0
max_acceleration = 1000.0
max_jerk = 20000.0

[axes.c]
role = "rotation"
driver = "main"
letter = "A"
max_velocity = 1000.0
max_acceleration = 10000.0
max_jerk = 100000.0
"#,
        )
        .unwrap();
        AxisMap::resolve(&config).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut seg = MotionSegment::new(
            Location::default(),
            Location::new(10.0, 0.0, 0.0, 0.0),
            &axes(),
            &MoveOptions::default(),
        );
        assert_eq!(seg.state(), SegmentState::Idle);
        assert!(seg.transition(SegmentState::Executing).is_err());
        seg.transition(SegmentState::Planning).unwrap();
        seg.transition(SegmentState::Queued).unwrap();
        seg.transition(SegmentState::Aborted).unwrap();
        assert!(seg.state().is_terminal());
        assert!(seg.transition(SegmentState::Executing).is_err());
    }

    #[test]
    fn test_diagonal_limits_from_slowest_axis() {
        let seg = MotionSegment::new(
            Location::default(),
            Location::new(10.0, 10.0, 0.0, 0.0),
            &axes(),
            &MoveOptions::default(),
        );
        // Y: 100 / sin(45°)
        let expected = 100.0 / std::f64::consts::FRAC_1_SQRT_2;
        assert!((seg.limits().max_velocity - expected).abs() < 1e-9);
        assert!((seg.length() - 200f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_only_move() {
        let seg = MotionSegment::new(
            Location::default(),
            Location::new(0.0, 0.0, 0.0, -90.0),
            &axes(),
            &MoveOptions::default(),
        );
        assert_eq!(seg.length(), 90.0);
        assert_eq!(seg.limits().max_velocity, 1000.0);
        assert_eq!(seg.location_at(45.0).rotation, -45.0);
    }

    #[test]
    fn test_excessive_requests_clamped_with_warnings() {
        let options = MoveOptions {
            speed: 1.5,
            max_velocity: Some(1000.0),
            ..MoveOptions::default()
        };
        let seg = MotionSegment::new(
            Location::default(),
            Location::new(10.0, 0.0, 0.0, 0.0),
            &axes(),
            &options,
        );
        assert_eq!(seg.limits().max_velocity, 300.0);
        assert_eq!(seg.warnings().len(), 2);
        assert!(matches!(
            seg.warnings()[0],
            MotionError::ExceedsCapability { quantity: Quantity::SpeedFactor, .. }
        ));
    }

    #[test]
    fn test_speed_factor_scales_limits() {
        let seg = MotionSegment::new(
            Location::default(),
            Location::new(10.0, 0.0, 0.0, 0.0),
            &axes(),
            &MoveOptions::at_speed(0.5),
        );
        assert_eq!(seg.limits().max_velocity, 150.0);
        assert_eq!(seg.limits().max_acceleration, 750.0);
        assert!(seg.warnings().is_empty());
    }

    #[test]
    fn test_zero_move() {
        let seg = MotionSegment::new(
            Location::new(1.0, 2.0, 3.0, 4.0),
            Location::new(1.0, 2.0, 3.0, 4.0),
            &axes(),
            &MoveOptions::default(),
        );
        assert!(seg.is_zero());
    }
}
