//! Waypoint interpolation.
//!
//! Controllers that only execute constant-acceleration moves approximate a
//! jerk-limited profile by a sequence of short moves. Jerk ramps are split
//! into a bounded number of pieces; constant phases become a single move.

use tracing::warn;

use crate::config::PlannerSettings;

use super::profile::{MotionProfile, Sample, EPSILON};

/// One controller move ending at `sample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Profile state at the end of the move.
    pub sample: Sample,
    /// Feedrate cap for the move (units/s).
    pub velocity: f64,
    /// Acceleration for the move (units/s²).
    pub acceleration: f64,
    /// Jerk for the move (units/s³), zero when not jerk-limited.
    pub jerk: f64,
}

/// Result of interpolating one profile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interpolation {
    /// Waypoints in path order; empty for a zero-length profile.
    pub waypoints: Vec<Waypoint>,
    /// Set when the step budget was exceeded and a single moderated move
    /// replaced the interpolated ones.
    pub interpolation_failed: bool,
}

/// Interpolate a profile into controller moves.
///
/// `min_spacing` is the smallest path distance between waypoints that
/// still moves some axis by `min_resolution_ticks`.
pub fn interpolate(
    profile: &MotionProfile,
    settings: &PlannerSettings,
    min_spacing: f64,
) -> Interpolation {
    if profile.is_zero() {
        return Interpolation::default();
    }

    if !settings.interpolation {
        return Interpolation {
            waypoints: vec![single_move(profile)],
            interpolation_failed: false,
        };
    }

    let mut waypoints: Vec<Waypoint> = Vec::new();
    for span in profile.phases() {
        let pieces = if span.phase.is_jerk_ramp() {
            // No piece shorter than the minimum time step.
            let wanted = (span.duration / settings.min_time_step).floor().max(1.0) as usize;
            wanted.clamp(1, settings.max_jerk_steps)
        } else {
            1
        };

        let mut prev = span.start;
        for k in 1..=pieces {
            let end = span.at(span.duration * k as f64 / pieces as f64);
            waypoints.push(piece(&prev, &end));
            prev = end;
        }
    }

    merge_close(&mut waypoints, min_spacing);

    if let Some(last) = waypoints.last_mut() {
        // Land exactly on the profile end.
        last.sample = profile.sample(profile.duration());
    }

    if waypoints.len() > settings.max_steps {
        warn!(
            required = waypoints.len(),
            max_steps = settings.max_steps,
            distance = profile.distance(),
            "Interpolation step budget exceeded, falling back to a single move"
        );
        return Interpolation {
            waypoints: vec![moderated_move(profile)],
            interpolation_failed: true,
        };
    }

    Interpolation {
        waypoints,
        interpolation_failed: false,
    }
}

/// Constant-acceleration move between two profile states.
fn piece(from: &Sample, to: &Sample) -> Waypoint {
    let dt = to.time - from.time;
    let acceleration = if dt > EPSILON {
        ((to.velocity - from.velocity) / dt).abs()
    } else {
        0.0
    };
    Waypoint {
        sample: *to,
        velocity: from.velocity.max(to.velocity),
        acceleration,
        jerk: 0.0,
    }
}

/// Drop waypoints closer than `min_spacing` to the previous kept one.
///
/// The final waypoint always survives; it replaces its predecessor when
/// the two are too close.
fn merge_close(waypoints: &mut Vec<Waypoint>, min_spacing: f64) {
    if waypoints.len() < 2 || min_spacing <= 0.0 {
        return;
    }

    let mut kept: Vec<Waypoint> = Vec::with_capacity(waypoints.len());
    let mut last_position = 0.0;
    let count = waypoints.len();

    for (i, wp) in waypoints.drain(..).enumerate() {
        let is_last = i + 1 == count;
        if wp.sample.position - last_position >= min_spacing {
            last_position = wp.sample.position;
            kept.push(wp);
        } else if is_last {
            let merged = match kept.pop() {
                Some(prev) => Waypoint {
                    velocity: prev.velocity.max(wp.velocity),
                    acceleration: prev.acceleration.max(wp.acceleration),
                    ..wp
                },
                None => wp,
            };
            kept.push(merged);
        }
    }

    *waypoints = kept;
}

/// Single move carrying the profile's peak kinematics.
fn single_move(profile: &MotionProfile) -> Waypoint {
    let limits = profile.limits();
    Waypoint {
        sample: profile.sample(profile.duration()),
        velocity: profile.cruise_velocity(),
        acceleration: limits.max_acceleration,
        jerk: limits.max_jerk,
    }
}

/// Single move whose constant acceleration reaches cruise in the time the
/// jerk-limited ramp would have taken, so it never exceeds the ramp's
/// average acceleration.
fn moderated_move(profile: &MotionProfile) -> Waypoint {
    let ramp_time = profile.acceleration_time().max(profile.deceleration_time());
    let rise = profile.cruise_velocity()
        - profile.entry_velocity().min(profile.exit_velocity());
    let acceleration = if ramp_time > EPSILON {
        (rise / ramp_time).min(profile.limits().max_acceleration)
    } else {
        profile.limits().max_acceleration
    };
    Waypoint {
        sample: profile.sample(profile.duration()),
        velocity: profile.cruise_velocity(),
        acceleration,
        jerk: 0.0,
    }
}
