//! Motion profile calculation.
//!
//! A profile covers a straight path of length `L` from an entry velocity to
//! an exit velocity in seven phases: acceleration rise, constant
//! acceleration, acceleration fall, cruise, and the mirrored deceleration.
//! Jerk is stepped, so every phase runs at `+j`, `-j` or zero jerk.

use crate::axis::Kinematics;

/// Distances and velocities below this are treated as zero.
pub(crate) const EPSILON: f64 = 1e-9;

const BISECTION_ITERATIONS: usize = 64;

/// Current phase of motion execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    /// Acceleration ramps up at `+j`.
    AccelerationRise,
    /// Constant acceleration.
    ConstantAcceleration,
    /// Acceleration ramps down at `-j`.
    AccelerationFall,
    /// Constant cruise velocity.
    Cruise,
    /// Deceleration ramps up at `-j`.
    DecelerationRise,
    /// Constant deceleration.
    ConstantDeceleration,
    /// Deceleration ramps down at `+j`.
    DecelerationFall,
    /// Motion complete.
    Complete,
}

impl MotionPhase {
    /// Check if jerk is non-zero during this phase.
    #[inline]
    pub fn is_jerk_ramp(self) -> bool {
        matches!(
            self,
            MotionPhase::AccelerationRise
                | MotionPhase::AccelerationFall
                | MotionPhase::DecelerationRise
                | MotionPhase::DecelerationFall
        )
    }
}

/// Time split of a single velocity change under acceleration and jerk caps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ramp {
    /// Duration of each of the two jerk phases.
    pub jerk_time: f64,
    /// Duration of the constant-acceleration phase.
    pub constant_time: f64,
    /// Highest acceleration magnitude reached.
    pub peak_acceleration: f64,
}

impl Ramp {
    /// Ramp between two velocities.
    ///
    /// The acceleration cap is reached only when `|Δv|·j ≥ a²`; otherwise
    /// the ramp is two jerk phases peaking at `sqrt(|Δv|·j)`.
    pub fn between(from: f64, to: f64, limits: &Kinematics) -> Self {
        let dv = (to - from).abs();
        if dv <= EPSILON {
            return Self::default();
        }

        let a = limits.max_acceleration;
        let j = limits.max_jerk;

        if dv * j >= a * a {
            let tj = a / j;
            Self {
                jerk_time: tj,
                constant_time: dv / a - tj,
                peak_acceleration: a,
            }
        } else {
            let tj = (dv / j).sqrt();
            Self {
                jerk_time: tj,
                constant_time: 0.0,
                peak_acceleration: j * tj,
            }
        }
    }

    /// Total ramp duration.
    #[inline]
    pub fn duration(&self) -> f64 {
        2.0 * self.jerk_time + self.constant_time
    }
}

/// Distance covered while changing velocity between `from` and `to`.
///
/// The acceleration curve is symmetric, so the mean velocity is the average
/// of the endpoints.
pub fn ramp_distance(from: f64, to: f64, limits: &Kinematics) -> f64 {
    0.5 * (from + to) * Ramp::between(from, to, limits).duration()
}

/// Highest velocity up to `cap` reachable from `from` within `distance`.
pub fn reachable_velocity(from: f64, distance: f64, cap: f64, limits: &Kinematics) -> f64 {
    if cap <= from {
        return cap;
    }
    if ramp_distance(from, cap, limits) <= distance {
        return cap;
    }

    let (mut lo, mut hi) = (from, cap);
    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if ramp_distance(from, mid, limits) <= distance {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Kinematic state along the path at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Time since the start of the profile (s).
    pub time: f64,
    /// Distance along the path (units).
    pub position: f64,
    /// Path velocity (units/s).
    pub velocity: f64,
    /// Path acceleration (units/s²).
    pub acceleration: f64,
    /// Path jerk (units/s³).
    pub jerk: f64,
}

/// One phase of a profile with its starting state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpan {
    /// Phase kind.
    pub phase: MotionPhase,
    /// State at the start of the phase.
    pub start: Sample,
    /// Phase duration (s).
    pub duration: f64,
}

impl PhaseSpan {
    /// Evaluate the phase `dt` seconds after its start.
    pub fn at(&self, dt: f64) -> Sample {
        let s = &self.start;
        let j = s.jerk;
        Sample {
            time: s.time + dt,
            position: s.position
                + s.velocity * dt
                + 0.5 * s.acceleration * dt * dt
                + j * dt * dt * dt / 6.0,
            velocity: s.velocity + s.acceleration * dt + 0.5 * j * dt * dt,
            acceleration: s.acceleration + j * dt,
            jerk: j,
        }
    }

    /// Time at which the phase ends.
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start.time + self.duration
    }
}

/// Computed jerk-limited profile for one straight segment.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    distance: f64,
    entry_velocity: f64,
    cruise_velocity: f64,
    exit_velocity: f64,
    limits: Kinematics,
    phases: Vec<PhaseSpan>,
    duration: f64,
}

impl MotionProfile {
    /// Plan a profile over `distance` between the given boundary velocities.
    ///
    /// Boundary velocities are capped at the velocity limit. If the exit
    /// velocity cannot be reached within the distance, the higher of the two
    /// boundary velocities is lowered to what is reachable.
    pub fn plan(distance: f64, entry: f64, exit: f64, limits: &Kinematics) -> Self {
        let usable = limits.max_velocity > 0.0
            && limits.max_acceleration > 0.0
            && limits.max_jerk > 0.0;
        if distance <= EPSILON || !usable {
            return Self::zero();
        }

        let vmax = limits.max_velocity;
        let mut v0 = entry.clamp(0.0, vmax);
        let mut v1 = exit.clamp(0.0, vmax);

        if ramp_distance(v0, v1, limits) > distance {
            if v0 > v1 {
                v0 = reachable_velocity(v1, distance, v0, limits);
            } else {
                v1 = reachable_velocity(v0, distance, v1, limits);
            }
        }

        let total = |vc: f64| ramp_distance(v0, vc, limits) + ramp_distance(vc, v1, limits);

        let cruise_velocity = if total(vmax) <= distance {
            vmax
        } else {
            let (mut lo, mut hi) = (v0.max(v1), vmax);
            for _ in 0..BISECTION_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                if total(mid) <= distance {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            lo
        };

        let accel = Ramp::between(v0, cruise_velocity, limits);
        let decel = Ramp::between(cruise_velocity, v1, limits);
        let cruise_distance = (distance - total(cruise_velocity)).max(0.0);
        let cruise_time = if cruise_velocity > EPSILON {
            cruise_distance / cruise_velocity
        } else {
            0.0
        };

        let j = limits.max_jerk;
        let plan = [
            (MotionPhase::AccelerationRise, accel.jerk_time, j),
            (MotionPhase::ConstantAcceleration, accel.constant_time, 0.0),
            (MotionPhase::AccelerationFall, accel.jerk_time, -j),
            (MotionPhase::Cruise, cruise_time, 0.0),
            (MotionPhase::DecelerationRise, decel.jerk_time, -j),
            (MotionPhase::ConstantDeceleration, decel.constant_time, 0.0),
            (MotionPhase::DecelerationFall, decel.jerk_time, j),
        ];

        let mut phases = Vec::with_capacity(plan.len());
        let mut state = Sample {
            velocity: v0,
            ..Sample::default()
        };
        for (phase, duration, jerk) in plan {
            if duration <= 0.0 {
                continue;
            }
            let span = PhaseSpan {
                phase,
                start: Sample { jerk, ..state },
                duration,
            };
            state = span.at(duration);
            phases.push(span);
        }

        Self {
            distance,
            entry_velocity: v0,
            cruise_velocity,
            exit_velocity: v1,
            limits: *limits,
            duration: state.time,
            phases,
        }
    }

    /// Create a zero-length profile (no motion).
    pub fn zero() -> Self {
        Self {
            distance: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            limits: Kinematics {
                max_velocity: 0.0,
                max_acceleration: 0.0,
                max_jerk: 0.0,
            },
            phases: Vec::new(),
            duration: 0.0,
        }
    }

    /// Check if this is a zero-length profile.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.phases.is_empty()
    }

    /// Path length (units).
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Total duration (s).
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Velocity at the start of the profile.
    #[inline]
    pub fn entry_velocity(&self) -> f64 {
        self.entry_velocity
    }

    /// Peak velocity of the profile.
    #[inline]
    pub fn cruise_velocity(&self) -> f64 {
        self.cruise_velocity
    }

    /// Velocity at the end of the profile.
    #[inline]
    pub fn exit_velocity(&self) -> f64 {
        self.exit_velocity
    }

    /// Path limits the profile was planned with.
    #[inline]
    pub fn limits(&self) -> &Kinematics {
        &self.limits
    }

    /// Non-empty phases in time order.
    #[inline]
    pub fn phases(&self) -> &[PhaseSpan] {
        &self.phases
    }

    /// Duration of the ramp from entry to cruise velocity.
    pub fn acceleration_time(&self) -> f64 {
        self.phase_time(&[
            MotionPhase::AccelerationRise,
            MotionPhase::ConstantAcceleration,
            MotionPhase::AccelerationFall,
        ])
    }

    /// Duration of the ramp from cruise to exit velocity.
    pub fn deceleration_time(&self) -> f64 {
        self.phase_time(&[
            MotionPhase::DecelerationRise,
            MotionPhase::ConstantDeceleration,
            MotionPhase::DecelerationFall,
        ])
    }

    fn phase_time(&self, kinds: &[MotionPhase]) -> f64 {
        self.phases
            .iter()
            .filter(|p| kinds.contains(&p.phase))
            .map(|p| p.duration)
            .sum()
    }

    /// Get the phase at a given time.
    pub fn phase_at(&self, time: f64) -> MotionPhase {
        if time >= self.duration {
            return MotionPhase::Complete;
        }
        self.span_at(time)
            .map(|s| s.phase)
            .unwrap_or(MotionPhase::Complete)
    }

    fn span_at(&self, time: f64) -> Option<&PhaseSpan> {
        self.phases
            .iter()
            .find(|p| time < p.end_time())
            .or_else(|| self.phases.last())
    }

    /// Evaluate the profile at a time, clamped to `[0, duration]`.
    pub fn sample(&self, time: f64) -> Sample {
        if time >= self.duration {
            return self.end_sample();
        }
        let time = time.max(0.0);
        match self.span_at(time) {
            Some(span) => span.at(time - span.start.time),
            None => self.end_sample(),
        }
    }

    fn end_sample(&self) -> Sample {
        Sample {
            time: self.duration,
            position: self.distance,
            velocity: self.exit_velocity,
            acceleration: 0.0,
            jerk: 0.0,
        }
    }

    /// Lazily sample the profile every `step` seconds, ending exactly at the end.
    pub fn samples(&self, step: f64) -> Samples<'_> {
        Samples {
            profile: self,
            step: step.max(EPSILON),
            index: 0,
            done: false,
        }
    }
}

/// Iterator over time-stamped profile samples.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    profile: &'a MotionProfile,
    step: f64,
    index: u64,
    done: bool,
}

impl Iterator for Samples<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.done {
            return None;
        }
        let t = self.index as f64 * self.step;
        self.index += 1;
        if t >= self.profile.duration() {
            self.done = true;
            return Some(self.profile.end_sample());
        }
        Some(self.profile.sample(t))
    }
}
