//! Motion module for pnp-motion.
//!
//! Provides jerk-limited profile calculation, junction blending,
//! waypoint interpolation and segment execution.

mod executor;
mod interpolation;
mod junction;
mod planner;
mod profile;
mod segment;

pub use executor::{MotionExecutor, Step};
pub use interpolation::{interpolate, Interpolation, Waypoint};
pub use junction::{junction_velocity, plan_junctions, JunctionInput};
pub use planner::MotionPlanner;
pub use profile::{
    ramp_distance, reachable_velocity, MotionPhase, MotionProfile, PhaseSpan, Ramp, Sample,
    Samples,
};
pub use segment::{MotionSegment, MoveOptions, SegmentState, MIN_SPEED};
