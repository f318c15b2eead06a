//! Segment execution - waypoint sequencing.

use crate::axis::Location;
use crate::error::Result;

use super::interpolation::Waypoint;
use super::segment::{MotionSegment, SegmentState};

/// A waypoint resolved to its logical target location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Index of the waypoint within the segment.
    pub index: usize,
    /// Logical target of the controller move.
    pub target: Location,
    /// Waypoint kinematics.
    pub waypoint: Waypoint,
}

/// Runtime state while a segment's waypoints are issued.
#[derive(Debug, Clone)]
pub struct MotionExecutor {
    /// The planned segment being executed.
    segment: MotionSegment,

    /// Next waypoint to issue.
    current: usize,
}

impl MotionExecutor {
    /// Start executing a queued segment.
    ///
    /// # Errors
    ///
    /// Returns an invalid-transition error if the segment is not queued.
    pub fn new(mut segment: MotionSegment) -> Result<Self> {
        segment.transition(SegmentState::Executing)?;
        Ok(Self {
            segment,
            current: 0,
        })
    }

    /// Check if every waypoint has been issued.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.segment.waypoints().len()
    }

    /// Get the number of waypoints issued so far.
    #[inline]
    pub fn current_step(&self) -> usize {
        self.current
    }

    /// Get the total number of waypoints.
    #[inline]
    pub fn total_steps(&self) -> usize {
        self.segment.waypoints().len()
    }

    /// Get waypoints remaining.
    #[inline]
    pub fn steps_remaining(&self) -> usize {
        self.total_steps().saturating_sub(self.current)
    }

    /// Get the segment.
    #[inline]
    pub fn segment(&self) -> &MotionSegment {
        &self.segment
    }

    /// Advance to the next waypoint.
    ///
    /// Returns `None` once every waypoint has been issued.
    pub fn advance(&mut self) -> Option<Step> {
        let waypoint = *self.segment.waypoints().get(self.current)?;
        let index = self.current;
        self.current += 1;

        let target = if index + 1 == self.total_steps() {
            self.segment.end()
        } else {
            self.segment.location_at(waypoint.sample.position)
        };

        Some(Step {
            index,
            target,
            waypoint,
        })
    }

    /// Mark the segment completed and hand it back.
    ///
    /// # Errors
    ///
    /// Returns an invalid-transition error if the segment already ended.
    pub fn complete(mut self) -> Result<MotionSegment> {
        self.segment.transition(SegmentState::Completed)?;
        Ok(self.segment)
    }

    /// Mark the segment aborted and hand it back.
    pub fn abort(mut self) -> MotionSegment {
        // Executing -> Aborted is always allowed
        let _ = self.segment.transition(SegmentState::Aborted);
        self.segment
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn progress(&self) -> f64 {
        if self.total_steps() == 0 {
            1.0
        } else {
            self.current as f64 / self.total_steps() as f64
        }
    }
}
