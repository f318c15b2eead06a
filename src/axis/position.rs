//! Position tracking for the machine head.
//!
//! Holds the current logical location and whether it is known (homed or
//! read back from the controller). A fresh tracker assumes the origin; once
//! an abort invalidates it the location is lost and motion must not be
//! planned from it until it is established again. Only the machine
//! executor mutates it.

use super::location::{AxisRole, Location};

/// Machine position tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    /// Current location in logical coordinates
    location: Location,
    /// Set once the machine has been homed or read back
    known: bool,
    /// Set when an abort left the head somewhere unknown
    lost: bool,
}

impl Position {
    /// Create a tracker with an unknown position at the origin.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker at a known location.
    #[inline]
    pub fn at(location: Location) -> Self {
        Self {
            location,
            known: true,
            lost: false,
        }
    }

    /// Get the current location.
    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    /// Get one coordinate.
    #[inline]
    pub fn get(&self, role: AxisRole) -> f64 {
        self.location.get(role)
    }

    /// Check if the position has been established.
    #[inline]
    pub fn is_known(&self) -> bool {
        self.known
    }

    /// Check if an abort invalidated the position since it was last
    /// established.
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Commit a location after its move has been submitted.
    #[inline]
    pub fn commit(&mut self, location: Location) {
        self.location = location;
    }

    /// Establish the position (homing, position report).
    #[inline]
    pub fn establish(&mut self, location: Location) {
        self.location = location;
        self.known = true;
        self.lost = false;
    }

    /// Forget the position after an abort or fault.
    #[inline]
    pub fn invalidate(&mut self) {
        self.known = false;
        self.lost = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_lifecycle() {
        let mut pos = Position::new();
        assert!(!pos.is_known());

        pos.establish(Location::new(0.0, 0.0, 5.0, 0.0));
        assert!(pos.is_known());
        assert_eq!(pos.get(AxisRole::Z), 5.0);

        pos.commit(Location::new(10.0, 20.0, 5.0, 90.0));
        assert_eq!(pos.location().rotation, 90.0);

        pos.invalidate();
        assert!(!pos.is_known());
        assert!(pos.is_lost());
        assert_eq!(pos.get(AxisRole::X), 10.0);

        pos.establish(Location::default());
        assert!(pos.is_known());
        assert!(!pos.is_lost());
    }
}
