//! Driver connection state.

use core::fmt;

/// Connection lifecycle of one driver.
///
/// `Disconnected -> Connecting -> Connected -> {Enabled | Fault}`. A faulted
/// driver rejects submissions until it is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Opening or reopening the link.
    Connecting,
    /// Link open, motors not enabled.
    Connected,
    /// Link open, motors enabled.
    Enabled,
    /// Escalated failure; requires an explicit reset.
    Fault,
}

impl ConnectionState {
    /// Check if a transition is valid.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected | Disconnected | Fault)
                | (Connected, Enabled | Connecting | Disconnected | Fault)
                | (Enabled, Connected | Connecting | Disconnected | Fault)
                | (Fault, Disconnected)
        )
    }

    /// Check if commands can be written.
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Enabled)
    }

    /// State name for logs.
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Enabled => "Enabled",
            ConnectionState::Fault => "Fault",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn test_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Enabled));
        assert!(Enabled.can_transition_to(Fault));
        assert!(Fault.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Enabled));
        assert!(!Fault.can_transition_to(Connected));
        assert!(!Connecting.can_transition_to(Enabled));
        assert!(Enabled.is_connected());
        assert!(!Fault.is_connected());
    }
}
