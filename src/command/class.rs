//! Command classes.

use core::fmt;

/// What a command does; selects its template and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandClass {
    /// Sent once after the link opens.
    Connect,
    /// Enables motors.
    Enable,
    /// Disables motors.
    Disable,
    /// Homes the machine.
    Home,
    /// Moves to a target.
    MoveTo,
    /// Waits until all motion has finished.
    MoveToComplete,
    /// Emergency stop.
    EmergencyStop,
    /// Keep-alive ping.
    Ping,
    /// Requests a position report.
    PositionReport,
    /// Boolean actuator write.
    ActuateBoolean,
    /// Numeric actuator write.
    ActuateDouble,
    /// Actuator read.
    ActuatorRead,
    /// Caller-supplied command text.
    Raw,
}

impl CommandClass {
    /// Classes configured in a driver's `commands` table.
    pub const DRIVER_CLASSES: [CommandClass; 9] = [
        CommandClass::Connect,
        CommandClass::Enable,
        CommandClass::Disable,
        CommandClass::Home,
        CommandClass::MoveTo,
        CommandClass::MoveToComplete,
        CommandClass::EmergencyStop,
        CommandClass::Ping,
        CommandClass::PositionReport,
    ];

    const ALL: [CommandClass; 13] = [
        CommandClass::Connect,
        CommandClass::Enable,
        CommandClass::Disable,
        CommandClass::Home,
        CommandClass::MoveTo,
        CommandClass::MoveToComplete,
        CommandClass::EmergencyStop,
        CommandClass::Ping,
        CommandClass::PositionReport,
        CommandClass::ActuateBoolean,
        CommandClass::ActuateDouble,
        CommandClass::ActuatorRead,
        CommandClass::Raw,
    ];

    /// Configuration key (`move_to`, `actuator_read`, ...).
    pub const fn key(self) -> &'static str {
        match self {
            CommandClass::Connect => "connect",
            CommandClass::Enable => "enable",
            CommandClass::Disable => "disable",
            CommandClass::Home => "home",
            CommandClass::MoveTo => "move_to",
            CommandClass::MoveToComplete => "move_to_complete",
            CommandClass::EmergencyStop => "emergency_stop",
            CommandClass::Ping => "ping",
            CommandClass::PositionReport => "position_report",
            CommandClass::ActuateBoolean => "actuate_boolean",
            CommandClass::ActuateDouble => "actuate_double",
            CommandClass::ActuatorRead => "actuator_read",
            CommandClass::Raw => "raw",
        }
    }

    /// Parse a configuration key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for class in CommandClass::ALL {
            assert_eq!(CommandClass::from_key(class.key()), Some(class));
        }
        assert_eq!(CommandClass::from_key("teleport"), None);
    }
}
