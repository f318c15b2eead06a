//! Driver, transport and protocol configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::command::CommandClass;

use super::units::Millis;

/// Maximum asynchronous in-flight window supported by the dispatcher.
pub const MAX_QUEUE_DEPTH: usize = 64;

/// Driver kind tag, resolved by the driver registry at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Line-oriented G-code text protocol.
    #[default]
    Gcode,
    /// Single-key JSON request/response objects (`{"xvm":5000}`).
    JsonParameter,
}

/// Physical link settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Serial port.
    Serial(SerialSettings),
    /// TCP socket.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

/// Serial port parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Serial line flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialFlowControl {
    /// No flow control.
    #[default]
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SerialSettings {
    /// Port name (`/dev/ttyUSB0`, `COM3`).
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Parity.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits (1 or 2).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Data bits (5..=8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Line flow control.
    #[serde(default)]
    pub flow_control: SerialFlowControl,

    /// Assert DTR after opening.
    #[serde(default)]
    pub dtr: bool,

    /// Assert RTS after opening.
    #[serde(default)]
    pub rts: bool,
}

fn default_baud() -> u32 {
    115_200
}

fn default_stop_bits() -> u8 {
    1
}

fn default_data_bits() -> u8 {
    8
}

/// Line terminator appended to every outgoing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r`
    Cr,
    /// `\r\n`
    Crlf,
}

impl LineEnding {
    /// Terminator bytes.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// Flow-control policy, mutually exclusive per driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// One outstanding command; the write path blocks until confirmed.
    #[default]
    Confirmation,
    /// Backpressure delegated to RTS/CTS; commands pipeline freely.
    Handshake,
    /// Commands stream up to `queue_depth`; the reader confirms FIFO.
    Queued,
}

/// Response patterns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatternConfig {
    /// Regex a line must match to confirm a command.
    #[serde(default = "default_confirm")]
    pub confirm: String,

    /// Confirmation regex overrides by command class key (`home`, `position_report`, ...).
    #[serde(default)]
    pub confirm_by_class: BTreeMap<String, String>,

    /// Regex that fails the pending command.
    #[serde(default = "default_error")]
    pub error: Option<String>,

    /// Regex with named groups, one per controller axis letter (`X`, `Y`, `Z`, `A`), parsing a position report.
    #[serde(default)]
    pub position_report: Option<String>,
}

fn default_confirm() -> String {
    "^ok.*".to_string()
}

fn default_error() -> Option<String> {
    Some("^error.*".to_string())
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            confirm: default_confirm(),
            confirm_by_class: BTreeMap::new(),
            error: default_error(),
            position_report: None,
        }
    }
}

/// Command templates by class.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandTemplates {
    /// Sent after the link opens.
    #[serde(default)]
    pub connect: Option<String>,
    /// Enables motors.
    #[serde(default)]
    pub enable: Option<String>,
    /// Disables motors.
    #[serde(default)]
    pub disable: Option<String>,
    /// Homes the machine.
    #[serde(default)]
    pub home: Option<String>,
    /// Moves to the target (`{X}`, `{Y}`, `{Z}`, `{A}` by axis letter, plus `{FeedRate}`, `{Acceleration}`, `{Jerk}`).
    #[serde(default)]
    pub move_to: Option<String>,
    /// Waits for motion to finish (`M400`).
    #[serde(default)]
    pub move_to_complete: Option<String>,
    /// Emergency stop (`M112`).
    #[serde(default)]
    pub emergency_stop: Option<String>,
    /// Keep-alive ping.
    #[serde(default)]
    pub ping: Option<String>,
    /// Requests a position report (`M114`).
    #[serde(default)]
    pub position_report: Option<String>,
}

impl CommandTemplates {
    /// Template for a class, if configured.
    pub fn get(&self, class: CommandClass) -> Option<&str> {
        let slot = match class {
            CommandClass::Connect => &self.connect,
            CommandClass::Enable => &self.enable,
            CommandClass::Disable => &self.disable,
            CommandClass::Home => &self.home,
            CommandClass::MoveTo => &self.move_to,
            CommandClass::MoveToComplete => &self.move_to_complete,
            CommandClass::EmergencyStop => &self.emergency_stop,
            CommandClass::Ping => &self.ping,
            CommandClass::PositionReport => &self.position_report,
            _ => return None,
        };
        slot.as_deref()
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriverConfig {
    /// Protocol kind.
    #[serde(default)]
    pub kind: DriverKind,

    /// Physical link.
    pub transport: TransportConfig,

    /// Outgoing line terminator.
    #[serde(default)]
    pub line_ending: LineEnding,

    /// Flow-control policy.
    #[serde(default)]
    pub flow_control: FlowControl,

    /// In-flight window for queued flow control.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Default command timeout.
    #[serde(default = "default_timeout", rename = "timeout_ms")]
    pub timeout: Millis,

    /// Per-class timeout overrides (`move_to = 30000`).
    #[serde(default, rename = "timeouts_ms")]
    pub timeouts: BTreeMap<String, Millis>,

    /// Timeout for opening the link.
    #[serde(default = "default_connect_timeout", rename = "connect_timeout_ms")]
    pub connect_timeout: Millis,

    /// Consecutive timeouts after which the driver faults.
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,

    /// Resends allowed after a timeout (confirmation flow control).
    #[serde(default)]
    pub retries: u8,

    /// Reopen attempts after an I/O failure.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Delay between reopen attempts.
    #[serde(default = "default_reconnect_backoff", rename = "reconnect_backoff_ms")]
    pub reconnect_backoff: Millis,

    /// Idle interval after which the ping command is sent.
    #[serde(default, rename = "keep_alive_ms")]
    pub keep_alive: Option<Millis>,

    /// Response patterns.
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Command templates.
    #[serde(default)]
    pub commands: CommandTemplates,
}

fn default_queue_depth() -> usize {
    8
}

fn default_timeout() -> Millis {
    Millis(5000)
}

fn default_connect_timeout() -> Millis {
    Millis(3000)
}

fn default_max_consecutive_timeouts() -> u32 {
    3
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_backoff() -> Millis {
    Millis(500)
}

impl DriverConfig {
    /// Create a driver configuration with defaults for everything but the link.
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            kind: DriverKind::default(),
            transport,
            line_ending: LineEnding::default(),
            flow_control: FlowControl::default(),
            queue_depth: default_queue_depth(),
            timeout: default_timeout(),
            timeouts: BTreeMap::new(),
            connect_timeout: default_connect_timeout(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            retries: 0,
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff: default_reconnect_backoff(),
            keep_alive: None,
            patterns: PatternConfig::default(),
            commands: CommandTemplates::default(),
        }
    }

    /// Timeout for a command class, falling back to the driver default.
    pub fn timeout_for(&self, class: CommandClass) -> Duration {
        self.timeouts
            .get(class.key())
            .copied()
            .unwrap_or(self.timeout)
            .as_duration()
    }
}
