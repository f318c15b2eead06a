//! Configuration parsing, defaults and validation.

use std::time::Duration;

use pnp_motion::axis::AxisMap;
use pnp_motion::config::{DriverKind, FlowControl, LimitPolicy, LineEnding, TransportConfig};
use pnp_motion::{parse_config, AxisRole, CommandClass, ConfigError, Error};

const DRIVER: &str = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
"#;

fn with_driver(rest: &str) -> String {
    format!("{}\n{}", DRIVER, rest)
}

fn config_error(toml: &str) -> ConfigError {
    match parse_config(toml) {
        Err(Error::Config(e)) => e,
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
}

// =============================================================================
// Parsing and defaults
// =============================================================================

#[test]
fn driver_defaults() {
    let config = parse_config(DRIVER).expect("Should parse");
    let driver = config.driver("main").expect("Driver not found");

    assert_eq!(driver.kind, DriverKind::Gcode);
    assert_eq!(driver.line_ending, LineEnding::Lf);
    assert_eq!(driver.flow_control, FlowControl::Confirmation);
    assert_eq!(driver.queue_depth, 8);
    assert_eq!(driver.max_consecutive_timeouts, 3);
    assert_eq!(driver.retries, 0);
    assert_eq!(driver.reconnect_attempts, 3);
    assert_eq!(driver.timeout_for(CommandClass::MoveTo), Duration::from_millis(5000));
    assert!(driver.keep_alive.is_none());
    assert_eq!(driver.patterns.confirm, "^ok.*");
    assert_eq!(driver.patterns.error.as_deref(), Some("^error.*"));
    assert_eq!(
        driver.transport,
        TransportConfig::Tcp {
            host: "localhost".to_string(),
            port: 9000
        }
    );
}

#[test]
fn per_class_timeouts_override_default() {
    let config = parse_config(
        r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
timeout_ms = 1000
timeouts_ms = { home = 60000 }
"#,
    )
    .expect("Should parse");
    let driver = config.driver("main").expect("Driver not found");

    assert_eq!(driver.timeout_for(CommandClass::Home), Duration::from_secs(60));
    assert_eq!(driver.timeout_for(CommandClass::MoveTo), Duration::from_secs(1));
}

#[test]
fn serial_driver_settings() {
    let config = parse_config(
        r#"
[drivers.head]
kind = "json_parameter"
line_ending = "crlf"
flow_control = "handshake"
transport = { type = "serial", port = "/dev/ttyUSB0", baud = 250000 }
"#,
    )
    .expect("Should parse");
    let driver = config.driver("head").expect("Driver not found");

    assert_eq!(driver.kind, DriverKind::JsonParameter);
    assert_eq!(driver.line_ending.as_str(), "\r\n");
    assert_eq!(driver.flow_control, FlowControl::Handshake);
    match &driver.transport {
        TransportConfig::Serial(serial) => {
            assert_eq!(serial.port, "/dev/ttyUSB0");
            assert_eq!(serial.baud, 250_000);
            assert_eq!(serial.data_bits, 8);
            assert_eq!(serial.stop_bits, 1);
        }
        other => panic!("expected serial transport, got {:?}", other),
    }
}

#[test]
fn axis_and_actuator_defaults() {
    let config = parse_config(&with_driver(
        r#"
[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 500.0
max_acceleration = 5000.0
max_jerk = 50000.0
limits = { min = 0.0, max = 400.0 }

[actuators.vacuum]
driver = "main"
actuate_boolean = "M808 {True:S1}{False:S0}"
"#,
    ))
    .expect("Should parse");

    let axis = config.axis("x").expect("Axis not found");
    assert_eq!(axis.role, Some(AxisRole::X));
    assert_eq!(axis.ticks_per_unit, 1000.0);
    assert_eq!(axis.home, 0.0);
    let limits = axis.limits.expect("Limits missing");
    assert_eq!(limits.policy, LimitPolicy::Reject);
    assert!(limits.contains(400.0));
    assert!(!limits.contains(400.5));

    let vacuum = config.actuator("vacuum").expect("Actuator not found");
    assert!(vacuum.coordinated);
    assert!(vacuum.index.is_none());
}

#[test]
fn planner_defaults() {
    let config = parse_config(DRIVER).expect("Should parse");
    assert!(config.planner.continuous_motion);
    assert!(config.planner.interpolation);
    assert_eq!(config.planner.junction_deviation, 0.05);
    assert_eq!(config.safe_z, 0.0);
}

#[test]
fn malformed_toml_is_parse_error() {
    assert!(matches!(config_error("[drivers.main"), ConfigError::Parse(_)));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn rejects_queue_depth_beyond_window() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
flow_control = "queued"
queue_depth = 65
"#;
    assert!(matches!(
        config_error(toml),
        ConfigError::InvalidQueueDepth { depth: 65, max: 64, .. }
    ));
}

#[test]
fn rejects_zero_timeout() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
timeout_ms = 0
"#;
    assert!(matches!(
        config_error(toml),
        ConfigError::InvalidTimeout { field: "timeout_ms", .. }
    ));
}

#[test]
fn rejects_unknown_timeout_class() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
timeouts_ms = { teleport = 100 }
"#;
    assert!(matches!(
        config_error(toml),
        ConfigError::InvalidTimeout { field: "timeouts_ms", .. }
    ));
}

#[test]
fn rejects_invalid_confirm_pattern() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[drivers.main.patterns]
confirm = "^ok("
"#;
    assert!(matches!(config_error(toml), ConfigError::InvalidPattern { .. }));
}

#[test]
fn rejects_confirm_pattern_for_unknown_class() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[drivers.main.patterns.confirm_by_class]
teleport = "^done"
"#;
    assert!(matches!(
        config_error(toml),
        ConfigError::UnknownCommandClass { field: "patterns.confirm_by_class", .. }
    ));
}

#[test]
fn rejects_invalid_class_confirm_pattern() {
    let toml = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[drivers.main.patterns.confirm_by_class]
home = "^homed("
"#;
    assert!(matches!(config_error(toml), ConfigError::InvalidPattern { .. }));
}

#[test]
fn rejects_inverted_soft_limits() {
    let toml = with_driver(
        r#"
[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 500.0
max_acceleration = 5000.0
max_jerk = 50000.0
limits = { min = 100.0, max = 0.0 }
"#,
    );
    assert!(matches!(config_error(&toml), ConfigError::InvalidLimits { .. }));
}

#[test]
fn rejects_missing_kinematics() {
    let toml = with_driver(
        r#"
[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 500.0
max_acceleration = 5000.0
"#,
    );
    assert!(matches!(
        config_error(&toml),
        ConfigError::InvalidKinematics { field: "max_jerk", .. }
    ));
}

#[test]
fn rejects_axis_with_driver_and_transform() {
    let toml = with_driver(
        r#"
[axes.z_motor]
driver = "main"
letter = "Z"
max_velocity = 50.0
max_acceleration = 500.0
max_jerk = 5000.0

[axes.z]
role = "z"
driver = "main"
transform = { kind = "negate", source = "z_motor" }
"#,
    );
    assert!(matches!(config_error(&toml), ConfigError::AxisBinding { .. }));
}

#[test]
fn rejects_transform_cycle() {
    let toml = r#"
[axes.a]
transform = { kind = "negate", source = "b" }

[axes.b]
transform = { kind = "negate", source = "a" }
"#;
    assert!(matches!(config_error(toml), ConfigError::TransformCycle(_)));
}

#[test]
fn rejects_zero_scale_transform() {
    let toml = with_driver(
        r#"
[axes.z_motor]
driver = "main"
letter = "Z"
max_velocity = 50.0
max_acceleration = 500.0
max_jerk = 5000.0

[axes.z]
role = "z"
transform = { kind = "map", source = "z_motor", scale = 0.0 }
"#,
    );
    assert!(matches!(config_error(&toml), ConfigError::InvalidTransform(_)));
}

#[test]
fn rejects_duplicate_role() {
    let toml = with_driver(
        r#"
[axes.x1]
role = "x"
driver = "main"
letter = "X"
max_velocity = 500.0
max_acceleration = 5000.0
max_jerk = 50000.0

[axes.x2]
role = "x"
driver = "main"
letter = "U"
max_velocity = 500.0
max_acceleration = 5000.0
max_jerk = 50000.0
"#,
    );
    assert!(matches!(
        config_error(&toml),
        ConfigError::DuplicateRole { role: AxisRole::X, .. }
    ));
}

#[test]
fn rejects_actuator_on_unknown_driver() {
    let toml = with_driver(
        r#"
[actuators.vacuum]
driver = "aux"
actuate_boolean = "M808"
"#,
    );
    assert!(matches!(config_error(&toml), ConfigError::UnknownDriver { .. }));
}

// =============================================================================
// Transform resolution
// =============================================================================

#[test]
fn transform_chain_flattens_to_controller_axis() {
    let config = parse_config(&with_driver(
        r#"
[axes.z_motor]
driver = "main"
letter = "Z"
ticks_per_unit = 100.0
max_velocity = 50.0
max_acceleration = 500.0
max_jerk = 5000.0
limits = { min = -40.0, max = 0.0 }

[axes.z_inverted]
transform = { kind = "negate", source = "z_motor" }

[axes.z]
role = "z"
transform = { kind = "map", source = "z_inverted", scale = 2.0, offset = 1.0 }
"#,
    ))
    .expect("Should parse");
    let axes = AxisMap::resolve(&config).expect("Should resolve");
    let z = axes.get(AxisRole::Z).expect("Z not bound");

    assert_eq!(z.controller_axis, "z_motor");
    assert_eq!(z.driver, "main");
    assert_eq!(z.letter, "Z");
    // logical = 2 * (-raw) + 1
    assert_eq!(z.to_logical(10.0), -19.0);
    assert_eq!(z.to_raw(-19.0), 10.0);
    assert_eq!(z.kinematics.max_velocity, 100.0);
    assert_eq!(z.ticks_per_unit, 50.0);

    let limits = z.limits.expect("Limits should map through the chain");
    assert_eq!(limits.min, 1.0);
    assert_eq!(limits.max, 81.0);
    assert!(!axes.has(AxisRole::X));
}
