//! Configuration validation.

use std::collections::BTreeMap;

use regex::Regex;

use crate::axis::AxisRole;
use crate::command::{CommandClass, Template};
use crate::error::{ConfigError, Result};

use super::driver::{TransportConfig, MAX_QUEUE_DEPTH};
use super::{ActuatorConfig, AxisConfig, DriverConfig, MachineConfig, PlannerSettings};

/// Validate a machine configuration.
///
/// Checks:
/// - Planner interpolation and junction parameters are in range
/// - Driver link settings, timeouts, patterns and templates are usable
/// - Axes are bound to an existing driver or a resolvable transform chain
/// - Kinematic limits, resolutions and soft limits are valid
/// - Each role is claimed by at most one axis
/// - Actuators reference existing drivers
pub fn validate_config(config: &MachineConfig) -> Result<()> {
    validate_planner(&config.planner)?;

    for (name, driver) in config.drivers.iter() {
        validate_driver(name, driver)?;
    }

    let mut roles: BTreeMap<AxisRole, &str> = BTreeMap::new();
    for (name, axis) in config.axes.iter() {
        validate_axis(name, axis, config)?;

        if let Some(role) = axis.role {
            if let Some(first) = roles.insert(role, name.as_str()) {
                return Err(ConfigError::DuplicateRole {
                    role,
                    first: first.to_string(),
                    second: name.clone(),
                }
                .into());
            }
        }
    }

    for name in config.axes.keys() {
        check_transform_chain(name, config)?;
    }

    for (name, actuator) in config.actuators.iter() {
        validate_actuator(name, actuator, config)?;
    }

    Ok(())
}

fn validate_planner(settings: &PlannerSettings) -> Result<()> {
    if settings.max_steps == 0 {
        return Err(ConfigError::InvalidPlanner { field: "max_steps", value: 0.0 }.into());
    }
    if settings.max_jerk_steps == 0 {
        return Err(ConfigError::InvalidPlanner { field: "max_jerk_steps", value: 0.0 }.into());
    }
    if !(settings.min_time_step > 0.0 && settings.min_time_step.is_finite()) {
        return Err(ConfigError::InvalidPlanner {
            field: "min_time_step",
            value: settings.min_time_step,
        }
        .into());
    }
    if !(settings.min_resolution_ticks > 0.0 && settings.min_resolution_ticks.is_finite()) {
        return Err(ConfigError::InvalidPlanner {
            field: "min_resolution_ticks",
            value: settings.min_resolution_ticks,
        }
        .into());
    }
    if !(settings.junction_deviation >= 0.0 && settings.junction_deviation.is_finite()) {
        return Err(ConfigError::InvalidPlanner {
            field: "junction_deviation",
            value: settings.junction_deviation,
        }
        .into());
    }
    if settings.lookahead == 0 {
        return Err(ConfigError::InvalidPlanner { field: "lookahead", value: 0.0 }.into());
    }
    Ok(())
}

fn validate_driver(name: &str, driver: &DriverConfig) -> Result<()> {
    match &driver.transport {
        TransportConfig::Serial(serial) => {
            let problem = if serial.port.trim().is_empty() {
                Some("port name is empty".to_string())
            } else if serial.baud == 0 {
                Some("baud must be > 0".to_string())
            } else if !(5..=8).contains(&serial.data_bits) {
                Some(format!("data bits {} outside 5..=8", serial.data_bits))
            } else if !(1..=2).contains(&serial.stop_bits) {
                Some(format!("stop bits {} must be 1 or 2", serial.stop_bits))
            } else {
                None
            };
            if let Some(message) = problem {
                return Err(ConfigError::InvalidSerial {
                    driver: name.to_string(),
                    message,
                }
                .into());
            }
        }
        TransportConfig::Tcp { host, port } => {
            if host.trim().is_empty() || *port == 0 {
                return Err(ConfigError::InvalidTcp {
                    driver: name.to_string(),
                    message: format!("unusable address {}:{}", host, port),
                }
                .into());
            }
        }
    }

    if driver.queue_depth == 0 || driver.queue_depth > MAX_QUEUE_DEPTH {
        return Err(ConfigError::InvalidQueueDepth {
            driver: name.to_string(),
            depth: driver.queue_depth,
            max: MAX_QUEUE_DEPTH,
        }
        .into());
    }

    let timeouts = [
        ("timeout_ms", driver.timeout.value()),
        ("connect_timeout_ms", driver.connect_timeout.value()),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            return Err(ConfigError::InvalidTimeout {
                driver: name.to_string(),
                field,
            }
            .into());
        }
    }
    for (class, value) in driver.timeouts.iter() {
        if CommandClass::from_key(class).is_none() || value.value() == 0 {
            return Err(ConfigError::InvalidTimeout {
                driver: name.to_string(),
                field: "timeouts_ms",
            }
            .into());
        }
    }
    if driver.max_consecutive_timeouts == 0 {
        return Err(ConfigError::InvalidTimeout {
            driver: name.to_string(),
            field: "max_consecutive_timeouts",
        }
        .into());
    }

    compile(name, &driver.patterns.confirm)?;
    for (class, pattern) in driver.patterns.confirm_by_class.iter() {
        if CommandClass::from_key(class).is_none() {
            return Err(ConfigError::UnknownCommandClass {
                driver: name.to_string(),
                field: "patterns.confirm_by_class",
                key: class.clone(),
            }
            .into());
        }
        compile(name, pattern)?;
    }
    if let Some(ref error) = driver.patterns.error {
        compile(name, error)?;
    }
    if let Some(ref report) = driver.patterns.position_report {
        compile(name, report)?;
    }

    for class in CommandClass::DRIVER_CLASSES {
        if let Some(template) = driver.commands.get(class) {
            Template::parse(template)?;
        }
    }

    Ok(())
}

fn compile(driver: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        ConfigError::InvalidPattern {
            driver: driver.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn validate_axis(name: &str, axis: &AxisConfig, config: &MachineConfig) -> Result<()> {
    match (&axis.driver, &axis.transform) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::AxisBinding {
                axis: name.to_string(),
                message: "cannot have both a driver and a transform".to_string(),
            }
            .into());
        }
        (None, None) => {
            return Err(ConfigError::AxisBinding {
                axis: name.to_string(),
                message: "needs either a driver or a transform".to_string(),
            }
            .into());
        }
        (Some(driver), None) => {
            if config.driver(driver).is_none() {
                return Err(ConfigError::UnknownDriver {
                    owner: name.to_string(),
                    driver: driver.clone(),
                }
                .into());
            }
            if axis.letter.as_deref().map_or(true, |l| l.trim().is_empty()) {
                return Err(ConfigError::AxisBinding {
                    axis: name.to_string(),
                    message: "controller axis needs a letter".to_string(),
                }
                .into());
            }
            let kinematics = [
                ("max_velocity", axis.max_velocity),
                ("max_acceleration", axis.max_acceleration),
                ("max_jerk", axis.max_jerk),
            ];
            for (field, value) in kinematics {
                let value = value.unwrap_or(0.0);
                if !(value > 0.0 && value.is_finite()) {
                    return Err(ConfigError::InvalidKinematics {
                        axis: name.to_string(),
                        field,
                        value,
                    }
                    .into());
                }
            }
        }
        (None, Some(transform)) => {
            if config.axis(transform.source()).is_none() {
                return Err(ConfigError::UnknownAxis {
                    axis: name.to_string(),
                    reference: transform.source().to_string(),
                }
                .into());
            }
            let (scale, offset) = transform.coefficients();
            if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
                return Err(ConfigError::InvalidTransform(name.to_string()).into());
            }
        }
    }

    if !(axis.ticks_per_unit > 0.0 && axis.ticks_per_unit.is_finite()) {
        return Err(ConfigError::InvalidResolution {
            axis: name.to_string(),
            value: axis.ticks_per_unit,
        }
        .into());
    }

    // Soft limits: min must be < max
    if let Some(ref limits) = axis.limits {
        if !limits.is_valid() {
            return Err(ConfigError::InvalidLimits {
                axis: name.to_string(),
                min: limits.min,
                max: limits.max,
            }
            .into());
        }
    }

    Ok(())
}

fn check_transform_chain(start: &str, config: &MachineConfig) -> Result<()> {
    let mut current = start;
    // A chain longer than the axis count must revisit an axis.
    for _ in 0..=config.axes.len() {
        match config.axis(current).and_then(|a| a.transform.as_ref()) {
            Some(transform) => current = transform.source(),
            None => return Ok(()),
        }
    }
    Err(ConfigError::TransformCycle(start.to_string()).into())
}

fn validate_actuator(name: &str, actuator: &ActuatorConfig, config: &MachineConfig) -> Result<()> {
    if config.driver(&actuator.driver).is_none() {
        return Err(ConfigError::UnknownDriver {
            owner: name.to_string(),
            driver: actuator.driver.clone(),
        }
        .into());
    }

    let templates = [&actuator.actuate_boolean, &actuator.actuate_double, &actuator.read];
    for template in templates.into_iter().flatten() {
        Template::parse(template)?;
    }

    if let Some(ref pattern) = actuator.read_regex {
        compile(&actuator.driver, pattern)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn parse(toml: &str) -> MachineConfig {
        toml::from_str(toml).unwrap()
    }

    const DRIVER: &str = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
"#;

    #[test]
    fn test_missing_kinematics_rejected() {
        let config = parse(&format!(
            "{}\n[axes.x]\nrole = \"x\"\ndriver = \"main\"\nletter = \"X\"\nmax_velocity = 100.0\n",
            DRIVER
        ));
        let result = validate_config(&config);
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidKinematics { field: "max_acceleration", .. }))
        ));
    }

    #[test]
    fn test_transform_cycle_rejected() {
        let config = parse(&format!(
            r#"{}
[axes.a]
transform = {{ kind = "negate", source = "b" }}

[axes.b]
transform = {{ kind = "negate", source = "a" }}
"#,
            DRIVER
        ));
        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::TransformCycle(_)))
        ));
    }

    #[test]
    fn test_zero_max_steps_rejected() {
        let mut settings = PlannerSettings::default();
        settings.max_steps = 0;
        assert!(matches!(
            validate_planner(&settings),
            Err(Error::Config(ConfigError::InvalidPlanner { field: "max_steps", .. }))
        ));
    }

    #[test]
    fn test_bad_confirm_pattern_rejected() {
        let config = parse(
            r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }
patterns = { confirm = "^ok(" }
"#,
        );
        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidPattern { .. }))
        ));
    }
}
