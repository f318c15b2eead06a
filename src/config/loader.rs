//! Configuration loading from files.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, Result};

use super::MachineConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
///
/// # Example
///
/// ```rust,ignore
/// use pnp_motion::load_config;
///
/// let config = load_config("machine.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MachineConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

    let config = parse_config(&content)?;
    info!(
        path = %path.display(),
        drivers = config.drivers.len(),
        axes = config.axes.len(),
        "Loaded machine configuration"
    );
    Ok(config)
}

/// Parse configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or fails validation.
pub fn parse_config(content: &str) -> Result<MachineConfig> {
    let config: MachineConfig = toml::from_str(content).map_err(ConfigError::from)?;

    // Validate the configuration
    super::validation::validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const MINIMAL: &str = r#"
[drivers.main]
transport = { type = "serial", port = "/dev/ttyACM0" }

[drivers.main.commands]
move_to = "G0 {X:X%.4f} {Y:Y%.4f} {FeedRate:F%.0f}"

[axes.x]
role = "x"
driver = "main"
letter = "X"
max_velocity = 500.0
max_acceleration = 5000.0
max_jerk = 100000.0
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(MINIMAL).unwrap();
        assert!(config.driver("main").is_some());
        assert!(config.axis("x").is_some());
    }

    #[test]
    fn test_parse_rejects_unknown_driver() {
        let toml = MINIMAL.replace("driver = \"main\"", "driver = \"aux\"");
        assert!(matches!(
            parse_config(&toml),
            Err(Error::Config(ConfigError::UnknownDriver { .. }))
        ));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        assert!(matches!(
            parse_config("[drivers.main"),
            Err(Error::Config(ConfigError::Parse(_)))
        ));
    }
}
