//! Wire protocols.
//!
//! A protocol decides how a rendered command line is confirmed. Protocols
//! are selected by [`DriverKind`] through the driver registry.

use core::fmt;

use regex::Regex;

use crate::config::DriverKind;
use crate::error::{ConfigError, Result};

use super::json;
use super::response::Confirmation;

/// Protocol spoken by a driver.
pub trait Protocol: Send + Sync + fmt::Debug {
    /// Driver kind this protocol implements.
    fn kind(&self) -> DriverKind;

    /// Confirmation rule for one rendered command line.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the line cannot be sent with this
    /// protocol.
    fn confirmation(&self, line: &str, confirm: &Regex) -> Result<Confirmation>;
}

/// Line-oriented text protocol confirmed by a regex.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcodeProtocol;

impl Protocol for GcodeProtocol {
    fn kind(&self) -> DriverKind {
        DriverKind::Gcode
    }

    fn confirmation(&self, _line: &str, confirm: &Regex) -> Result<Confirmation> {
        Ok(Confirmation::Pattern(confirm.clone()))
    }
}

/// Single-key JSON protocol confirmed by the echoed key.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParameterProtocol;

impl Protocol for JsonParameterProtocol {
    fn kind(&self) -> DriverKind {
        DriverKind::JsonParameter
    }

    fn confirmation(&self, line: &str, _confirm: &Regex) -> Result<Confirmation> {
        json::request_key(line)
            .map(Confirmation::JsonEcho)
            .ok_or_else(|| {
                ConfigError::InvalidTemplate {
                    template: line.to_string(),
                    message: "not a single-key JSON object".to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_protocol_requires_single_key() {
        let confirm = Regex::new("^ok").unwrap();
        let p = JsonParameterProtocol;
        assert!(matches!(
            p.confirmation(r#"{"xvm":5000}"#, &confirm),
            Ok(Confirmation::JsonEcho(ref k)) if k == "xvm"
        ));
        assert!(p.confirmation("G1 X10", &confirm).is_err());
    }
}
