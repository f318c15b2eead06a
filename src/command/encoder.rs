//! Command encoding.
//!
//! Renders templates into [`Command`]s bound to one driver, each carrying
//! its response matcher, timeout and retry budget.

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;
use tracing::trace;

use crate::config::DriverConfig;
use crate::error::{ConfigError, Result};

use super::class::CommandClass;
use super::protocol::Protocol;
use super::response::{Confirmation, ResponseMatcher};
use super::template::{Template, Variables};

/// A command bound to a driver, ready for dispatch.
#[derive(Debug, Clone)]
pub struct Command {
    /// Target driver.
    pub driver: String,
    /// Command class.
    pub class: CommandClass,
    /// Line to send, without terminator.
    pub text: String,
    /// Confirmation, error and capture patterns.
    pub matcher: ResponseMatcher,
    /// Time allowed for confirmation.
    pub timeout: Duration,
    /// Resends allowed after a timeout.
    pub retries: u8,
    /// Template the line was rendered from.
    pub template: Option<String>,
    /// Axis the command addresses, if a single one.
    pub axis: Option<String>,
}

impl Command {
    /// Attach the addressed axis.
    pub fn with_axis(mut self, axis: impl Into<String>) -> Self {
        self.axis = Some(axis.into());
        self
    }
}

/// Per-driver command factory.
#[derive(Debug)]
pub struct CommandEncoder {
    driver: String,
    protocol: Box<dyn Protocol>,
    confirm: Regex,
    confirm_by_class: BTreeMap<CommandClass, Regex>,
    error: Option<Regex>,
    position_report: Option<Regex>,
    templates: BTreeMap<CommandClass, Template>,
    default_timeout: Duration,
    timeouts: BTreeMap<CommandClass, Duration>,
    retries: u8,
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

impl CommandEncoder {
    /// Compile a driver's patterns and templates.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern or template is invalid.
    pub fn new(driver: &str, config: &DriverConfig, protocol: Box<dyn Protocol>) -> Result<Self> {
        let confirm = compile(driver, &config.patterns.confirm)?;
        let mut confirm_by_class = BTreeMap::new();
        for (key, pattern) in config.patterns.confirm_by_class.iter() {
            let class = CommandClass::from_key(key).ok_or_else(|| ConfigError::UnknownCommandClass {
                driver: driver.to_string(),
                field: "patterns.confirm_by_class",
                key: key.clone(),
            })?;
            confirm_by_class.insert(class, compile(driver, pattern)?);
        }
        let error = config
            .patterns
            .error
            .as_deref()
            .map(|p| compile(driver, p))
            .transpose()?;
        let position_report = config
            .patterns
            .position_report
            .as_deref()
            .map(|p| compile(driver, p))
            .transpose()?;

        let mut templates = BTreeMap::new();
        let mut timeouts = BTreeMap::new();
        for class in CommandClass::DRIVER_CLASSES {
            if let Some(source) = config.commands.get(class) {
                templates.insert(class, Template::parse(source)?);
            }
            timeouts.insert(class, config.timeout_for(class));
        }
        for class in [
            CommandClass::ActuateBoolean,
            CommandClass::ActuateDouble,
            CommandClass::ActuatorRead,
            CommandClass::Raw,
        ] {
            timeouts.insert(class, config.timeout_for(class));
        }

        Ok(Self {
            driver: driver.to_string(),
            protocol,
            confirm,
            confirm_by_class,
            error,
            position_report,
            templates,
            default_timeout: config.timeout.as_duration(),
            timeouts,
            retries: config.retries,
        })
    }

    /// Driver name.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Wire protocol.
    pub fn protocol(&self) -> &dyn Protocol {
        self.protocol.as_ref()
    }

    /// Check if a template is configured for a class.
    pub fn has(&self, class: CommandClass) -> bool {
        self.templates.contains_key(&class)
    }

    /// Timeout for a class.
    pub fn timeout(&self, class: CommandClass) -> Duration {
        self.timeouts
            .get(&class)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Render the configured template for a class.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingTemplate`] if the class has no template.
    pub fn encode(&self, class: CommandClass, vars: &Variables) -> Result<Vec<Command>> {
        let template = self.templates.get(&class).ok_or_else(|| ConfigError::MissingTemplate {
            driver: self.driver.clone(),
            class,
        })?;
        let capture = match class {
            CommandClass::PositionReport => self.position_report.clone(),
            _ => None,
        };
        self.encode_template(class, template, vars, capture)
    }

    /// Render the configured template for a class, or nothing if none is
    /// configured.
    pub fn encode_optional(&self, class: CommandClass, vars: &Variables) -> Result<Vec<Command>> {
        if self.has(class) {
            self.encode(class, vars)
        } else {
            Ok(Vec::new())
        }
    }

    /// Render an arbitrary template (actuators).
    pub fn encode_template(
        &self,
        class: CommandClass,
        template: &Template,
        vars: &Variables,
        capture: Option<Regex>,
    ) -> Result<Vec<Command>> {
        let lines = template.render(vars);
        let mut commands = Vec::with_capacity(lines.len());
        for line in lines {
            let mut command = self.bind(class, line, capture.clone())?;
            command.template = Some(template.source().to_string());
            commands.push(command);
        }
        trace!(driver = %self.driver, class = %class, count = commands.len(), "Encoded commands");
        Ok(commands)
    }

    /// Bind a literal line.
    pub fn raw(&self, text: impl Into<String>) -> Result<Command> {
        self.bind(CommandClass::Raw, text.into(), None)
    }

    /// Matcher for a line of a class under this driver's protocol.
    pub fn matcher(
        &self,
        class: CommandClass,
        line: &str,
        capture: Option<Regex>,
    ) -> Result<ResponseMatcher> {
        let pattern = self.confirm_by_class.get(&class).unwrap_or(&self.confirm);
        let confirm: Confirmation = self.protocol.confirmation(line, pattern)?;
        Ok(ResponseMatcher::new(confirm, self.error.clone(), capture))
    }

    fn bind(&self, class: CommandClass, text: String, capture: Option<Regex>) -> Result<Command> {
        Ok(Command {
            driver: self.driver.clone(),
            class,
            matcher: self.matcher(class, &text, capture)?,
            text,
            timeout: self.timeout(class),
            retries: self.retries,
            template: None,
            axis: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{GcodeProtocol, JsonParameterProtocol, LineMatch};
    use crate::config::TransportConfig;

    fn config() -> DriverConfig {
        let mut c = DriverConfig::new(TransportConfig::Tcp {
            host: "localhost".into(),
            port: 9000,
        });
        c.commands.move_to = Some("G1 {X:X%.3f} {Y:Y%.3f} {FeedRate:F%.0f}\nM400".into());
        c.patterns.position_report = Some(r"X:(?P<X>-?\d+\.\d+)".into());
        c.commands.position_report = Some("M114".into());
        c.timeouts.insert("move_to".into(), crate::config::units::Millis(30_000));
        c
    }

    #[test]
    fn test_encode_move() {
        let enc = CommandEncoder::new("main", &config(), Box::new(GcodeProtocol)).unwrap();
        let vars = Variables::new().with("X", 10.0).with("FeedRate", 6000.0);
        let cmds = enc.encode(CommandClass::MoveTo, &vars).unwrap();

        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].text, "G1 X10.000 F6000");
        assert_eq!(cmds[1].text, "M400");
        assert_eq!(cmds[0].timeout, Duration::from_secs(30));
        assert_eq!(cmds[0].matcher.classify("ok"), LineMatch::Confirmed(Default::default()));
    }

    #[test]
    fn test_confirm_pattern_by_class() {
        let mut c = config();
        c.commands.home = Some("G28".into());
        c.patterns.confirm_by_class.insert("home".into(), "^homed$".into());
        let enc = CommandEncoder::new("main", &c, Box::new(GcodeProtocol)).unwrap();

        let home = &enc.encode(CommandClass::Home, &Variables::new()).unwrap()[0];
        assert_eq!(home.matcher.classify("ok"), LineMatch::Unrelated);
        assert!(matches!(home.matcher.classify("homed"), LineMatch::Confirmed(_)));

        let raw = enc.raw("M115").unwrap();
        assert!(matches!(raw.matcher.classify("ok"), LineMatch::Confirmed(_)));
    }

    #[test]
    fn test_missing_template() {
        let enc = CommandEncoder::new("main", &config(), Box::new(GcodeProtocol)).unwrap();
        assert!(matches!(
            enc.encode(CommandClass::Home, &Variables::new()),
            Err(crate::error::Error::Config(ConfigError::MissingTemplate { .. }))
        ));
        assert!(enc.encode_optional(CommandClass::Home, &Variables::new()).unwrap().is_empty());
    }

    #[test]
    fn test_position_report_captures() {
        let enc = CommandEncoder::new("main", &config(), Box::new(GcodeProtocol)).unwrap();
        let cmds = enc.encode(CommandClass::PositionReport, &Variables::new()).unwrap();
        assert!(matches!(cmds[0].matcher.classify("X:1.500"), LineMatch::Captured(_)));
    }

    #[test]
    fn test_json_driver_rejects_text_lines() {
        let enc = CommandEncoder::new("tiny", &config(), Box::new(JsonParameterProtocol)).unwrap();
        assert!(enc.raw(r#"{"xvm":5000}"#).is_ok());
        assert!(enc.raw("G1 X10").is_err());
    }
}
