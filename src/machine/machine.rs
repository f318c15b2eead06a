//! Machine facade.
//!
//! [`Machine`] ties the planner, the resolved axes and one dispatcher per
//! driver together. It is single-threaded: the machine executor owns it
//! and is the only place axis position changes.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info, trace, warn};

use crate::axis::{AxisMap, AxisRole, Location, Position};
use crate::command::{numeric_captures, Captures, CommandClass, Template, Variables};
use crate::config::{units, ActuatorConfig, PlannerSettings};
use crate::driver::Dispatcher;
use crate::error::{CommunicationError, ConfigError, Error, MotionError, Result};
use crate::motion::{MotionExecutor, MotionPlanner, MotionSegment, MoveOptions, Step};

use super::context::MachineContext;
use super::events::MachineEvent;

/// Value written to an actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorValue {
    /// On/off.
    Bool(bool),
    /// Numeric setpoint.
    Double(f64),
}

impl From<bool> for ActuatorValue {
    fn from(v: bool) -> Self {
        ActuatorValue::Bool(v)
    }
}

impl From<f64> for ActuatorValue {
    fn from(v: f64) -> Self {
        ActuatorValue::Double(v)
    }
}

impl fmt::Display for ActuatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorValue::Bool(v) => write!(f, "{}", v),
            ActuatorValue::Double(v) => write!(f, "{}", v),
        }
    }
}

/// Actuator with its templates parsed.
#[derive(Debug)]
pub(crate) struct Actuator {
    driver: String,
    index: Option<u32>,
    boolean: Option<Template>,
    double: Option<Template>,
    read: Option<Template>,
    read_regex: Option<Regex>,
    coordinated: bool,
}

impl Actuator {
    pub(crate) fn parse(config: &ActuatorConfig) -> Result<Self> {
        let template = |source: &Option<String>| source.as_deref().map(Template::parse).transpose();
        let read_regex = config
            .read_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    driver: config.driver.clone(),
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            driver: config.driver.clone(),
            index: config.index,
            boolean: template(&config.actuate_boolean)?,
            double: template(&config.actuate_double)?,
            read: template(&config.read)?,
            read_regex,
            coordinated: config.coordinated,
        })
    }
}

/// Planner, axes, drivers and actuators of one machine.
#[derive(Debug)]
pub struct Machine {
    context: MachineContext,
    axes: Arc<AxisMap>,
    planner: MotionPlanner,
    drivers: BTreeMap<String, Dispatcher>,
    actuators: BTreeMap<String, Actuator>,
    position: Position,
}

impl Machine {
    pub(crate) fn new(
        context: MachineContext,
        axes: Arc<AxisMap>,
        planner: MotionPlanner,
        drivers: BTreeMap<String, Dispatcher>,
        actuators: BTreeMap<String, Actuator>,
    ) -> Self {
        Self {
            context,
            axes,
            planner,
            drivers,
            actuators,
            position: Position::new(),
        }
    }

    /// Shared context.
    #[inline]
    pub fn context(&self) -> &MachineContext {
        &self.context
    }

    /// Resolved axes.
    #[inline]
    pub fn axes(&self) -> &AxisMap {
        &self.axes
    }

    /// Motion planner.
    #[inline]
    pub fn planner(&self) -> &MotionPlanner {
        &self.planner
    }

    /// Current position.
    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Dispatcher for a driver.
    pub fn driver(&self, name: &str) -> Option<&Dispatcher> {
        self.drivers.get(name)
    }

    /// Mutable dispatcher for a driver.
    pub fn driver_mut(&mut self, name: &str) -> Option<&mut Dispatcher> {
        self.drivers.get_mut(name)
    }

    /// All dispatchers, by driver name.
    pub fn drivers(&self) -> impl Iterator<Item = &Dispatcher> {
        self.drivers.values()
    }

    /// Replace the planner settings.
    pub fn set_planner_settings(&mut self, settings: PlannerSettings) {
        info!(?settings, "Planner settings changed");
        self.planner.set_settings(settings.clone());
        self.context.emit(MachineEvent::PlannerSettingsChanged(settings));
    }

    // ---- lifecycle ----

    /// Connect and enable every driver.
    ///
    /// # Errors
    ///
    /// Returns the first driver failure with its driver as context.
    pub fn connect(&mut self) -> Result<()> {
        for (name, driver) in self.drivers.iter_mut() {
            driver
                .connect()
                .and_then(|()| driver.enable())
                .map_err(|e| e.context(format!("connect driver '{}'", name)))?;
        }
        Ok(())
    }

    /// Disable and disconnect every driver.
    pub fn disconnect(&mut self) {
        for (name, driver) in self.drivers.iter_mut() {
            if let Err(e) = driver.flush().and_then(|()| driver.disable()) {
                warn!(driver = %name, error = %e, "Disable failed");
            }
            driver.disconnect();
        }
    }

    /// Send pending keep-alive pings and process idle link events.
    pub fn keep_alive(&mut self) {
        for (name, driver) in self.drivers.iter_mut() {
            if let Err(e) = driver.keep_alive() {
                warn!(driver = %name, error = %e, "Keep-alive failed");
            }
        }
    }

    /// Machine-wide abort: flush every queue, emergency-stop every connected
    /// driver and mark the position unknown.
    pub fn abort(&mut self) {
        error!("Machine abort");
        for driver in self.drivers.values_mut() {
            driver.abort();
        }
        self.position.invalidate();
        self.context.emit(MachineEvent::Aborted);
    }

    /// Clear the abort signal and any driver fault, then reconnect.
    ///
    /// # Errors
    ///
    /// Returns the first driver that fails to come back.
    pub fn reset(&mut self) -> Result<()> {
        self.context.abort().clear();
        for (name, driver) in self.drivers.iter_mut() {
            if !driver.is_available() {
                driver
                    .reset()
                    .and_then(|()| driver.enable())
                    .map_err(|e| e.context(format!("reset driver '{}'", name)))?;
            }
        }
        Ok(())
    }

    // ---- motion ----

    /// Home every driver that has a home command and establish the home
    /// location.
    ///
    /// # Errors
    ///
    /// Returns the first command failure.
    pub fn home(&mut self) -> Result<()> {
        for (name, driver) in self.drivers.iter_mut() {
            if !driver.encoder().has(CommandClass::Home) {
                continue;
            }
            let result = driver.flush().and_then(|()| {
                for command in driver.encoder().encode(CommandClass::Home, &Variables::new())? {
                    driver.execute(command)?;
                }
                Ok(())
            });
            result.map_err(|e| e.context(format!("home driver '{}'", name)))?;
        }

        let home = self.axes.home_location();
        self.position.establish(home);
        info!(%home, "Homed");
        self.context.emit(MachineEvent::Homed(home));
        Ok(())
    }

    /// Move to a location.
    ///
    /// # Errors
    ///
    /// Returns a motion error for targets outside reject-policy limits or
    /// while the position is lost after an abort, or the driver failure,
    /// with the move as context.
    pub fn move_to(&mut self, target: Location, options: MoveOptions) -> Result<()> {
        self.move_path(&[(target, options)])
    }

    /// Raise to safe Z, travel at safe Z, then lower to the target.
    ///
    /// Machines without a Z axis move directly.
    pub fn move_to_at_safe_z(&mut self, target: Location, options: MoveOptions) -> Result<()> {
        if !self.axes.has(AxisRole::Z) {
            return self.move_to(target, options);
        }
        let safe_z = self.context.config().safe_z;
        let current = self.position.location();
        self.move_path(&[
            (current.with(AxisRole::Z, safe_z), options),
            (target.with(AxisRole::Z, safe_z), options),
            (target, options),
        ])
    }

    /// Plan and issue a run of moves. Coordinated moves blend when
    /// continuous motion is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::PositionUnknown`] until the position lost by
    /// an abort is re-established by [`home`](Self::home) or
    /// [`read_position`](Self::read_position). Otherwise returns the first
    /// planning or driver failure; later moves of the run are not issued.
    pub fn move_path(&mut self, moves: &[(Location, MoveOptions)]) -> Result<()> {
        if self.position.is_lost() {
            warn!("Move refused, position lost since abort");
            return Err(MotionError::PositionUnknown.into());
        }
        let Some((last, _)) = moves.last() else {
            return Ok(());
        };
        let segments = self
            .planner
            .plan_path(self.position.location(), moves)
            .map_err(|e| e.context(format!("move to {}", last)))?;

        let mut segments = segments.into_iter();
        while let Some(segment) = segments.next() {
            let end = segment.end();
            if let Err(e) = self.execute_segment(segment) {
                for mut rest in segments {
                    // Queued -> Aborted is always allowed
                    let _ = rest.transition(crate::motion::SegmentState::Aborted);
                }
                return Err(e.context(format!("move to {}", end)));
            }
        }
        Ok(())
    }

    fn execute_segment(&mut self, segment: MotionSegment) -> Result<()> {
        if segment.is_zero() {
            trace!(at = %segment.end(), "Zero-length move, nothing to send");
            MotionExecutor::new(segment)?.complete()?;
            return Ok(());
        }

        if segment.interpolation_failed() {
            self.context.emit(MachineEvent::InterpolationFallback {
                start: segment.start(),
                end: segment.end(),
            });
        }

        let moving: Vec<AxisRole> = AxisRole::ALL
            .into_iter()
            .filter(|&role| self.axes.has(role) && segment.unit()[role.index()] != 0.0)
            .collect();
        let drivers: BTreeSet<String> = self
            .axes
            .iter()
            .filter(|axis| moving.contains(&axis.role))
            .map(|axis| axis.driver.clone())
            .collect();

        let coordinated = segment.is_coordinated();
        if !coordinated {
            self.settle_drivers(&drivers)?;
        }

        let mut executor = MotionExecutor::new(segment)?;
        if let Err(e) = self.issue_steps(&mut executor, &drivers, &moving) {
            let segment = executor.abort();
            debug!(end = %segment.end(), "Segment aborted");
            return Err(e);
        }
        let segment = executor.complete()?;
        self.position.commit(segment.end());

        if !coordinated {
            self.settle_drivers(&drivers)?;
        }

        self.context.emit(MachineEvent::MoveCompleted {
            end: segment.end(),
            duration: segment.duration(),
        });
        Ok(())
    }

    fn issue_steps(
        &mut self,
        executor: &mut MotionExecutor,
        drivers: &BTreeSet<String>,
        moving: &[AxisRole],
    ) -> Result<()> {
        while let Some(step) = executor.advance() {
            for name in drivers {
                let vars = self.move_variables(name, &step, moving);
                let axis = self.single_axis(name, moving);
                let driver = self.dispatcher(name)?;
                for command in driver.encoder().encode(CommandClass::MoveTo, &vars)? {
                    let command = match &axis {
                        Some(axis) => command.with_axis(axis.clone()),
                        None => command,
                    };
                    driver.submit(command)?;
                }
            }
        }
        Ok(())
    }

    /// Template variables for one step on one driver: raw coordinates of
    /// the driver's moving axes by controller letter, plus feedrate
    /// (units/min), acceleration and jerk.
    fn move_variables(&self, driver: &str, step: &Step, moving: &[AxisRole]) -> Variables {
        let mut vars = Variables::new();
        for axis in self
            .axes
            .iter()
            .filter(|axis| axis.driver == driver && moving.contains(&axis.role))
        {
            vars.set(axis.letter.clone(), axis.to_raw(step.target.get(axis.role)));
        }

        let waypoint = &step.waypoint;
        vars.set("FeedRate", units::per_minute(waypoint.velocity));
        if waypoint.acceleration > 0.0 {
            vars.set("Acceleration", waypoint.acceleration);
        }
        if waypoint.jerk > 0.0 {
            vars.set("Jerk", waypoint.jerk);
        }
        vars
    }

    fn single_axis(&self, driver: &str, moving: &[AxisRole]) -> Option<String> {
        let mut names = self
            .axes
            .iter()
            .filter(|axis| axis.driver == driver && moving.contains(&axis.role))
            .map(|axis| axis.name.clone());
        let first = names.next()?;
        names.next().is_none().then_some(first)
    }

    /// Wait until every command on the given drivers has resolved and the
    /// controllers report motion complete.
    fn settle_drivers(&mut self, drivers: &BTreeSet<String>) -> Result<()> {
        for name in drivers {
            settle(self.dispatcher(name)?)?;
        }
        Ok(())
    }

    /// Wait for all motion on every driver to finish.
    ///
    /// # Errors
    ///
    /// Returns the first outstanding command failure.
    pub fn wait_for_completion(&mut self) -> Result<()> {
        for (name, driver) in self.drivers.iter_mut() {
            settle(driver).map_err(|e| e.context(format!("wait for driver '{}'", name)))?;
        }
        Ok(())
    }

    /// Ask the controllers for their position and adopt it.
    ///
    /// Drivers without a position report command are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first command failure.
    pub fn read_position(&mut self) -> Result<Location> {
        let mut location = self.position.location();
        let mut reported = false;

        for (name, driver) in self.drivers.iter_mut() {
            if !driver.encoder().has(CommandClass::PositionReport) {
                continue;
            }
            let captures = driver
                .flush()
                .and_then(|()| {
                    let mut captures = Captures::new();
                    for command in driver
                        .encoder()
                        .encode(CommandClass::PositionReport, &Variables::new())?
                    {
                        captures.extend(driver.execute(command)?.captures);
                    }
                    Ok(captures)
                })
                .map_err(|e| e.context(format!("read position from driver '{}'", name)))?;

            let values = numeric_captures(&captures);
            for axis in self.axes.iter().filter(|axis| axis.driver == *name) {
                if let Some(raw) = values.get(&axis.letter) {
                    location = location.with(axis.role, axis.to_logical(*raw));
                    reported = true;
                }
            }
        }

        if reported {
            debug!(%location, "Position read back");
            self.position.establish(location);
        }
        Ok(location)
    }

    // ---- actuators and raw commands ----

    /// Write an actuator.
    ///
    /// Coordinated actuators first wait for all motion on their driver.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown actuators or missing
    /// templates, or the command failure, with the actuation as context.
    pub fn actuate(&mut self, name: &str, value: ActuatorValue) -> Result<()> {
        self.actuate_inner(name, value)
            .map_err(|e| e.context(format!("actuate {} = {}", name, value)))
    }

    fn actuate_inner(&mut self, name: &str, value: ActuatorValue) -> Result<()> {
        let actuator = self
            .actuators
            .get(name)
            .ok_or_else(|| ConfigError::UnknownActuator(name.to_string()))?;

        let (class, template) = match value {
            ActuatorValue::Bool(_) => (CommandClass::ActuateBoolean, actuator.boolean.as_ref()),
            ActuatorValue::Double(_) => (CommandClass::ActuateDouble, actuator.double.as_ref()),
        };
        let template = template.ok_or_else(|| ConfigError::MissingTemplate {
            driver: actuator.driver.clone(),
            class,
        })?;

        let mut vars = Variables::new();
        if let Some(index) = actuator.index {
            vars.set("Index", index);
        }
        match value {
            ActuatorValue::Bool(on) => {
                vars.set("True", on).set("False", !on);
            }
            ActuatorValue::Double(v) => {
                vars.set("DoubleValue", v).set("IntegerValue", v.round() as i64);
            }
        }

        let driver = self
            .drivers
            .get_mut(&actuator.driver)
            .ok_or_else(|| Error::DriverUnavailable(actuator.driver.clone()))?;
        if actuator.coordinated {
            settle(driver)?;
        }
        for command in driver.encoder().encode_template(class, template, &vars, None)? {
            driver.execute(command.with_axis(name))?;
        }
        debug!(actuator = name, %value, "Actuated");
        Ok(())
    }

    /// Read an actuator.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown actuators or a missing
    /// read template, or [`CommunicationError::Malformed`] if no value was
    /// captured.
    pub fn read_actuator(&mut self, name: &str) -> Result<String> {
        self.read_actuator_inner(name)
            .map_err(|e| e.context(format!("read actuator {}", name)))
    }

    fn read_actuator_inner(&mut self, name: &str) -> Result<String> {
        let actuator = self
            .actuators
            .get(name)
            .ok_or_else(|| ConfigError::UnknownActuator(name.to_string()))?;
        let template = actuator.read.as_ref().ok_or_else(|| ConfigError::MissingTemplate {
            driver: actuator.driver.clone(),
            class: CommandClass::ActuatorRead,
        })?;

        let mut vars = Variables::new();
        if let Some(index) = actuator.index {
            vars.set("Index", index);
        }

        let driver = self
            .drivers
            .get_mut(&actuator.driver)
            .ok_or_else(|| Error::DriverUnavailable(actuator.driver.clone()))?;
        if actuator.coordinated {
            settle(driver)?;
        }

        let mut captures = Captures::new();
        let commands = driver.encoder().encode_template(
            CommandClass::ActuatorRead,
            template,
            &vars,
            actuator.read_regex.clone(),
        )?;
        for command in commands {
            captures.extend(driver.execute(command.with_axis(name))?.captures);
        }

        captures
            .get("Value")
            .or_else(|| captures.values().next())
            .cloned()
            .ok_or_else(|| Error::Command {
                driver: actuator.driver.clone(),
                class: CommandClass::ActuatorRead,
                template: Some(template.source().to_string()),
                axis: Some(name.to_string()),
                source: CommunicationError::Malformed("no reading captured".to_string()),
            })
    }

    /// Send a literal command line and wait for its confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverUnavailable`] for unknown drivers, or the
    /// command failure.
    pub fn send_raw(&mut self, driver: &str, text: &str) -> Result<Captures> {
        let dispatcher = self.dispatcher(driver)?;
        let command = dispatcher.encoder().raw(text)?;
        Ok(dispatcher.execute(command)?.captures)
    }

    fn dispatcher(&mut self, name: &str) -> Result<&mut Dispatcher> {
        self.drivers
            .get_mut(name)
            .ok_or_else(|| Error::DriverUnavailable(name.to_string()))
    }
}

/// Wait for a driver's queue to drain and its motion to complete.
fn settle(driver: &mut Dispatcher) -> Result<()> {
    driver.flush()?;
    for command in driver
        .encoder()
        .encode_optional(CommandClass::MoveToComplete, &Variables::new())?
    {
        driver.execute(command)?;
    }
    Ok(())
}
