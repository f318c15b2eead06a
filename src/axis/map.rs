//! Role-to-channel resolution.

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::{MachineConfig, SoftLimits};
use crate::error::{ConfigError, MotionError, Result};

use super::location::{AxisRole, Location};
use super::transform::Affine;

/// Kinematic caps of an axis in logical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    /// Maximum velocity (units/s).
    pub max_velocity: f64,
    /// Maximum acceleration (units/s²).
    pub max_acceleration: f64,
    /// Maximum jerk (units/s³).
    pub max_jerk: f64,
}

impl Kinematics {
    fn scaled(self, gain: f64) -> Self {
        Self {
            max_velocity: self.max_velocity * gain,
            max_acceleration: self.max_acceleration * gain,
            max_jerk: self.max_jerk * gain,
        }
    }
}

/// A logical axis resolved down to its controller channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAxis {
    /// Logical axis name.
    pub name: String,
    /// Role in the canonical coordinate space.
    pub role: AxisRole,
    /// Controller axis at the end of the transform chain.
    pub controller_axis: String,
    /// Driver owning the channel.
    pub driver: String,
    /// Controller channel letter.
    pub letter: String,
    /// Flattened transform chain.
    pub affine: Affine,
    /// Kinematic caps in logical units.
    pub kinematics: Kinematics,
    /// Resolution in ticks per logical unit.
    pub ticks_per_unit: f64,
    /// Soft limits in logical units.
    pub limits: Option<SoftLimits>,
    /// Home coordinate in logical units.
    pub home: f64,
}

impl ResolvedAxis {
    /// Logical coordinate to the controller coordinate sent on the wire.
    #[inline]
    pub fn to_raw(&self, logical: f64) -> f64 {
        self.affine.to_raw(logical)
    }

    /// Controller coordinate reported by the controller to logical.
    #[inline]
    pub fn to_logical(&self, raw: f64) -> f64 {
        self.affine.to_logical(raw)
    }

    /// Smallest logical displacement the controller can express.
    #[inline]
    pub fn resolution(&self) -> f64 {
        1.0 / self.ticks_per_unit
    }
}

/// Role-indexed table of resolved axes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisMap {
    axes: [Option<ResolvedAxis>; 4],
}

impl AxisMap {
    /// Resolve every role-bearing axis of a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a transform chain is broken.
    pub fn resolve(config: &MachineConfig) -> Result<Self> {
        let mut map = Self::default();

        for (name, axis) in config.axes.iter() {
            let Some(role) = axis.role else { continue };
            let resolved = resolve_axis(name, role, config)?;
            map.axes[role.index()] = Some(resolved);
        }

        Ok(map)
    }

    /// Axis bound to a role.
    pub fn get(&self, role: AxisRole) -> Option<&ResolvedAxis> {
        self.axes[role.index()].as_ref()
    }

    /// Iterate bound axes in role order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedAxis> {
        self.axes.iter().flatten()
    }

    /// Drivers referenced by bound axes.
    pub fn drivers(&self) -> BTreeSet<&str> {
        self.iter().map(|a| a.driver.as_str()).collect()
    }

    /// Check if a role has an axis.
    pub fn has(&self, role: AxisRole) -> bool {
        self.axes[role.index()].is_some()
    }

    /// Home location; unbound roles stay at zero.
    pub fn home_location(&self) -> Location {
        let mut c = [0.0; 4];
        for axis in self.iter() {
            c[axis.role.index()] = axis.home;
        }
        Location::from_array(c)
    }

    /// Apply soft limits and resolution snapping to a target.
    ///
    /// Unbound roles keep the `current` coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::SoftLimit`] for a reject-policy violation and
    /// [`MotionError::InvalidTarget`] for non-finite coordinates.
    pub fn constrain(&self, target: &Location, current: &Location) -> Result<Location> {
        let mut out = current.to_array();

        for role in AxisRole::ALL {
            let Some(axis) = self.get(role) else { continue };
            let value = target.get(role);
            if !value.is_finite() {
                return Err(MotionError::InvalidTarget(role).into());
            }

            let limited = match axis.limits {
                Some(limits) => match limits.apply(value) {
                    Some(v) => {
                        if v != value {
                            warn!(axis = %axis.name, requested = value, clamped = v, "Target clamped to soft limit");
                        }
                        v
                    }
                    None => {
                        return Err(MotionError::SoftLimit {
                            axis: axis.name.clone(),
                            target: value,
                            min: limits.min,
                            max: limits.max,
                        }
                        .into());
                    }
                },
                None => value,
            };

            out[role.index()] = snap_logical(limited, axis);
        }

        Ok(Location::from_array(out))
    }
}

/// Snap a logical coordinate onto the controller tick grid.
fn snap_logical(value: f64, axis: &ResolvedAxis) -> f64 {
    let raw = axis.to_raw(value);
    let raw_ticks_per_unit = axis.ticks_per_unit * axis.affine.gain();
    let snapped = crate::config::units::snap(raw, raw_ticks_per_unit);
    axis.to_logical(snapped)
}

fn resolve_axis(name: &str, role: AxisRole, config: &MachineConfig) -> Result<ResolvedAxis> {
    let mut steps: Vec<Affine> = Vec::new();
    let mut current = name;

    // Walk down to the controller axis; validation already rejected cycles.
    let controller = loop {
        let axis = config.axis(current).ok_or_else(|| ConfigError::UnknownAxis {
            axis: name.to_string(),
            reference: current.to_string(),
        })?;
        match &axis.transform {
            Some(transform) => {
                let (scale, offset) = transform.coefficients();
                steps.push(Affine::new(scale, offset));
                current = transform.source();
                if steps.len() > config.axes.len() {
                    return Err(ConfigError::TransformCycle(name.to_string()).into());
                }
            }
            None => break axis,
        }
    };

    // Innermost step was pushed last.
    let affine = steps
        .iter()
        .rev()
        .fold(Affine::IDENTITY, |acc, step| acc.then(*step));

    let binding = |message: &str| ConfigError::AxisBinding {
        axis: current.to_string(),
        message: message.to_string(),
    };
    let driver = controller
        .driver
        .clone()
        .ok_or_else(|| binding("controller axis has no driver"))?;
    let letter = controller
        .letter
        .clone()
        .ok_or_else(|| binding("controller axis has no letter"))?;
    let raw = Kinematics {
        max_velocity: controller.max_velocity.unwrap_or(0.0),
        max_acceleration: controller.max_acceleration.unwrap_or(0.0),
        max_jerk: controller.max_jerk.unwrap_or(0.0),
    };

    // Limits on the logical axis win over the controller's mapped ones.
    let own_limits = if steps.is_empty() {
        None
    } else {
        config.axis(name).and_then(|a| a.limits)
    };
    let limits = own_limits.or_else(|| {
        controller
            .limits
            .map(|l| l.transformed(affine.scale, affine.offset))
    });

    Ok(ResolvedAxis {
        name: name.to_string(),
        role,
        controller_axis: current.to_string(),
        driver,
        letter,
        affine,
        kinematics: raw.scaled(affine.gain()),
        ticks_per_unit: controller.ticks_per_unit / affine.gain(),
        limits,
        home: affine.to_logical(controller.home),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[drivers.main]
transport = { type = "tcp", host = "localhost", port = 9000 }

[axes.x]
role = "x"
driver = "main"
letter = "X"
ticks_per_unit = 80.0
max_velocity = 500.0
max_acceleration = 3000.0
max_jerk = 50000.0
limits = { min = 0.0, max = 400.0, policy = "clamp" }

[axes.z1]
driver = "main"
letter = "Z"
home = 5.0
max_velocity = 100.0
max_acceleration = 1000.0
max_jerk = 20000.0
limits = { min = -40.0, max = 10.0 }

[axes.z]
role = "z"
transform = { kind = "negate", source = "z1" }

[axes.c]
role = "rotation"
transform = { kind = "map", source = "c_raw", scale = 2.0 }

[axes.c_raw]
driver = "main"
letter = "A"
ticks_per_unit = 10.0
max_velocity = 1000.0
max_acceleration = 5000.0
max_jerk = 100000.0
"#;

    fn map() -> AxisMap {
        AxisMap::resolve(&parse_config(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_negated_axis_resolves_to_controller() {
        let map = map();
        let z = map.get(AxisRole::Z).unwrap();
        assert_eq!(z.controller_axis, "z1");
        assert_eq!(z.letter, "Z");
        assert_eq!(z.to_raw(12.5), -12.5);
        assert_eq!(z.home, -5.0);

        let limits = z.limits.unwrap();
        assert_eq!((limits.min, limits.max), (-10.0, 40.0));
    }

    #[test]
    fn test_mapped_axis_scales_kinematics() {
        let map = map();
        let c = map.get(AxisRole::Rotation).unwrap();
        assert_eq!(c.kinematics.max_velocity, 2000.0);
        assert_eq!(c.ticks_per_unit, 5.0);
        assert_eq!(c.to_raw(90.0), 45.0);
    }

    #[test]
    fn test_constrain_clamps_and_rejects() {
        let map = map();
        let current = Location::default();

        let clamped = map
            .constrain(&Location::new(450.0, 0.0, 0.0, 0.0), &current)
            .unwrap();
        assert_eq!(clamped.x, 400.0);

        let rejected = map.constrain(&Location::new(10.0, 0.0, 50.0, 0.0), &current);
        assert!(matches!(
            rejected,
            Err(crate::error::Error::Motion(MotionError::SoftLimit { .. }))
        ));
    }

    #[test]
    fn test_constrain_snaps_to_ticks() {
        let map = map();
        let snapped = map
            .constrain(&Location::new(10.0061, 3.0, 0.0, 0.0), &Location::default())
            .unwrap();
        // 80 ticks/mm -> 0.0125 mm grid
        assert!((snapped.x - 10.0).abs() < 1e-9);
        // Y has no axis and keeps the current coordinate
        assert_eq!(snapped.y, 0.0);
    }
}
