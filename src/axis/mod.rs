//! Axis and coordinate model.
//!
//! Resolves logical axis roles to controller channels, flattening transform
//! chains into one affine mapping so planning always happens in logical
//! coordinates.

mod location;
mod map;
mod position;
mod transform;

pub use location::{AxisRole, Location};
pub use map::{AxisMap, Kinematics, ResolvedAxis};
pub use position::Position;
pub use transform::Affine;
