//! Machine layer.
//!
//! Builds a [`Machine`] from configuration, runs it on a dedicated executor
//! thread and exposes it through [`MachineHandle`].

mod builder;
mod context;
mod events;
mod executor;
#[allow(clippy::module_inception)]
mod machine;

pub use builder::MachineBuilder;
pub use context::{AbortSignal, MachineContext};
pub use events::{EventBus, ListenerId, MachineEvent};
pub use executor::{MachineExecutor, MachineHandle, MoveTicket};
pub use machine::{ActuatorValue, Machine};
