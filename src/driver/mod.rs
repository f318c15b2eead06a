//! Controller drivers.
//!
//! One [`Dispatcher`] per configured driver owns the link, the flow-control
//! window and the connection state machine.

mod dispatcher;
mod pending;
pub mod registry;
mod state;

pub use dispatcher::{Completion, Confirmed, Dispatcher};
pub use pending::{CommandId, PendingCommand, PendingState};
pub use state::ConnectionState;
