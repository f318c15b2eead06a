//! Command encoding for pnp-motion.
//!
//! Provides command classes, the placeholder template language, the JSON
//! parameter protocol and response matching.

mod class;
mod encoder;
pub mod json;
mod protocol;
mod response;
mod template;

pub use class::CommandClass;
pub use encoder::{Command, CommandEncoder};
pub use protocol::{GcodeProtocol, JsonParameterProtocol, Protocol};
pub use response::{numeric_captures, Captures, Confirmation, LineMatch, ResponseMatcher};
pub use template::{Template, Value, Variables};
