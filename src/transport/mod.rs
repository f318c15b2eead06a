//! Driver transports.
//!
//! A [`Transport`] opens one physical link and hands back its two byte
//! halves. The driver writes commands through the writer half; a dedicated
//! reader thread ([`spawn_reader`]) frames the reader half into lines and
//! posts them as events.

mod framing;
mod mock;
mod reader;
mod serial;
mod tcp;

use core::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

pub use framing::{LineFramer, MAX_LINE};
pub use mock::{MockController, MockTransport};
pub use reader::{spawn_reader, LinkEvent, ReaderEvent, ReaderHandle};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Read timeout on real links; bounds how long the reader takes to notice a stop.
pub(crate) const READ_POLL: Duration = Duration::from_millis(100);

/// An open link split into its reader and writer halves.
pub struct Link {
    /// Incoming bytes; reads time out periodically.
    pub reader: Box<dyn Read + Send>,
    /// Outgoing bytes.
    pub writer: Box<dyn Write + Send>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens a physical link.
pub trait Transport: Send + fmt::Debug {
    /// Open the link.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the port or socket.
    fn open(&mut self, timeout: Duration) -> io::Result<Link>;

    /// Human readable link description for logs.
    fn describe(&self) -> String;
}
