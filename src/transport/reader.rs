//! Per-link reader thread.
//!
//! The reader owns the read half of a link, frames lines and posts them to
//! the owning dispatcher's event queue. It never touches dispatcher or
//! planner state.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::error::CommunicationError;

use super::framing::LineFramer;

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A complete response line.
    Line(String),
    /// The peer closed the link.
    Closed,
    /// The link failed.
    Failed(CommunicationError),
}

/// A link event tagged with the link generation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderEvent {
    /// Incremented on every reopen; stale events are ignored.
    pub generation: u64,
    /// The event.
    pub event: LinkEvent,
}

/// Handle to a running reader thread.
#[derive(Debug)]
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Stop the reader and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Reader thread panicked");
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a reader thread.
///
/// The reader must return `TimedOut` or `WouldBlock` periodically so the
/// thread can observe the stop flag.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_reader(
    name: &str,
    generation: u64,
    mut reader: Box<dyn Read + Send>,
    events: Sender<ReaderEvent>,
) -> std::io::Result<ReaderHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let driver = name.to_string();

    let thread = thread::Builder::new()
        .name(format!("{}-reader", name))
        .spawn(move || {
            let mut framer = LineFramer::new();
            let mut buf = [0u8; 256];
            let post = |event: LinkEvent| events.send(ReaderEvent { generation, event }).is_ok();

            while !flag.load(Ordering::SeqCst) {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!(driver = %driver, "Link closed by peer");
                        post(LinkEvent::Closed);
                        break;
                    }
                    Ok(n) => {
                        for line in framer.push(&buf[..n]) {
                            trace!(driver = %driver, line = %line, "<<");
                            if !post(LinkEvent::Line(line)) {
                                return;
                            }
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) => {}
                    Err(e) => {
                        warn!(driver = %driver, error = %e, "Link read failed");
                        post(LinkEvent::Failed(e.into()));
                        break;
                    }
                }
            }
        })?;

    Ok(ReaderHandle {
        stop,
        thread: Some(thread),
    })
}
