//! In-memory controller for tests and dry runs.
//!
//! [`MockController`] scripts replies by regex over the lines the driver
//! writes. Each scripted reply may be delayed; replies are delivered in
//! order from a responder thread, like a controller working through its
//! input buffer.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{trace, warn};

use super::{Link, Transport};

const MOCK_POLL: Duration = Duration::from_millis(20);

type Replies = Vec<(Duration, String)>;

#[derive(Debug)]
struct Rule {
    pattern: Regex,
    replies: Replies,
}

#[derive(Debug)]
struct MockLink {
    feed: Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    default_reply: Option<String>,
    written: Vec<String>,
    open_failures: u32,
    opens: u32,
    link: Option<MockLink>,
}

impl MockState {
    fn replies_for(&self, line: &str) -> Replies {
        // Latest rule wins.
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(line))
            .map(|rule| rule.replies.clone())
            .or_else(|| {
                self.default_reply
                    .as_ref()
                    .map(|reply| vec![(Duration::ZERO, reply.clone())])
            })
            .unwrap_or_default()
    }
}

/// Scripted controller shared between a test and its [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Create a controller that answers nothing until scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted line with `ok`.
    pub fn reply_ok(self) -> Self {
        self.state.lock().default_reply = Some("ok".to_string());
        self
    }

    /// Answer lines matching `pattern` with `replies`, immediately.
    pub fn on(&self, pattern: &str, replies: &[&str]) -> &Self {
        self.on_delayed(pattern, Duration::ZERO, replies)
    }

    /// Answer lines matching `pattern` with `replies` after `delay`.
    pub fn on_delayed(&self, pattern: &str, delay: Duration, replies: &[&str]) -> &Self {
        let mut replies: Replies = replies.iter().map(|r| (Duration::ZERO, r.to_string())).collect();
        if let Some(first) = replies.first_mut() {
            first.0 = delay;
        }
        self.push_rule(pattern, replies);
        self
    }

    /// Never answer lines matching `pattern`.
    pub fn silence(&self, pattern: &str) -> &Self {
        self.push_rule(pattern, Vec::new());
        self
    }

    fn push_rule(&self, pattern: &str, replies: Replies) {
        match Regex::new(pattern) {
            Ok(pattern) => self.state.lock().rules.push(Rule { pattern, replies }),
            Err(e) => warn!(%pattern, error = %e, "Ignoring invalid mock pattern"),
        }
    }

    /// Refuse the next `count` open attempts.
    pub fn fail_opens(&self, count: u32) -> &Self {
        self.state.lock().open_failures = count;
        self
    }

    /// Lines written by the driver so far.
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// Successful and refused open attempts so far.
    pub fn opens(&self) -> u32 {
        self.state.lock().opens
    }

    /// Send an unsolicited line to the driver.
    pub fn push_line(&self, line: &str) {
        if let Some(link) = &self.state.lock().link {
            let _ = link.feed.send(format!("{}\n", line).into_bytes());
        }
    }

    /// Drop the current link as if the cable were pulled.
    pub fn disconnect(&self) {
        if let Some(link) = self.state.lock().link.take() {
            link.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Transport that opens links to this controller.
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            controller: self.clone(),
        }
    }
}

/// [`Transport`] backed by a [`MockController`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    controller: MockController,
}

impl Transport for MockTransport {
    fn open(&mut self, _timeout: Duration) -> io::Result<Link> {
        let mut state = self.controller.state.lock();
        state.opens += 1;
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock controller refused the link",
            ));
        }

        if let Some(old) = state.link.take() {
            old.closed.store(true, Ordering::SeqCst);
        }

        let closed = Arc::new(AtomicBool::new(false));
        let (feed, incoming) = mpsc::channel();
        let (jobs, queued) = mpsc::channel::<Replies>();

        let responder_feed = feed.clone();
        let responder_closed = Arc::clone(&closed);
        thread::Builder::new()
            .name("mock-controller".to_string())
            .spawn(move || {
                while let Ok(replies) = queued.recv() {
                    for (delay, reply) in replies {
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                        if responder_closed.load(Ordering::SeqCst) {
                            return;
                        }
                        trace!(%reply, "Mock reply");
                        if responder_feed.send(format!("{}\n", reply).into_bytes()).is_err() {
                            return;
                        }
                    }
                }
            })?;

        state.link = Some(MockLink {
            feed,
            closed: Arc::clone(&closed),
        });

        Ok(Link {
            reader: Box::new(MockReader {
                incoming,
                pending: Vec::new(),
                closed: Arc::clone(&closed),
            }),
            writer: Box::new(MockWriter {
                controller: self.controller.clone(),
                jobs,
                partial: Vec::new(),
                closed,
            }),
        })
    }

    fn describe(&self) -> String {
        "mock://controller".to_string()
    }
}

struct MockReader {
    incoming: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.incoming.recv_timeout(MOCK_POLL) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct MockWriter {
    controller: MockController,
    jobs: Sender<Replies>,
    partial: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl MockWriter {
    fn handle_line(&self, line: String) {
        let replies = {
            let mut state = self.controller.state.lock();
            let replies = state.replies_for(&line);
            state.written.push(line);
            replies
        };
        if !replies.is_empty() {
            let _ = self.jobs.send(replies);
        }
    }
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link closed"));
        }
        for &b in buf {
            if b == b'\n' || b == b'\r' {
                if !self.partial.is_empty() {
                    let line = String::from_utf8_lossy(&self.partial).into_owned();
                    self.partial.clear();
                    self.handle_line(line);
                }
            } else {
                self.partial.push(b);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_line(link: &mut Link) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match link.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&buf[..n]);
                    if out.ends_with(b"\n") {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => panic!("read failed: {}", e),
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_scripted_replies() {
        let mock = MockController::new().reply_ok();
        mock.on("^M114", &["X:1.000 Y:2.000", "ok"]);
        let mut link = mock.transport().open(Duration::from_secs(1)).unwrap();

        link.writer.write_all(b"M114\n").unwrap();
        assert_eq!(read_line(&mut link), "X:1.000 Y:2.000\n");
        assert_eq!(read_line(&mut link), "ok\n");

        link.writer.write_all(b"G1 X1\r\n").unwrap();
        assert_eq!(read_line(&mut link), "ok\n");
        assert_eq!(mock.written(), vec!["M114", "G1 X1"]);
    }

    #[test]
    fn test_refused_opens_and_disconnect() {
        let mock = MockController::new();
        mock.fail_opens(1);
        let mut transport = mock.transport();
        assert!(transport.open(Duration::from_secs(1)).is_err());

        let mut link = transport.open(Duration::from_secs(1)).unwrap();
        assert_eq!(mock.opens(), 2);

        mock.disconnect();
        let mut buf = [0u8; 8];
        assert_eq!(link.reader.read(&mut buf).unwrap(), 0);
        assert!(link.writer.write_all(b"G1\n").is_err());
    }
}
