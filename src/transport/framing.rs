//! Line framing for incoming bytes.

use heapless::Vec as LineBuf;
use tracing::warn;

/// Longest response line kept intact; longer lines are split.
pub const MAX_LINE: usize = 1024;

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// Empty lines are dropped, so `\r\n` terminators yield one line.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: LineBuf<u8, MAX_LINE>,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect completed lines.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                b'\n' | b'\r' => self.flush_into(&mut lines),
                _ => {
                    if self.buf.push(b).is_err() {
                        warn!(max = MAX_LINE, "Response line too long, splitting");
                        self.flush_into(&mut lines);
                        // The buffer was just emptied.
                        let _ = self.buf.push(b);
                    }
                }
            }
        }
        lines
    }

    /// Bytes of an unterminated line still buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if !self.buf.is_empty() {
            lines.push(String::from_utf8_lossy(&self.buf).into_owned());
            self.buf.clear();
        }
    }
}
