//! Connection-local line framer.
//!
//! Bytes are appended as they arrive; complete `\n`-terminated lines are
//! drained one at a time. Whatever remains without a terminator is bounded by
//! `max_pending`, and exceeding it is fatal for the connection.

/// Framing failure that must terminate the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Unterminated frame exceeds {limit} bytes (buffered {buffered})")]
    Overflow { limit: usize, buffered: usize },
}

/// Accumulates inbound bytes and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_pending: usize,
}

impl LineBuffer {
    pub const fn new(max_pending: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_pending,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next non-blank line, without its terminator.
    ///
    /// A trailing `\r` is stripped. Bytes are returned as received; UTF-8
    /// validation belongs to [`parse_frame`](super::parse_frame), which
    /// rejects a non-UTF-8 line as a protocol error.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(line);
        }
    }

    /// Check the unframed remainder against the cap.
    ///
    /// Call after draining every complete line.
    pub fn check_pending(&self) -> Result<(), FrameError> {
        if self.buf.len() > self.max_pending {
            return Err(FrameError::Overflow {
                limit: self.max_pending,
                buffered: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Bytes currently buffered without a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
