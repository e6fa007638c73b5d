//! Newline framing for the text protocol.
//!
//! Bytes arrive in arbitrary chunks; [`LineFramer`] buffers them and hands
//! back every complete line. A partial trailing line stays buffered until the
//! rest of it arrives.

use derive_more::{Display, Error};
use tracing::{instrument, trace};

/// Default maximum length of a single line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// A line exceeded the configured maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Line exceeds {} bytes", limit)]
pub struct LineTooLong {
    /// The configured limit.
    pub limit: usize,
}

/// Accumulates inbound bytes and splits them into lines.
#[derive(Debug, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    /// Creates a framer that rejects lines longer than `max_line_length`.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_length,
        }
    }

    /// Appends `bytes` and returns every line completed by them.
    ///
    /// Lines are returned without their `\n`. Invalid UTF-8 is replaced
    /// rather than rejected; the command decoder will refuse the keyword.
    #[instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            if end > self.max_line_length {
                return Err(LineTooLong {
                    limit: self.max_line_length,
                });
            }
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&raw[..end]).into_owned());
        }

        if self.buffer.len() > self.max_line_length {
            return Err(LineTooLong {
                limit: self.max_line_length,
            });
        }

        trace!(lines = lines.len(), buffered = self.buffer.len(), "Framed input");
        Ok(lines)
    }

    /// Number of bytes waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_multiple_lines_in_one_chunk() {
        let mut framer = LineFramer::default();
        let lines = framer.push(b"CONNECT Alice\nQUERY\n").unwrap();
        assert_eq!(lines, vec!["CONNECT Alice", "QUERY"]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_keeps_partial_line_until_completed() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"SET_ATT").unwrap().is_empty());
        assert_eq!(framer.buffered(), 7);

        let lines = framer.push(b"ACK_STAT 5\nST").unwrap();
        assert_eq!(lines, vec!["SET_ATTACK_STAT 5"]);
        assert_eq!(framer.buffered(), 2);
    }

    #[test]
    fn test_rejects_overlong_line() {
        let mut framer = LineFramer::new(8);
        assert_eq!(
            framer.push(b"0123456789"),
            Err(LineTooLong { limit: 8 })
        );

        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"0123456789\n").is_err());
    }
}
