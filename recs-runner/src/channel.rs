//! Line-oriented transport for protocol messages

use crate::error::ProtocolFault;
use crate::protocol::{decode_line, encode_message, Inbound, Outbound};
use std::io::{BufRead, ErrorKind, Write};
use tracing::{debug, warn};

/// Reads inbound messages, one per line.
pub struct LineReader<R> {
    inner: R,
    line: String,
    lines_read: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Wrap a buffered reader
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            lines_read: 0,
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` at end of input. A read failure means the peer is
    /// gone and is reported the same way. Whitespace-only lines are skipped.
    pub fn next_message(&mut self) -> Result<Option<Inbound>, ProtocolFault> {
        loop {
            self.line.clear();
            match self.inner.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::InvalidData => {
                    self.lines_read += 1;
                    return Err(ProtocolFault::Malformed {
                        line: self.lines_read,
                        reason: "line is not valid UTF-8".to_string(),
                    });
                }
                Err(err) => {
                    debug!(error = %err, "inbound stream failed; treating as end of input");
                    return Ok(None);
                }
            }

            self.lines_read += 1;
            if self.line.trim().is_empty() {
                continue;
            }

            return decode_line(&self.line)
                .map(Some)
                .map_err(|reason| ProtocolFault::Malformed {
                    line: self.lines_read,
                    reason,
                });
        }
    }

    /// Number of lines consumed so far, including skipped blank lines
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

/// Writes outbound messages, one per line, flushing after each.
///
/// A failed write closes the writer for good: later sends return `false`
/// without touching the stream.
pub struct LineWriter<W> {
    inner: W,
    closed: bool,
    messages_written: usize,
}

impl<W: Write> LineWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
            messages_written: 0,
        }
    }

    /// Send one message. Returns `false` when the peer can no longer be
    /// reached; the caller should stop quietly.
    pub fn send(&mut self, message: &Outbound) -> bool {
        if self.closed {
            return false;
        }

        let mut line = match encode_message(message) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode outbound message");
                self.closed = true;
                return false;
            }
        };
        line.push(b'\n');

        let result = self
            .inner
            .write_all(&line)
            .and_then(|()| self.inner.flush());

        match result {
            Ok(()) => {
                self.messages_written += 1;
                true
            }
            Err(err) => {
                if err.kind() == ErrorKind::BrokenPipe {
                    debug!("peer closed its read side");
                } else {
                    warn!(error = %err, "outbound stream failed");
                }
                self.closed = true;
                false
            }
        }
    }

    /// Whether a previous send failed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of messages successfully written
    pub fn messages_written(&self) -> usize {
        self.messages_written
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}
