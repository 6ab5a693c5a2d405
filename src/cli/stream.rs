//! Bounded line reading and record parsing for Claude Code stdout.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cli::StreamRecord;

/// Default number of bytes requested from the child per read.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default cap on a single unterminated line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 512 * 1024 * 1024;

/// Maximum characters of a bad line kept in a parse error.
const ERROR_SNIPPET_LEN: usize = 200;

/// Error type for stream operations.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The line is not valid JSON.
    #[error("Failed to parse JSON: {reason}")]
    ParseError { input: String, reason: String },
    /// The line is JSON but not an object.
    #[error("Record is not a JSON object: {input}")]
    NotAnObject { input: String },
    /// The object has no string `type` field.
    #[error("Record has no type discriminator: {input}")]
    MissingDiscriminator { input: String },
    /// Reading from the child failed.
    #[error("Failed to read stream: {0}")]
    Io(#[from] std::io::Error),
}

fn snippet(line: &str) -> String {
    line.chars().take(ERROR_SNIPPET_LEN).collect()
}

/// Reads complete lines from a byte source with bounded buffering.
///
/// Only the undelivered remainder after the last newline is kept between
/// reads, so memory stays within one chunk plus the longest line. Invalid
/// UTF-8 is replaced rather than rejected. A trailing fragment with no
/// terminator at end of stream is discarded.
#[derive(Debug)]
pub struct BoundedLineReader<R> {
    reader: R,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    /// Lines split off the accumulator but not yet handed out.
    ready: std::collections::VecDeque<String>,
    max_line_bytes: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin> BoundedLineReader<R> {
    /// Create a reader with the default chunk size.
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Create a reader that requests `chunk_size` bytes per read.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0; chunk_size.max(1)],
            pending: Vec::new(),
            ready: std::collections::VecDeque::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            discarding: false,
            eof: false,
        }
    }

    /// Cap the length of a single line; longer lines are dropped.
    #[must_use]
    pub fn max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line_bytes = limit.max(1);
        self
    }

    /// Bytes currently held for an unterminated line.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Read the next complete line, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.eof = true;
                if !self.pending.is_empty() {
                    tracing::warn!(
                        bytes = self.pending.len(),
                        "Discarding unterminated trailing output"
                    );
                    self.pending.clear();
                }
                continue;
            }
            self.absorb(n);
        }
    }

    /// Split the freshly read bytes into lines.
    fn absorb(&mut self, n: usize) {
        let mut rest = &self.chunk[..n];
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.pending.len() + head.len() > self.max_line_bytes {
                tracing::warn!(
                    bytes = self.pending.len() + head.len(),
                    limit = self.max_line_bytes,
                    "Dropping oversized line"
                );
                self.pending.clear();
                continue;
            }
            self.pending.extend_from_slice(head);
            self.ready
                .push_back(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
        }

        if self.discarding {
            return;
        }
        if self.pending.len() + rest.len() > self.max_line_bytes {
            tracing::warn!(
                bytes = self.pending.len() + rest.len(),
                limit = self.max_line_bytes,
                "Dropping oversized line"
            );
            self.pending.clear();
            self.discarding = true;
        } else {
            self.pending.extend_from_slice(rest);
        }
    }

    /// Turn the reader into a stream of lines.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = std::io::Result<String>> {
        futures_util::stream::unfold(self, |mut reader| async move {
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), reader)),
                Ok(None) => None,
                Err(e) => {
                    // Stop after surfacing the error once.
                    reader.eof = true;
                    reader.ready.clear();
                    Some((Err(e), reader))
                }
            }
        })
    }
}

/// Drain a byte source to the end, keeping only the last `limit` bytes.
///
/// Used for the child's standard error, which is consulted only on failure
/// but must be drained so the child never blocks on a full pipe.
pub async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading stream tail");
                break;
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// A successfully parsed stdout line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// The record as received, for history and metadata.
    pub raw: serde_json::Value,
    /// Discriminator value of the record.
    pub kind: String,
    /// Typed view of the record. `None` when a known kind has an unexpected
    /// shape.
    pub record: Option<StreamRecord>,
}

/// Parser for stream-json lines.
pub struct StreamParser;

impl StreamParser {
    /// Parse a single line of stream-json output.
    ///
    /// # Errors
    ///
    /// Returns a `StreamError` if the line is not JSON, not an object, or has
    /// no `type` field.
    pub fn parse_line(line: &str) -> Result<ParsedLine, StreamError> {
        let raw: serde_json::Value =
            serde_json::from_str(line).map_err(|e| StreamError::ParseError {
                input: snippet(line),
                reason: e.to_string(),
            })?;

        let Some(object) = raw.as_object() else {
            return Err(StreamError::NotAnObject {
                input: snippet(line),
            });
        };
        let Some(kind) = object.get("type").and_then(serde_json::Value::as_str) else {
            return Err(StreamError::MissingDiscriminator {
                input: snippet(line),
            });
        };
        let kind = kind.to_string();

        let record = match serde_json::from_value::<StreamRecord>(raw.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(kind = %kind, error = %e, "Record does not match known shape");
                None
            }
        };

        Ok(ParsedLine { raw, kind, record })
    }
}
