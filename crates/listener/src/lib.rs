//! Inbound event source infrastructure.
//!
//! Implements the [`events::EventSource`] trait over newline-delimited JSON:
//! each non-blank line is one normalized [`events::ChangeEvent`], as produced
//! by the upstream webhook dispatcher. The binary reads stdin, so the
//! dispatcher can simply pipe into it.
//!
//! ```text
//! {"subject":"T-1","actor":"alice","summary":"Fix login","transition":{"kind":"status_changed","from":"Open","to":"Done"},"recipients":["+1555"]}
//! ```
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Framing and decoding live here. The engine never sees
//! raw input.

use async_trait::async_trait;
use events::{ChangeEvent, EventSource, EventSourceError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::trace;

/// Reads one [`ChangeEvent`] per line from an async reader.
pub struct JsonLinesEventSource<R> {
    lines: Lines<R>,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin> JsonLinesEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl JsonLinesEventSource<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Reads events from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesEventSource<R> {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, EventSourceError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| EventSourceError::Read {
                    message: e.to_string(),
                })?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return match serde_json::from_str::<ChangeEvent>(trimmed) {
                Ok(event) => {
                    trace!(line = self.line_number, subject = %event.subject, "event decoded");
                    Ok(Some(event))
                }
                Err(e) => Err(EventSourceError::Malformed {
                    line: self.line_number,
                    message: e.to_string(),
                }),
            };
        }
    }
}
