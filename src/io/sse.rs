//! Server-sent event stream decoding
//!
//! Framing:
//! - `field: value` lines, split on the first `:`, field and value trimmed
//! - Fields: `event` (type), `data` (repeatable, newline-joined), `id`, `retry` (base-10 integer)
//! - A blank line terminates an event; lines without a `:` and unknown fields are ignored
//! - Lines end with `\n`, a trailing `\r` is stripped

use futures_util::stream::{self, Stream};
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest accepted line, excluding the line terminator
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// One logical event, terminated by a blank line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub id: String,
    pub event_type: String,
    pub data: String,
    /// Reconnect hint in milliseconds, 0 when unset
    pub retry: i64,
}

impl SseEvent {
    /// True when no field carries a value. `retry` only counts when positive,
    /// so a block holding just `retry: 0` is empty.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.event_type.is_empty() && self.data.is_empty() && self.retry <= 0
    }

    pub fn retry_hint(&self) -> Option<Duration> {
        u64::try_from(self.retry).ok().filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event stream read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid retry value {value:?}: {source}")]
    InvalidRetry { value: String, source: ParseIntError },
    #[error("event stream line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
}

/// Incremental decoder bound to a single stream
pub struct SseDecoder<R> {
    reader: R,
    line: Vec<u8>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> SseDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::with_capacity(256), finished: false }
    }

    /// Decode the next event.
    ///
    /// Returns `Ok(None)` at end of stream. Any error terminates decoding;
    /// later calls return `Ok(None)`.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        match self.decode().await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    async fn decode(&mut self) -> Result<Option<SseEvent>, DecodeError> {
        let mut event = SseEvent::default();

        while let Some(line) = self.read_line().await? {
            if line.is_empty() {
                if !event.is_empty() {
                    return Ok(Some(event));
                }
                // Blank line run between events
                continue;
            }
            apply_line(&mut event, &line)?;
        }

        // Stream may end without a trailing blank line
        if event.is_empty() {
            Ok(None)
        } else {
            Ok(Some(event))
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>, DecodeError> {
        self.line.clear();

        // Room for the longest line plus "\r\n"
        let limit = (MAX_LINE_LEN + 2) as u64;
        let n = (&mut self.reader).take(limit).read_until(b'\n', &mut self.line).await?;
        if n == 0 {
            return Ok(None);
        }

        let terminated = self.line.last() == Some(&b'\n');
        if terminated {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        } else if n as u64 == limit {
            return Err(DecodeError::LineTooLong);
        }

        if self.line.len() > MAX_LINE_LEN {
            return Err(DecodeError::LineTooLong);
        }

        Ok(Some(String::from_utf8_lossy(&self.line).into_owned()))
    }

    /// Decode every remaining event, failing on the first error
    pub async fn collect_all(mut self) -> Result<Vec<SseEvent>, DecodeError> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await? {
            events.push(event);
        }
        Ok(events)
    }

    /// Lazy event stream; ends after end-of-stream or the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<SseEvent, DecodeError>> {
        stream::try_unfold(self, |mut decoder| async move {
            let next = decoder.next_event().await?;
            Ok::<_, DecodeError>(next.map(|event| (event, decoder)))
        })
    }
}

/// Apply one non-blank line to the pending event
fn apply_line(event: &mut SseEvent, line: &str) -> Result<(), DecodeError> {
    let Some((field, value)) = line.split_once(':') else {
        return Ok(());
    };
    let value = value.trim();

    match field.trim() {
        "event" => event.event_type = value.to_string(),
        "data" => {
            if !event.data.is_empty() {
                event.data.push('\n');
            }
            event.data.push_str(value);
        }
        "id" => event.id = value.to_string(),
        "retry" => {
            event.retry = value.parse().map_err(|source| DecodeError::InvalidRetry {
                value: value.to_string(),
                source,
            })?;
        }
        _ => {}
    }

    Ok(())
}
