//! Line framing for the pipeline's `text/event-stream` body.
//!
//! Bytes are buffered until a newline arrives, so records split across
//! transport chunks (including multi-byte characters) decode the same way
//! regardless of where the chunk boundaries fall.

use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{trace, warn};

use crate::error::TestPilotResult;
use crate::models::PipelineEvent;

pub const DEFAULT_EVENT_PREFIX: &str = "data:";

enum Line {
    Event(PipelineEvent),
    Skipped,
    Malformed,
}

/// Incremental decoder from raw bytes to [`PipelineEvent`]s.
#[derive(Debug)]
pub struct EventDecoder {
    prefix: String,
    buffer: Vec<u8>,
    malformed: u64,
}

impl EventDecoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            buffer: Vec::new(),
            malformed: 0,
        }
    }

    /// Feeds one chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<PipelineEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut malformed = 0;
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            match decode_line(&self.prefix, &self.buffer[consumed..end]) {
                Line::Event(event) => events.push(event),
                Line::Malformed => malformed += 1,
                Line::Skipped => {}
            }
            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        self.malformed += malformed;
        events
    }

    /// Decodes whatever is left once the transport reports end-of-data.
    pub fn finish(&mut self) -> Option<PipelineEvent> {
        if self.buffer.is_empty() {
            return None;
        }

        let rest = std::mem::take(&mut self.buffer);
        match decode_line(&self.prefix, &rest) {
            Line::Event(event) => Some(event),
            Line::Malformed => {
                self.malformed += 1;
                None
            }
            Line::Skipped => None,
        }
    }

    /// Number of candidate lines dropped because they failed to parse.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_PREFIX)
    }
}

fn decode_line(prefix: &str, raw: &[u8]) -> Line {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

    let Ok(line) = std::str::from_utf8(raw) else {
        warn!(len = raw.len(), "Dropping event line with invalid UTF-8");
        return Line::Malformed;
    };

    let Some(payload) = line.strip_prefix(prefix) else {
        if !line.is_empty() {
            trace!(line, "Skipping non-data line");
        }
        return Line::Skipped;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim().is_empty() {
        return Line::Skipped;
    }

    match serde_json::from_str::<PipelineEvent>(payload) {
        Ok(event) => Line::Event(event),
        Err(e) => {
            warn!(error = %e, payload, "Dropping malformed event line");
            Line::Malformed
        }
    }
}

struct DecodeState {
    source: BoxStream<'static, TestPilotResult<Bytes>>,
    decoder: EventDecoder,
    pending: VecDeque<PipelineEvent>,
    finished: bool,
}

/// Adapts a chunked byte stream into a stream of decoded events.
///
/// A transport error is yielded once and ends the stream. Dropping the
/// returned stream discards any partially buffered line.
pub fn decode_stream<S>(
    source: S,
    prefix: impl Into<String>,
) -> BoxStream<'static, TestPilotResult<PipelineEvent>>
where
    S: Stream<Item = TestPilotResult<Bytes>> + Send + 'static,
{
    let state = DecodeState {
        source: source.boxed(),
        decoder: EventDecoder::new(prefix),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
