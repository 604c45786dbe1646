//! Event Parsing
//!
//! Each complete line from the answer stream is either an event
//! (`data: ` followed by a JSON object) or noise. An event object carries
//! exactly one meaningful field, checked in this order:
//!
//! 1. `error` - the service failed; terminal
//! 2. `done: true` - the answer is complete; terminal
//! 3. `chunk` - the next fragment of answer text
//!
//! Lines without the prefix, malformed JSON and objects with none of the
//! fields above are skipped without failing the stream.

use serde::Deserialize;
use serde_json::Value;

/// Prefix marking an event line
pub const EVENT_PREFIX: &str = "data: ";

/// A decoded stream event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next fragment of answer text (never empty)
    Chunk(String),
    /// The answer is complete
    Done,
    /// The service reported a failure
    Error(String),
}

impl StreamEvent {
    /// Whether no further events may follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    done: Option<Value>,
    #[serde(default)]
    chunk: Option<Value>,
}

impl EventPayload {
    fn classify(self) -> Option<StreamEvent> {
        if let Some(description) = self.error.and_then(error_text) {
            return Some(StreamEvent::Error(description));
        }
        if self.done == Some(Value::Bool(true)) {
            return Some(StreamEvent::Done);
        }
        match self.chunk {
            Some(Value::String(text)) if !text.is_empty() => Some(StreamEvent::Chunk(text)),
            _ => None,
        }
    }
}

/// Readable text for an `error` field; empty and null values do not count
fn error_text(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Classify one complete line
///
/// Returns `None` for anything that is not a recognised event.
pub fn parse_event_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(EVENT_PREFIX)?;

    match serde_json::from_str::<EventPayload>(payload) {
        Ok(payload) => payload.classify(),
        Err(e) => {
            tracing::warn!(error = %e, len = line.len(), "Skipping malformed stream event");
            None
        }
    }
}

/// Stateful parser that stops at the first terminal event
///
/// After `Done` or `Error` every later line is ignored, so a stream yields at
/// most one terminal event.
#[derive(Debug, Default)]
pub struct EventParser {
    terminated: bool,
}

impl EventParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the next line
    pub fn push_line(&mut self, line: &str) -> Option<StreamEvent> {
        if self.terminated {
            tracing::trace!("Ignoring line after terminal event");
            return None;
        }

        let event = parse_event_line(line)?;
        if event.is_terminal() {
            self.terminated = true;
        }
        Some(event)
    }

    /// Whether a terminal event has been seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
