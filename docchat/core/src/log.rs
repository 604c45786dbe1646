//! Conversation Log
//!
//! Ordered record of the exchanges in one chat session. The log is the single
//! source of truth a surface renders from.
//!
//! # Design Philosophy
//!
//! Records are appended and never reordered. Only the record that is still
//! streaming can change, and only through methods that keep its text growing
//! monotonically. Callers address a record through a [`RecordHandle`] that
//! pairs the record id with the log generation; [`ConversationLog::clear`]
//! bumps the generation, so updates from a stream that outlived the clear
//! find nothing to touch.

use serde::{Deserialize, Serialize};

use crate::messages::{MessageId, MessageKind};

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    id: MessageId,
    kind: MessageKind,
    text: String,
    attachment_name: Option<String>,
    sources: Vec<String>,
    context_label: Option<String>,
    streaming: bool,
    timestamp: u64,
}

impl ConversationMessage {
    fn new(kind: MessageKind, text: String) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            text,
            attachment_name: None,
            sources: Vec::new(),
            context_label: None,
            streaming: false,
            timestamp: now_ms(),
        }
    }

    /// Create a user query record
    pub fn user(text: impl Into<String>, attachment_name: Option<String>) -> Self {
        let mut msg = Self::new(MessageKind::User, text.into());
        msg.attachment_name = attachment_name;
        msg
    }

    /// Create a complete assistant record (atomic path)
    ///
    /// Sources are deduplicated, keeping the first occurrence of each name.
    pub fn assistant<I, S>(
        text: impl Into<String>,
        sources: I,
        context_label: Option<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut msg = Self::new(MessageKind::Assistant, text.into());
        for source in sources {
            msg.add_source(source.into());
        }
        msg.context_label = context_label;
        msg
    }

    /// Create an empty streaming assistant record (content will be appended)
    pub fn placeholder() -> Self {
        let mut msg = Self::new(MessageKind::Assistant, String::new());
        msg.streaming = true;
        msg
    }

    /// Create an error record
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, text.into())
    }

    /// Append a fragment. Ignored once the record is no longer streaming.
    pub fn append(&mut self, fragment: &str) -> bool {
        if !self.streaming {
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    /// Mark streaming as complete. The text is frozen afterwards.
    pub fn complete(&mut self) {
        self.streaming = false;
    }

    fn add_source(&mut self, name: String) {
        if !name.is_empty() && !self.sources.contains(&name) {
            self.sources.push(name);
        }
    }

    /// Unique record id
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Record kind
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Accumulated display text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the file attached to a user query
    pub fn attachment_name(&self) -> Option<&str> {
        self.attachment_name.as_deref()
    }

    /// Distinct source document names, in first-seen order
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Document used to ground an atomic answer
    pub fn context_label(&self) -> Option<&str> {
        self.context_label.as_deref()
    }

    /// Whether the record may still receive fragments
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Creation time (Unix timestamp ms)
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Stable reference to one record in a [`ConversationLog`]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    generation: u64,
    id: MessageId,
}

impl RecordHandle {
    /// Id of the referenced record
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Log generation the handle was issued in
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Ordered, append-only conversation history
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    records: Vec<ConversationMessage>,
    generation: u64,
}

impl ConversationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its handle
    ///
    /// Appending a streaming record while another one is still streaming
    /// freezes the older one first.
    pub fn append(&mut self, record: ConversationMessage) -> RecordHandle {
        if record.streaming {
            if let Some(previous) = self.records.iter_mut().find(|m| m.streaming) {
                tracing::warn!(
                    message_id = %previous.id,
                    "Freezing streaming record superseded by a new placeholder"
                );
                previous.complete();
            }
        }

        let handle = RecordHandle {
            generation: self.generation,
            id: record.id.clone(),
        };
        self.records.push(record);
        handle
    }

    /// Apply `transform` to the most recent record if it is still streaming
    ///
    /// Returns `false` (and does nothing) when the log is empty or the last
    /// record has already terminated.
    pub fn mutate_last<F>(&mut self, transform: F) -> bool
    where
        F: FnOnce(&mut ConversationMessage),
    {
        match self.records.last_mut() {
            Some(last) if last.streaming => {
                transform(last);
                true
            }
            _ => false,
        }
    }

    /// Apply `transform` to the record named by `handle` if it is still streaming
    ///
    /// A handle from an earlier generation, or one whose record is gone or
    /// frozen, is a no-op.
    pub fn mutate<F>(&mut self, handle: &RecordHandle, transform: F) -> bool
    where
        F: FnOnce(&mut ConversationMessage),
    {
        match self.streaming_record_mut(handle) {
            Some(record) => {
                transform(record);
                true
            }
            None => false,
        }
    }

    /// Append a fragment to the streaming record named by `handle`
    pub fn append_text(&mut self, handle: &RecordHandle, fragment: &str) -> bool {
        self.streaming_record_mut(handle)
            .is_some_and(|record| record.append(fragment))
    }

    /// Freeze the streaming record named by `handle`
    pub fn finish(&mut self, handle: &RecordHandle) -> Option<&ConversationMessage> {
        let record = self.streaming_record_mut(handle)?;
        record.complete();
        Some(record)
    }

    /// Replace the streaming record named by `handle` in place
    pub fn replace(&mut self, handle: &RecordHandle, replacement: ConversationMessage) -> bool {
        match self.streaming_record_mut(handle) {
            Some(record) => {
                *record = replacement;
                true
            }
            None => false,
        }
    }

    /// Empty the log, invalidating every outstanding handle
    pub fn clear(&mut self) {
        self.records.clear();
        self.generation += 1;
        tracing::debug!(generation = self.generation, "Conversation log cleared");
    }

    /// Look up the record named by `handle`
    pub fn get(&self, handle: &RecordHandle) -> Option<&ConversationMessage> {
        if handle.generation != self.generation {
            return None;
        }
        self.records.iter().rev().find(|m| m.id == handle.id)
    }

    /// Handle of the record that is currently streaming
    pub fn streaming_handle(&self) -> Option<RecordHandle> {
        self.records
            .iter()
            .rev()
            .find(|m| m.streaming)
            .map(|m| RecordHandle {
                generation: self.generation,
                id: m.id.clone(),
            })
    }

    /// All records in append order
    pub fn records(&self) -> &[ConversationMessage] {
        &self.records
    }

    /// Most recent record
    pub fn last(&self) -> Option<&ConversationMessage> {
        self.records.last()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current generation (incremented by every clear)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn streaming_record_mut(&mut self, handle: &RecordHandle) -> Option<&mut ConversationMessage> {
        if handle.generation != self.generation {
            return None;
        }
        self.records
            .iter_mut()
            .rev()
            .find(|m| m.id == handle.id)
            .filter(|m| m.streaming)
    }
}

/// Get current timestamp in milliseconds
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
