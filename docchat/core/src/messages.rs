//! Dispatcher Notices
//!
//! Messages sent from the [`Dispatcher`](crate::dispatcher::Dispatcher) to a UI
//! surface. The conversation log is the source of truth; notices tell a surface
//! what changed so it can redraw without diffing the whole log.
//!
//! # Design Philosophy
//!
//! Surfaces are pure renderers. A terminal client, a web view, or a test
//! harness all consume the same notice stream and never touch the log
//! directly.

use serde::{Deserialize, Serialize};

use crate::log::{ConversationMessage, RecordHandle};

/// Messages from the Dispatcher to a UI surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChatNotice {
    // ============================================
    // Conversation Messages
    // ============================================
    /// A record was appended to the log
    RecordAppended {
        /// Handle naming the new record
        handle: RecordHandle,
        /// Snapshot of the record at append time
        record: ConversationMessage,
    },

    /// A fragment was appended to the streaming record
    Chunk {
        /// Record receiving the fragment
        message_id: MessageId,
        /// The fragment text
        text: String,
    },

    /// The streaming record reached terminal success
    StreamEnd {
        /// Record that completed
        message_id: MessageId,
        /// Final accumulated text
        final_content: String,
        /// Timing and size of the exchange
        metadata: ResponseMetadata,
    },

    /// A record was replaced in place (streaming placeholder turned error)
    RecordReplaced {
        /// Identity of the record that was replaced
        message_id: MessageId,
        /// The replacement record
        record: ConversationMessage,
    },

    /// The log was emptied
    Cleared,

    // ============================================
    // System Messages
    // ============================================
    /// Dispatcher state change
    State {
        /// The new state
        state: DispatcherState,
    },

    /// The answer service rejected the credential; the auth layer should
    /// discard it and re-authenticate
    SessionInvalidated,
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a record represents. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// User query
    User,
    /// Answer from the document service
    Assistant,
    /// Failure surfaced to the user
    Error,
}

/// Dispatcher operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatcherState {
    /// Ready for input
    Ready,
    /// Waiting on an atomic upload-and-query response
    Thinking,
    /// Streaming an answer into the placeholder record
    Responding,
}

impl DispatcherState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Thinking => "Reading document...",
            Self::Responding => "Responding...",
        }
    }
}

/// Timing and size details for a completed streamed answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Time from request send to terminal event, in milliseconds
    pub elapsed_ms: u64,
    /// Number of chunk events applied
    pub chunk_count: u32,
    /// Bytes of answer text received
    pub bytes_received: u64,
    /// Chunks per second (if calculable)
    pub chunks_per_second: Option<f32>,
}

impl ResponseMetadata {
    /// Create metadata with timing info
    #[must_use]
    pub fn with_timing(elapsed_ms: u64, chunk_count: u32, bytes_received: u64) -> Self {
        let chunks_per_second = if elapsed_ms > 0 {
            Some((chunk_count as f32 / elapsed_ms as f32) * 1000.0)
        } else {
            None
        };

        Self {
            elapsed_ms,
            chunk_count,
            bytes_received,
            chunks_per_second,
        }
    }
}
