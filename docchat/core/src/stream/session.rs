//! Streaming Session Controller
//!
//! Drives one streaming request from send to a terminal state:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Terminated(Success | Error)
//!            |                        ^
//!            +------------------------+  (rejected request)
//! ```
//!
//! Every run ends in exactly one terminal callback on the [`StreamSink`].
//! [`StreamingSession::run`] consumes the session, so a finished session
//! cannot be restarted or terminated twice.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::decoder::{LineDecoder, LineStream};
use super::event::{EventParser, StreamEvent};
use crate::backend::{AnswerBackend, ServiceError};
use crate::config::DEFAULT_MAX_LINE_BYTES;
use crate::context::SessionContext;

/// Description used when a session is cancelled from outside
pub const CANCELLED_DESCRIPTION: &str = "cancelled";

/// Controller state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Not started
    Idle,
    /// Request sent, waiting for the service to accept it
    Sending,
    /// Receiving events
    Streaming,
    /// Finished; no further transitions
    Terminated(Termination),
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Done event or clean end of stream
    Success,
    /// Any failure
    Error(StreamFailure),
}

/// Where a failure came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-success status before any data
    Rejected,
    /// The credential was refused
    Unauthorized,
    /// Connection or body read failed
    Transport,
    /// The service sent an error event
    Service,
    /// Cancelled through the session's token
    Cancelled,
}

/// A terminal failure with its human-readable description
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFailure {
    /// Failure origin
    pub kind: FailureKind,
    /// Text shown to the user
    pub description: String,
}

impl StreamFailure {
    /// Create a failure
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Failure for an external cancellation
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, CANCELLED_DESCRIPTION)
    }
}

impl From<ServiceError> for StreamFailure {
    fn from(e: ServiceError) -> Self {
        let kind = match &e {
            ServiceError::Status { .. } => FailureKind::Rejected,
            ServiceError::Unauthorized { .. } => FailureKind::Unauthorized,
            ServiceError::Transport(_) | ServiceError::Decode(_) => FailureKind::Transport,
        };
        Self::new(kind, e.to_string())
    }
}

impl std::fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

/// Receives the events of one session, in order
#[async_trait]
pub trait StreamSink: Send {
    /// A fragment of answer text
    async fn on_chunk(&mut self, fragment: String);

    /// The answer completed
    async fn on_success(&mut self, stats: StreamStats);

    /// The session failed
    async fn on_error(&mut self, failure: StreamFailure);
}

/// Session event forwarded over a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamUpdate {
    /// A fragment of answer text
    Chunk(String),
    /// The answer completed
    Done(StreamStats),
    /// The session failed
    Failed(StreamFailure),
}

impl StreamUpdate {
    /// Whether this is the last update of its session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

/// Sink that forwards every callback as a [`StreamUpdate`]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamUpdate>,
}

impl ChannelSink {
    /// Create a sink writing to `tx`
    pub fn new(tx: mpsc::Sender<StreamUpdate>) -> Self {
        Self { tx }
    }

    async fn forward(&self, update: StreamUpdate) {
        if self.tx.send(update).await.is_err() {
            // Receiver gone: the exchange was cleared or abandoned
            tracing::debug!("Stream update receiver dropped");
        }
    }
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn on_chunk(&mut self, fragment: String) {
        self.forward(StreamUpdate::Chunk(fragment)).await;
    }

    async fn on_success(&mut self, stats: StreamStats) {
        self.forward(StreamUpdate::Done(stats)).await;
    }

    async fn on_error(&mut self, failure: StreamFailure) {
        self.forward(StreamUpdate::Failed(failure)).await;
    }
}

/// Size and timing of one session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Chunk callbacks delivered
    pub chunk_count: u32,
    /// Bytes of answer text delivered
    pub bytes_received: u64,
    /// Time from send to termination
    pub elapsed: Duration,
}

impl StreamStats {
    /// Elapsed time in whole milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Summary of a finished session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Terminal state
    pub termination: Termination,
    /// What was delivered before it
    pub stats: StreamStats,
}

impl StreamOutcome {
    /// Whether the session ended successfully
    pub fn is_success(&self) -> bool {
        self.termination == Termination::Success
    }
}

/// One streaming request
#[derive(Debug)]
pub struct StreamingSession {
    state: StreamState,
    max_line_bytes: usize,
    cancel: CancellationToken,
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingSession {
    /// Create an idle session
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            cancel: CancellationToken::new(),
        }
    }

    /// Limit the length of a single event line
    #[must_use]
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Cancel the session when `token` fires
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current state
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    fn transition(&mut self, next: StreamState) -> bool {
        let legal = matches!(
            (&self.state, &next),
            (StreamState::Idle, StreamState::Sending)
                | (StreamState::Sending, StreamState::Streaming)
                | (
                    StreamState::Sending | StreamState::Streaming,
                    StreamState::Terminated(_)
                )
        );

        if legal {
            tracing::trace!(from = ?self.state, to = ?next, "Stream state change");
            self.state = next;
        } else {
            tracing::warn!(from = ?self.state, to = ?next, "Rejected stream state change");
        }
        legal
    }

    /// Send `query` and deliver its events to `sink` until a terminal state
    ///
    /// Exactly one of [`StreamSink::on_success`] or [`StreamSink::on_error`]
    /// is called, after all chunk callbacks.
    pub async fn run<B, K>(
        mut self,
        backend: &B,
        ctx: &SessionContext,
        query: &str,
        sink: &mut K,
    ) -> StreamOutcome
    where
        B: AnswerBackend + ?Sized,
        K: StreamSink + ?Sized,
    {
        let started = Instant::now();
        let mut stats = StreamStats::default();

        self.transition(StreamState::Sending);
        tracing::debug!(backend = backend.name(), "Opening answer stream");

        let termination = self.drive(backend, ctx, query, sink, &mut stats).await;
        self.transition(StreamState::Terminated(termination.clone()));
        stats.elapsed = started.elapsed();

        tracing::debug!(
            chunks = stats.chunk_count,
            bytes = stats.bytes_received,
            elapsed_ms = stats.elapsed_ms(),
            success = termination == Termination::Success,
            "Answer stream finished"
        );

        match &termination {
            Termination::Success => sink.on_success(stats).await,
            Termination::Error(failure) => {
                tracing::warn!(kind = ?failure.kind, error = %failure, "Answer stream failed");
                sink.on_error(failure.clone()).await;
            }
        }

        StreamOutcome { termination, stats }
    }

    async fn drive<B, K>(
        &mut self,
        backend: &B,
        ctx: &SessionContext,
        query: &str,
        sink: &mut K,
        stats: &mut StreamStats,
    ) -> Termination
    where
        B: AnswerBackend + ?Sized,
        K: StreamSink + ?Sized,
    {
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Termination::Error(StreamFailure::cancelled());
            }
            result = backend.open_stream(ctx, query) => result,
        };

        let body = match opened {
            Ok(body) => body,
            Err(e) => return Termination::Error(e.into()),
        };

        self.transition(StreamState::Streaming);

        let decoder = LineDecoder::with_max_line_bytes(self.max_line_bytes);
        let mut lines = LineStream::with_decoder(body, decoder);
        let mut parser = EventParser::new();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Termination::Error(StreamFailure::cancelled());
                }
                line = lines.next() => line,
            };

            let line = match next {
                // End of stream without an error event counts as success
                None => return Termination::Success,
                Some(Err(e)) => return Termination::Error(e.into()),
                Some(Ok(line)) => line,
            };

            match parser.push_line(&line) {
                Some(StreamEvent::Chunk(fragment)) => {
                    stats.chunk_count += 1;
                    stats.bytes_received += fragment.len() as u64;
                    sink.on_chunk(fragment).await;
                }
                Some(StreamEvent::Done) => return Termination::Success,
                Some(StreamEvent::Error(description)) => {
                    return Termination::Error(StreamFailure::new(
                        FailureKind::Service,
                        description,
                    ));
                }
                None => {}
            }
        }
    }
}
