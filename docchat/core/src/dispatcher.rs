//! Query Dispatcher
//!
//! Owns the conversation log and routes each submission down one of two
//! paths:
//!
//! - **Atomic** (attachment present): upload the document with the query and
//!   append one complete answer (or error) record.
//! - **Streaming** (no attachment): append an empty placeholder, run a
//!   [`StreamingSession`] in a background task, and grow the placeholder as
//!   fragments arrive.
//!
//! The surface drives streaming with [`Dispatcher::poll_streaming`] (from a
//! render loop) or [`Dispatcher::wait_streaming`] (to block until the answer
//! ends). Every change is announced on the notice channel.
//!
//! Log, state and in-flight bookkeeping are updated before any notice is
//! sent, so dropping one of these futures mid-send never leaves the
//! dispatcher busy.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{AnswerBackend, Attachment, ServiceError};
use crate::config::ClientConfig;
use crate::context::SessionContext;
use crate::log::{ConversationLog, ConversationMessage, RecordHandle};
use crate::messages::{ChatNotice, DispatcherState, ResponseMetadata};
use crate::stream::{
    ChannelSink, FailureKind, StreamFailure, StreamOutcome, StreamStats, StreamUpdate,
    StreamingSession,
};

/// Prefix of the error record that replaces a failed streaming placeholder
pub const STREAMING_ERROR_PREFIX: &str = "Streaming error: ";

const PANICKED_STREAM_DESCRIPTION: &str = "stream task panicked";
const ABORTED_STREAM_DESCRIPTION: &str = "stream task was aborted";
const LOST_STREAM_DESCRIPTION: &str = "stream ended unexpectedly";

/// Errors rejecting a submission or a history operation
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The query was empty or whitespace
    #[error("Query is empty")]
    EmptyQuery,

    /// Another exchange is still in flight
    #[error("An answer is still in progress")]
    Busy,

    /// The service refused to clear stored history
    #[error("Failed to clear history: {0}")]
    ClearHistory(#[source] ServiceError),
}

/// One user query, optionally grounded on a document
#[derive(Debug, Clone)]
pub struct Submission {
    /// Query text, sent as typed
    pub query: String,
    /// Document to upload with the query
    pub attachment: Option<Attachment>,
}

impl Submission {
    /// A query without an attachment
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            attachment: None,
        }
    }

    /// Attach a document, switching the submission to the atomic path
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// What a submission produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Atomic path: a complete answer record was appended
    Answered(RecordHandle),
    /// Atomic path: an error record was appended
    Failed(RecordHandle),
    /// Streaming path: the placeholder is filling in the background
    Streaming(RecordHandle),
}

/// Bookkeeping for the in-flight streaming exchange
struct ActiveStream {
    handle: RecordHandle,
    rx: mpsc::Receiver<StreamUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

/// The Dispatcher - routes queries and owns the conversation log
pub struct Dispatcher<B: AnswerBackend> {
    /// Resolved client configuration
    config: ClientConfig,
    /// Answer service
    backend: Arc<B>,
    /// Identity and credential for outbound requests
    context: SessionContext,
    /// Conversation history
    log: ConversationLog,
    /// Current state
    state: DispatcherState,
    /// In-flight streaming exchange, if any
    active: Option<ActiveStream>,
    /// Channel to the UI surface
    tx: mpsc::Sender<ChatNotice>,
}

impl<B: AnswerBackend + 'static> Dispatcher<B> {
    /// Create a new dispatcher
    pub fn new(
        backend: B,
        context: SessionContext,
        config: ClientConfig,
        tx: mpsc::Sender<ChatNotice>,
    ) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            context,
            log: ConversationLog::new(),
            state: DispatcherState::Ready,
            active: None,
            tx,
        }
    }

    /// Conversation history
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Current state
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Whether a streaming answer is in flight; surfaces disable input while
    /// true
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Answer service in use
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Submit a query
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::EmptyQuery` for blank input and
    /// `DispatchError::Busy` while another exchange is in flight. In both
    /// cases the log is left untouched.
    pub async fn submit(&mut self, submission: Submission) -> Result<SubmitOutcome, DispatchError> {
        if submission.query.trim().is_empty() {
            tracing::debug!("Ignoring empty query");
            return Err(DispatchError::EmptyQuery);
        }
        if self.is_busy() {
            tracing::debug!("Rejecting query while an answer is in progress");
            return Err(DispatchError::Busy);
        }

        let Submission { query, attachment } = submission;
        let user = ConversationMessage::user(
            query.clone(),
            attachment.as_ref().map(|a| a.file_name().to_string()),
        );
        self.append(user).await;

        let outcome = match attachment {
            Some(attachment) => self.submit_atomic(&query, &attachment).await,
            None => self.start_streaming(query).await,
        };
        Ok(outcome)
    }

    async fn submit_atomic(&mut self, query: &str, attachment: &Attachment) -> SubmitOutcome {
        self.set_state(DispatcherState::Thinking).await;
        tracing::info!(
            file = attachment.file_name(),
            bytes = attachment.bytes().len(),
            "Uploading document with query"
        );

        let result = self
            .backend
            .upload_and_query(&self.context, query, attachment)
            .await;

        let mut notices = Vec::new();
        let outcome = match result {
            Ok(answer) => {
                let (handle, appended) = self.push(answer.into_record());
                notices.push(appended);
                SubmitOutcome::Answered(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload and query failed");
                if e.is_unauthorized() {
                    notices.push(ChatNotice::SessionInvalidated);
                }
                let (handle, appended) = self.push(ConversationMessage::error(e.user_message()));
                notices.push(appended);
                SubmitOutcome::Failed(handle)
            }
        };

        notices.extend(self.enter_state(DispatcherState::Ready));
        self.send_all(notices).await;
        outcome
    }

    async fn start_streaming(&mut self, query: String) -> SubmitOutcome {
        let (handle, appended) = self.push(ConversationMessage::placeholder());

        let (update_tx, update_rx) = mpsc::channel(self.config.stream_channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let session = StreamingSession::new()
            .with_max_line_bytes(self.config.max_line_bytes)
            .with_cancellation(cancel.clone());
        let backend = Arc::clone(&self.backend);
        let context = self.context.clone();

        let task = tokio::spawn(async move {
            let mut sink = ChannelSink::new(update_tx);
            session
                .run(backend.as_ref(), &context, &query, &mut sink)
                .await
        });

        self.active = Some(ActiveStream {
            handle: handle.clone(),
            rx: update_rx,
            cancel,
            task,
        });

        let mut notices = vec![appended];
        notices.extend(self.enter_state(DispatcherState::Responding));
        self.send_all(notices).await;

        SubmitOutcome::Streaming(handle)
    }

    /// Apply every update that is already available, without waiting
    ///
    /// Returns `true` if anything was applied.
    pub async fn poll_streaming(&mut self) -> bool {
        // Collect first so the receiver borrow ends before updates are applied
        let (updates, closed) = {
            let Some(active) = self.active.as_mut() else {
                return false;
            };

            let mut collected = Vec::new();
            let mut closed = false;
            loop {
                match active.rx.try_recv() {
                    Ok(update) => {
                        let terminal = update.is_terminal();
                        collected.push(update);
                        if terminal {
                            break;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
            (collected, closed)
        };

        let applied = !updates.is_empty() || closed;
        for update in updates {
            self.apply_update(update).await;
        }
        if closed && self.active.is_some() {
            self.handle_lost_stream().await;
        }
        applied
    }

    /// Apply updates until the current streaming exchange terminates
    pub async fn wait_streaming(&mut self) {
        loop {
            let next = match self.active.as_mut() {
                Some(active) => active.rx.recv().await,
                None => return,
            };

            match next {
                Some(update) => self.apply_update(update).await,
                None => self.handle_lost_stream().await,
            }
        }
    }

    async fn apply_update(&mut self, update: StreamUpdate) {
        let Some(handle) = self.active.as_ref().map(|a| a.handle.clone()) else {
            return;
        };

        match update {
            StreamUpdate::Chunk(fragment) => {
                if self.log.append_text(&handle, &fragment) {
                    self.send(ChatNotice::Chunk {
                        message_id: handle.id().clone(),
                        text: fragment,
                    })
                    .await;
                }
            }

            StreamUpdate::Done(stats) => {
                self.active = None;
                let mut notices = Vec::new();
                if let Some(record) = self.log.finish(&handle) {
                    notices.push(ChatNotice::StreamEnd {
                        message_id: handle.id().clone(),
                        final_content: record.text().to_string(),
                        metadata: response_metadata(&stats),
                    });
                }
                tracing::debug!(
                    chunks = stats.chunk_count,
                    elapsed_ms = stats.elapsed_ms(),
                    "Streaming answer complete"
                );
                notices.extend(self.enter_state(DispatcherState::Ready));
                self.send_all(notices).await;
            }

            StreamUpdate::Failed(failure) => {
                self.active = None;
                let mut notices = self.fail_placeholder(&handle, &failure);
                notices.extend(self.enter_state(DispatcherState::Ready));
                self.send_all(notices).await;
            }
        }
    }

    /// Turn the placeholder into an error record; returns the notices to send
    fn fail_placeholder(
        &mut self,
        handle: &RecordHandle,
        failure: &StreamFailure,
    ) -> Vec<ChatNotice> {
        let mut notices = Vec::new();
        let record = ConversationMessage::error(format!("{STREAMING_ERROR_PREFIX}{failure}"));
        if self.log.replace(handle, record.clone()) {
            notices.push(ChatNotice::RecordReplaced {
                message_id: handle.id().clone(),
                record,
            });
        }
        if failure.kind == FailureKind::Unauthorized {
            notices.push(ChatNotice::SessionInvalidated);
        }
        notices
    }

    /// The session task ended without a terminal update (it panicked or
    /// was aborted)
    async fn handle_lost_stream(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        // Awaited in place: the exchange stays active until the task's fate is known
        let joined = (&mut active.task).await;
        let Some(active) = self.active.take() else {
            return;
        };

        let description = match joined {
            Ok(outcome) => {
                tracing::debug!(
                    chunks = outcome.stats.chunk_count,
                    success = outcome.is_success(),
                    "Session finished but its terminal update was lost"
                );
                LOST_STREAM_DESCRIPTION.to_string()
            }
            Err(e) if e.is_panic() => PANICKED_STREAM_DESCRIPTION.to_string(),
            Err(e) if e.is_cancelled() => ABORTED_STREAM_DESCRIPTION.to_string(),
            Err(e) => e.to_string(),
        };
        tracing::error!(error = %description, "Streaming task ended without a terminal event");

        let failure = StreamFailure::new(FailureKind::Transport, description);
        let mut notices = self.fail_placeholder(&active.handle, &failure);
        notices.extend(self.enter_state(DispatcherState::Ready));
        self.send_all(notices).await;
    }

    /// Cancel the in-flight streaming answer
    ///
    /// The placeholder becomes a `Streaming error: cancelled` record; any
    /// update the session sends afterwards is discarded. With nothing in
    /// flight this only returns the dispatcher to `Ready`.
    pub async fn cancel_streaming(&mut self) {
        let Some(active) = self.active.take() else {
            self.set_state(DispatcherState::Ready).await;
            return;
        };
        active.cancel.cancel();
        tracing::info!(message_id = %active.handle.id(), "Streaming answer cancelled");

        let mut notices = self.fail_placeholder(&active.handle, &StreamFailure::cancelled());
        notices.extend(self.enter_state(DispatcherState::Ready));
        self.send_all(notices).await;
    }

    /// Empty the local log
    ///
    /// An in-flight stream is cancelled; its late updates target a stale
    /// handle and change nothing.
    pub async fn clear(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
        self.log.clear();

        let mut notices = vec![ChatNotice::Cleared];
        notices.extend(self.enter_state(DispatcherState::Ready));
        self.send_all(notices).await;
    }

    /// Delete stored history on the service, then clear the local log
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ClearHistory` if the service call fails; the
    /// local log is kept in that case.
    pub async fn clear_history(&mut self) -> Result<(), DispatchError> {
        if let Err(e) = self.backend.clear_history(&self.context).await {
            tracing::warn!(error = %e, "Failed to clear stored history");
            if e.is_unauthorized() {
                self.send(ChatNotice::SessionInvalidated).await;
            }
            return Err(DispatchError::ClearHistory(e));
        }

        self.clear().await;
        Ok(())
    }

    /// Stop any background work
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                tracing::debug!(error = %e, "Streaming task ended abnormally during shutdown");
            }
        }
        tracing::debug!("Dispatcher shut down");
    }

    async fn append(&mut self, record: ConversationMessage) -> RecordHandle {
        let (handle, appended) = self.push(record);
        self.send(appended).await;
        handle
    }

    /// Append to the log; returns the notice announcing it
    fn push(&mut self, record: ConversationMessage) -> (RecordHandle, ChatNotice) {
        let handle = self.log.append(record.clone());
        let notice = ChatNotice::RecordAppended {
            handle: handle.clone(),
            record,
        };
        (handle, notice)
    }

    async fn set_state(&mut self, state: DispatcherState) {
        if let Some(notice) = self.enter_state(state) {
            self.send(notice).await;
        }
    }

    /// Switch state; returns the notice announcing a change
    fn enter_state(&mut self, state: DispatcherState) -> Option<ChatNotice> {
        if self.state == state {
            return None;
        }
        self.state = state;
        Some(ChatNotice::State { state })
    }

    async fn send_all(&self, notices: Vec<ChatNotice>) {
        for notice in notices {
            self.send(notice).await;
        }
    }

    async fn send(&self, notice: ChatNotice) {
        if self.tx.send(notice).await.is_err() {
            tracing::debug!("Notice receiver dropped");
        }
    }
}

fn response_metadata(stats: &StreamStats) -> ResponseMetadata {
    ResponseMetadata::with_timing(stats.elapsed_ms(), stats.chunk_count, stats.bytes_received)
}
