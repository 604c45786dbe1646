//! Terminal rendering
//!
//! A single task owns stdout. Dispatcher notices and console lines from the
//! REPL arrive on separate channels; notices are drained first so a prompt
//! never appears in the middle of an answer.

use docchat_core::{ChatNotice, ConversationMessage, DispatcherState, MessageKind};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Output requested by the REPL itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Console {
    /// A status or help line
    Info(String),
    /// Ready for the next line of input
    Prompt,
}

const PROMPT: &str = "> ";

/// Writes notices and console lines to a terminal
pub struct Renderer<W> {
    out: W,
    /// An answer is being printed fragment by fragment
    mid_answer: bool,
}

impl<W: AsyncWrite + Unpin> Renderer<W> {
    /// Create a renderer writing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_answer: false,
        }
    }

    /// Render one dispatcher notice
    pub async fn notice(&mut self, notice: &ChatNotice) -> std::io::Result<()> {
        match notice {
            ChatNotice::RecordAppended { record, .. } => self.record(record).await?,

            ChatNotice::Chunk { text, .. } => {
                self.mid_answer = true;
                self.out.write_all(text.as_bytes()).await?;
            }

            ChatNotice::StreamEnd { metadata, .. } => {
                self.end_answer().await?;
                tracing::debug!(
                    chunks = metadata.chunk_count,
                    elapsed_ms = metadata.elapsed_ms,
                    "Answer rendered"
                );
            }

            ChatNotice::RecordReplaced { record, .. } => {
                self.end_answer().await?;
                self.record(record).await?;
            }

            ChatNotice::Cleared => self.line("Conversation cleared.").await?,

            ChatNotice::State { state } => {
                if *state == DispatcherState::Thinking {
                    self.line(state.description()).await?;
                }
            }

            ChatNotice::SessionInvalidated => {
                self.line("Session expired. Sign in again and restart with a fresh token.")
                    .await?;
            }
        }
        self.out.flush().await
    }

    /// Render one console request
    pub async fn console(&mut self, console: &Console) -> std::io::Result<()> {
        match console {
            Console::Info(text) => self.line(text).await?,
            Console::Prompt => {
                self.end_answer().await?;
                self.out.write_all(PROMPT.as_bytes()).await?;
            }
        }
        self.out.flush().await
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    async fn record(&mut self, record: &ConversationMessage) -> std::io::Result<()> {
        match record.kind() {
            // Echoed by the terminal already
            MessageKind::User => Ok(()),
            // Streaming placeholder: fragments follow as chunks
            MessageKind::Assistant if record.is_streaming() => Ok(()),
            MessageKind::Assistant => {
                self.line(record.text()).await?;
                if !record.sources().is_empty() {
                    self.line(&format!("Sources: {}", record.sources().join(", ")))
                        .await?;
                }
                if let Some(label) = record.context_label() {
                    self.line(&format!("Context: {label}")).await?;
                }
                Ok(())
            }
            MessageKind::Error => self.line(&format!("Error: {}", record.text())).await,
        }
    }

    async fn end_answer(&mut self) -> std::io::Result<()> {
        if self.mid_answer {
            self.mid_answer = false;
            self.out.write_all(b"\n").await?;
        }
        Ok(())
    }

    async fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.end_answer().await?;
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await
    }
}

/// Render until both channels close
pub async fn run_renderer<W: AsyncWrite + Unpin>(
    mut renderer: Renderer<W>,
    mut notices: mpsc::Receiver<ChatNotice>,
    mut console: mpsc::Receiver<Console>,
) {
    let mut notices_open = true;
    let mut console_open = true;

    while notices_open || console_open {
        let result = tokio::select! {
            biased;
            notice = notices.recv(), if notices_open => match notice {
                Some(notice) => renderer.notice(&notice).await,
                None => {
                    notices_open = false;
                    Ok(())
                }
            },
            line = console.recv(), if console_open => match line {
                Some(line) => renderer.console(&line).await,
                None => {
                    console_open = false;
                    Ok(())
                }
            },
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to write to terminal");
            break;
        }
    }
}
