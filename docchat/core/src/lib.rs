//! DocChat Core - Document-Grounded Chat Client
//!
//! This crate holds everything between a chat surface and the remote
//! document-answering service: the streaming answer protocol, the
//! conversation log and the dispatcher that routes each query. It has no
//! terminal or UI dependencies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Surface                               │
//! │           (CLI, web view, test harness)                       │
//! │                 │ Submission        ▲ ChatNotice              │
//! └─────────────────┼───────────────────┼─────────────────────────┘
//!                   ▼                   │
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                             │
//! │  ┌──────────────────┐        ┌────────────────────────────┐  │
//! │  │ ConversationLog  │◀───────│ StreamUpdate (mpsc)        │  │
//! │  └──────────────────┘        └─────────────▲──────────────┘  │
//! │        atomic path │                       │ streaming path   │
//! │                    ▼                       │                  │
//! │  ┌──────────────────────┐   ┌──────────────┴───────────────┐ │
//! │  │ upload_and_query     │   │ StreamingSession (task)       │ │
//! │  └──────────┬───────────┘   │ LineDecoder → EventParser     │ │
//! │             │               └──────────────┬───────────────┘ │
//! └─────────────┼──────────────────────────────┼─────────────────┘
//!               ▼                              ▼
//!        AnswerBackend (HttpBackend: reqwest, bearer credential)
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use docchat_core::{ClientConfig, Dispatcher, HttpBackend, SessionContext, Submission};
//! use tokio::sync::mpsc;
//!
//! let config = docchat_core::load_config()?;
//! let backend = HttpBackend::new(&config)?;
//! let ctx = SessionContext::new("ada@example.com").with_credential(token);
//!
//! let (tx, mut rx) = mpsc::channel(100);
//! let mut dispatcher = Dispatcher::new(backend, ctx, config, tx);
//!
//! dispatcher.submit(Submission::text("Summarise chapter 2")).await?;
//! while dispatcher.is_busy() {
//!     dispatcher.poll_streaming().await;
//!     while let Ok(notice) = rx.try_recv() {
//!         // Render notice
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Answer service trait and HTTP implementation
//! - [`config`]: Configuration file, environment and CLI overrides
//! - [`context`]: Identity and credential for outbound requests
//! - [`dispatcher`]: Query routing and ownership of the log
//! - [`log`]: Conversation records and the generation-checked log
//! - [`messages`]: Notices from the dispatcher to a surface
//! - [`stream`]: Line framing, event parsing and the streaming session

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod log;
pub mod messages;
pub mod stream;

// Re-exports for convenience
pub use backend::{
    AnswerBackend, Attachment, AttachmentError, AtomicAnswer, HttpBackend, ServiceError,
    SourceDocument,
};
pub use context::SessionContext;
pub use dispatcher::{DispatchError, Dispatcher, SubmitOutcome, Submission};
pub use log::{ConversationLog, ConversationMessage, RecordHandle};
pub use messages::{ChatNotice, DispatcherState, MessageId, MessageKind, ResponseMetadata};

// Streaming exports
pub use stream::{
    EventParser, LineDecoder, StreamEvent, StreamFailure, StreamOutcome, StreamSink,
    StreamState, StreamStats, StreamingSession, Termination,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource, DocChatToml,
};
