//! Answer Service Integration
//!
//! Access to the remote document-answering service through a common trait.
//!
//! # Usage
//!
//! ```ignore
//! use docchat_core::backend::{AnswerBackend, HttpBackend};
//! use docchat_core::{ClientConfig, SessionContext};
//!
//! let backend = HttpBackend::new(&ClientConfig::default())?;
//! let ctx = SessionContext::new("ada@example.com").with_credential(token);
//! let body = backend.open_stream(&ctx, "What does chapter 2 say?").await?;
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{
    AnswerBackend, Attachment, AttachmentError, AtomicAnswer, ByteStream, ServiceError,
    SourceDocument, GENERIC_FAILURE_TEXT,
};
