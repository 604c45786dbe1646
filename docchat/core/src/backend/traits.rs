//! Answer Service Traits
//!
//! Trait definitions for the remote document-answering service. The
//! dispatcher and streaming session only see [`AnswerBackend`], so tests can
//! script a backend without a network and the HTTP details stay in one place.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::SessionContext;
use crate::log::ConversationMessage;

/// Raw response body of a streaming query, as delivered by the transport
pub type ByteStream = BoxStream<'static, Result<Bytes, ServiceError>>;

/// Shown when a failed request carries no readable reason
pub const GENERIC_FAILURE_TEXT: &str = "Failed to get response. Please try again.";

/// Errors from talking to the answer service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service answered with a non-success status
    #[error("HTTP error! status: {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The credential was rejected (401)
    #[error("Unauthorized: session expired")]
    Unauthorized {
        /// Response body (may be empty)
        body: String,
    },

    /// Connection refused, reset, or aborted mid-stream
    #[error("{0}")]
    Transport(String),

    /// The response body was not the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Whether the auth layer should discard the session
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Text for an error record on the atomic path
    ///
    /// Prefers the service's own `error` or `detail` field.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { body, .. } | Self::Unauthorized { body } => {
                detail_from_body(body).unwrap_or_else(|| GENERIC_FAILURE_TEXT.to_string())
            }
            Self::Transport(_) | Self::Decode(_) => GENERIC_FAILURE_TEXT.to_string(),
        }
    }
}

fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Errors preparing a document attachment
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Extension is not one of the accepted document types
    #[error("Unsupported document type: {file_name} (expected .pdf, .docx, .doc, .txt or .md)")]
    Unsupported {
        /// Offending file name
        file_name: String,
    },

    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that was attempted
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },
}

/// A document sent along with a query on the atomic path
#[derive(Clone)]
pub struct Attachment {
    file_name: String,
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl Attachment {
    /// Create an attachment from in-memory contents
    ///
    /// # Errors
    ///
    /// Returns `AttachmentError::Unsupported` for extensions other than
    /// `.pdf`, `.docx`, `.doc`, `.txt` and `.md`.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AttachmentError> {
        let file_name = file_name.into();
        let mime_type =
            mime_for(&file_name).ok_or_else(|| AttachmentError::Unsupported {
                file_name: file_name.clone(),
            })?;

        Ok(Self {
            file_name,
            bytes,
            mime_type,
        })
    }

    /// Read an attachment from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file type is unsupported or the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AttachmentError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Check the type before reading a possibly large file
        if mime_for(&file_name).is_none() {
            return Err(AttachmentError::Unsupported { file_name });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AttachmentError::Read {
                path: path.display().to_string(),
                source,
            })?;

        Self::new(file_name, bytes)
    }

    /// File name shown on the user record and sent to the service
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type derived from the extension
    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "doc" => Some("application/msword"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        _ => None,
    }
}

/// One retrieved passage backing an answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Free-form metadata; `filename` names the document
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Retrieved passage text
    #[serde(default)]
    pub page_content: Option<String>,
}

impl SourceDocument {
    /// Create a source naming `filename`
    pub fn named(filename: impl Into<String>) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "filename".to_string(),
            serde_json::Value::String(filename.into()),
        );
        Self {
            metadata,
            page_content: None,
        }
    }

    /// Document name, if the service reported one
    pub fn filename(&self) -> Option<&str> {
        self.metadata
            .get("filename")
            .and_then(serde_json::Value::as_str)
    }
}

/// Complete answer from the upload-and-query endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomicAnswer {
    /// Answer text
    pub answer: String,
    /// Retrieved passages
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
    /// Document the answer was grounded on
    #[serde(default)]
    pub document_used: Option<String>,
}

impl AtomicAnswer {
    /// Convert into a finished assistant record
    #[must_use]
    pub fn into_record(self) -> ConversationMessage {
        let names: Vec<String> = self
            .sources
            .iter()
            .filter_map(SourceDocument::filename)
            .map(String::from)
            .collect();
        let context_label = self.document_used.filter(|d| !d.is_empty());
        ConversationMessage::assistant(self.answer, names, context_label)
    }
}

/// Answer service trait
///
/// Implement this trait to point the dispatcher at a different transport.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Check if the service is reachable
    async fn health_check(&self) -> bool;

    /// Send a query and return the raw event-stream body
    ///
    /// Resolves once the service has accepted the request; a non-success
    /// status is an error and no body is returned.
    async fn open_stream(
        &self,
        ctx: &SessionContext,
        query: &str,
    ) -> Result<ByteStream, ServiceError>;

    /// Upload a document and get a complete answer grounded on it
    async fn upload_and_query(
        &self,
        ctx: &SessionContext,
        query: &str,
        attachment: &Attachment,
    ) -> Result<AtomicAnswer, ServiceError>;

    /// Delete the user's stored conversation history
    async fn clear_history(&self, ctx: &SessionContext) -> Result<(), ServiceError>;
}
