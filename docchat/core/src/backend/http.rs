//! HTTP Backend Implementation
//!
//! Answer service client over the document gateway's REST API.
//!
//! # Gateway API
//!
//! - `POST /query-stream` - JSON `{user_email, query}`, event-stream response
//! - `POST /upload-and-query` - multipart `user_email`, `file`, `query`
//! - `DELETE /conversations` - drop stored history
//! - `GET /health` - liveness
//!
//! Every request carries `Authorization: Bearer <token>` when the session
//! context has a credential.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};

use super::traits::{AnswerBackend, Attachment, AtomicAnswer, ByteStream, ServiceError};
use crate::config::ClientConfig;
use crate::context::SessionContext;

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Answer service client
#[derive(Clone)]
pub struct HttpBackend {
    /// Base URL, e.g. `http://localhost:8080/api/v1`
    base_url: String,
    /// Timeout for requests that return one complete body
    request_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend from resolved configuration
    ///
    /// Streaming requests have no total timeout (an answer may take minutes);
    /// only the connect phase is bounded.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            base_url: config.api_base_url.clone(),
            request_timeout: config.request_timeout,
            http_client,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(builder: RequestBuilder, ctx: &SessionContext) -> RequestBuilder {
        match ctx.credential() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-success status into an error, keeping the body for diagnostics
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!("Answer service rejected the session credential");
        return Err(ServiceError::Unauthorized { body });
    }

    tracing::warn!(status = status.as_u16(), "Answer service returned an error status");
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AnswerBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.url("health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn open_stream(
        &self,
        ctx: &SessionContext,
        query: &str,
    ) -> Result<ByteStream, ServiceError> {
        let body = serde_json::json!({
            "user_email": ctx.identity(),
            "query": query,
        });

        let request = self
            .http_client
            .post(self.url("query-stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);

        let response = Self::authorize(request, ctx).send().await?;
        let response = check_status(response).await?;

        tracing::debug!(status = response.status().as_u16(), "Stream accepted");

        Ok(response.bytes_stream().map_err(ServiceError::from).boxed())
    }

    async fn upload_and_query(
        &self,
        ctx: &SessionContext,
        query: &str,
        attachment: &Attachment,
    ) -> Result<AtomicAnswer, ServiceError> {
        let file = Part::bytes(attachment.bytes().to_vec())
            .file_name(attachment.file_name().to_string())
            .mime_str(attachment.mime_type())?;

        let form = Form::new()
            .text("user_email", ctx.identity().to_string())
            .part("file", file)
            .text("query", query.to_string());

        let request = self
            .http_client
            .post(self.url("upload-and-query"))
            .timeout(self.request_timeout)
            .multipart(form);

        let response = Self::authorize(request, ctx).send().await?;
        let response = check_status(response).await?;

        response
            .json::<AtomicAnswer>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn clear_history(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        let request = self
            .http_client
            .delete(self.url("conversations"))
            .timeout(self.request_timeout);

        let response = Self::authorize(request, ctx).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
