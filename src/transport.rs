use crate::config::Config;
use crate::error::ChatError;
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Media type the backend must answer with
pub const EVENT_STREAM: &str = "text/event-stream";

/// Body of the outbound chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub prompt: &'a str,
}

/// Optional JSON error body of a rejected request
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the chat backend
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = config.endpoint()?;

        // No overall timeout: a reply may stream for as long as the backend likes
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    /// POST the prompt and validate the response before any of the body is read.
    pub async fn send_request(&self, prompt: &str) -> Result<ReplyStream, ChatError> {
        info!(endpoint = %self.endpoint, prompt_chars = prompt.chars().count(), "Sending chat request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM)
            .json(&ChatRequest { prompt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(status.as_u16(), &body);
            warn!(status = status.as_u16(), %message, "Backend rejected the request");
            return Err(ChatError::RequestRejected {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if !is_event_stream(content_type.as_deref()) {
            warn!(?content_type, "Expected {}", EVENT_STREAM);
            return Err(ChatError::InvalidFormat { content_type });
        }

        if response.content_length() == Some(0) {
            return Err(ChatError::EmptyBody);
        }

        debug!("Response validated, streaming body");
        Ok(ReplyStream::new(response.bytes_stream().map_err(ChatError::from)))
    }
}

/// Message shown for a non-2xx response.
fn rejection_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message: Some(message) }) if !message.is_empty() => message,
        Ok(_) => "Could not connect".to_string(),
        Err(_) => format!("HTTP error! status: {}", status),
    }
}

/// Compare the media type only, ignoring parameters such as `charset`.
fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM))
        .unwrap_or(false)
}

/// Raw body chunks of a validated event-stream response.
///
/// Dropping the stream aborts the underlying read.
pub struct ReplyStream {
    inner: BoxStream<'static, Result<Bytes, ChatError>>,
}

impl ReplyStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ChatError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }
}

impl Stream for ReplyStream {
    type Item = Result<Bytes, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
