//! Webhook implementation of the message sink

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::messages::OutboundMessage;
use crate::common::errors::{MonitorError, Result, SinkError};
use crate::common::traits::MessageSink;
use crate::common::types::MessageId;

/// Wait applied when a 429 carries no usable hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    /// Seconds, possibly fractional
    retry_after: Option<f64>,
}

/// Sends messages through webhook URLs
///
/// The target passed to each call is the full webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
}

impl WebhookSink {
    /// Create a new sink with a 30 second timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new sink with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(e.to_string()))?;
        Ok(Self { client })
    }

    fn with_body(
        request: RequestBuilder,
        message: &OutboundMessage,
    ) -> std::result::Result<RequestBuilder, SinkError> {
        match &message.attachment {
            None => Ok(request.json(message)),
            Some(attachment) => {
                let payload = serde_json::to_string(message)
                    .map_err(|e| SinkError::Encoding(e.to_string()))?;
                let file = Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.filename.clone())
                    .mime_str(&attachment.content_type)
                    .map_err(|e| SinkError::Encoding(e.to_string()))?;
                let form = Form::new()
                    .text("payload_json", payload)
                    .part("files[0]", file);
                Ok(request.multipart(form))
            }
        }
    }

    async fn check(response: Response, what: &str) -> std::result::Result<Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SinkError::RateLimited {
                retry_after: retry_after(response).await,
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SinkError::NotFound(what.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Server-advised wait from the body's `retry_after`, else the header
async fn retry_after(response: Response) -> Duration {
    let header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());

    let body = response.json::<RateLimitBody>().await.ok();
    body.and_then(|b| b.retry_after)
        .or(header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn webhook_base(target: &str) -> &str {
    target.trim_end_matches('/')
}

#[async_trait]
impl MessageSink for WebhookSink {
    #[instrument(skip(self, target, message), fields(summary = message.summary()))]
    async fn create(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> std::result::Result<MessageId, SinkError> {
        let request = self
            .client
            .post(webhook_base(target))
            .query(&[("wait", "true")]);
        let response = Self::with_body(request, message)?.send().await?;
        let response = Self::check(response, "webhook").await?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| SinkError::Network(format!("unreadable create response: {}", e)))?;
        debug!(message_id = %created.id, "Message created");
        Ok(MessageId::new(created.id))
    }

    #[instrument(skip(self, target, message), fields(summary = message.summary()))]
    async fn edit(
        &self,
        target: &str,
        message_id: &MessageId,
        message: &OutboundMessage,
    ) -> std::result::Result<(), SinkError> {
        let url = format!("{}/messages/{}", webhook_base(target), message_id);
        let request = self.client.patch(&url);
        let response = Self::with_body(request, message)?.send().await?;
        Self::check(response, message_id.as_str()).await?;
        debug!("Message edited");
        Ok(())
    }
}
