//! REST access to the monitored channel's message history

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::inbound::InboundMessage;
use crate::common::errors::{MonitorError, Result};
use crate::common::traits::HistorySource;
use crate::common::types::MessageId;

/// Milliseconds between the Unix epoch and the snowflake epoch (2015-01-01)
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Largest page the API serves
const PAGE_LIMIT: usize = 100;

/// Upper bound on pages fetched by one call
const MAX_PAGES: usize = 100;

/// Smallest snowflake that can be created at `at`
pub fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let ms = (at.timestamp_millis() - SNOWFLAKE_EPOCH_MS).max(0) as u64;
    ms << 22
}

/// Creation time encoded in a snowflake id
pub fn snowflake_time(id: &MessageId) -> Option<DateTime<Utc>> {
    let raw: u64 = id.as_str().parse().ok()?;
    let ms = (raw >> 22) as i64 + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(ms).single()
}

fn snowflake_value(id: &MessageId) -> u64 {
    id.as_str().parse().unwrap_or(0)
}

/// Channel history read through the bot REST API
#[derive(Debug, Clone)]
pub struct DiscordChannelHistory {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordChannelHistory {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// One page of up to 100 messages newer than `after`, oldest first
    #[instrument(skip(self))]
    async fn page_after(&self, channel_id: &str, after: u64) -> Result<Vec<InboundMessage>> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .query(&[
                ("after", after.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()))
                .map(|secs| (secs * 1000.0) as u64);
            return Err(MonitorError::RateLimit {
                message: format!("channel {} history", channel_id),
                retry_after_ms,
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MonitorError::NotFound(format!("channel {}", channel_id)));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MonitorError::Configuration(format!(
                "bot token rejected for channel {} ({})",
                channel_id, status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, body
            )));
        }

        let mut messages: Vec<InboundMessage> = response.json().await?;
        messages.sort_by_key(|m| snowflake_value(&m.id));
        Ok(messages)
    }

    async fn collect_after(&self, channel_id: &str, mut after: u64) -> Result<Vec<InboundMessage>> {
        let mut collected = Vec::new();
        for _ in 0..MAX_PAGES {
            let page = self.page_after(channel_id, after).await?;
            let full = page.len() >= PAGE_LIMIT;
            let Some(last) = page.last() else {
                break;
            };
            let next = snowflake_value(&last.id);
            if next <= after {
                warn!(channel_id, "History paging did not advance, stopping");
                break;
            }
            after = next;
            collected.extend(page);
            if !full {
                break;
            }
        }
        debug!(channel_id, count = collected.len(), "Fetched channel history");
        Ok(collected)
    }
}

#[async_trait]
impl HistorySource for DiscordChannelHistory {
    async fn messages_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>> {
        let after = snowflake_at(since).saturating_sub(1);
        let mut messages = self.collect_after(channel_id, after).await?;
        messages.retain(|m| m.created_at >= since);
        Ok(messages)
    }

    async fn messages_after(
        &self,
        channel_id: &str,
        after: &MessageId,
    ) -> Result<Vec<InboundMessage>> {
        let after: u64 = after.as_str().parse().map_err(|_| {
            MonitorError::InvalidResponse(format!("not a snowflake id: {}", after))
        })?;
        self.collect_after(channel_id, after).await
    }
}
