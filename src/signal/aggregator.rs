//! Per-channel aggregation of block-difference signals
//!
//! Owns the event window and the live stats message of one monitored channel.
//! The window lock is released before anything is sent.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::inbound::{extract_signal, InboundMessage};
use super::report::render_stats;
use super::stats::{compute, SignalStats};
use super::window::{Observation, SharedWindow};
use crate::common::errors::Result;
use crate::common::traits::HistorySource;
use crate::common::types::MessageId;
use crate::dispatch::live::{LivePublisher, PublishOutcome};

/// What ingesting one message produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub observations: usize,
    pub tags: usize,
    pub malformed: usize,
    /// Wrong channel or already seen
    pub skipped: bool,
}

impl IngestSummary {
    pub fn changed(&self) -> bool {
        self.observations + self.tags > 0
    }
}

pub struct SignalAggregator {
    channel_id: String,
    channel_label: String,
    window: SharedWindow,
    window_duration: Duration,
    publisher: LivePublisher,
    seen: Mutex<HashMap<MessageId, DateTime<Utc>>>,
}

impl SignalAggregator {
    pub fn new(channel_id: impl Into<String>, window_duration: Duration, publisher: LivePublisher) -> Self {
        let channel_id = channel_id.into();
        Self {
            channel_label: format!("channel-{}", channel_id),
            channel_id,
            window: SharedWindow::new(window_duration),
            window_duration,
            publisher,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_channel_label(mut self, label: impl Into<String>) -> Self {
        self.channel_label = label.into();
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    pub fn publisher(&self) -> &LivePublisher {
        &self.publisher
    }

    /// Returns `false` if the message was already ingested
    fn mark_seen(&self, message: &InboundMessage, now: DateTime<Utc>) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let horizon = now - self.window_duration;
        seen.retain(|_, created| *created >= horizon);
        seen.insert(message.id.clone(), message.created_at).is_none()
    }

    /// Add the signals of one message to the window
    pub async fn ingest_at(&self, message: &InboundMessage, now: DateTime<Utc>) -> IngestSummary {
        if message.channel_id != self.channel_id || !self.mark_seen(message, now) {
            return IngestSummary {
                skipped: true,
                ..Default::default()
            };
        }

        let mut summary = IngestSummary::default();
        for embed in &message.embeds {
            let signal = extract_signal(embed);
            summary.malformed += signal.malformed;
            // the embed's tag is counted once, on its first observation
            let mut tag = signal.grpc;
            for value in signal.block_differences {
                let mut observation = Observation::new(message.created_at, value);
                observation.tag = tag.take();
                summary.tags += usize::from(observation.tag.is_some());
                self.window.append_at(observation, now).await;
                summary.observations += 1;
            }
            if let Some(tag) = tag {
                self.window.append_tag_at(message.created_at, tag, now).await;
                summary.tags += 1;
            }
        }
        if summary.malformed > 0 {
            warn!(
                message_id = %message.id,
                malformed = summary.malformed,
                "Skipped unparsable signal fields"
            );
        }
        summary
    }

    /// Render current stats and upsert the live message; `None` when the window is empty
    pub async fn publish_at(&self, now: DateTime<Utc>) -> Option<PublishOutcome> {
        let snapshot = self.window.snapshot_at(now).await;
        let SignalStats::Report(report) = compute(&snapshot) else {
            debug!(channel_id = %self.channel_id, "No signals in window, skipping report");
            return None;
        };
        let message = render_stats(
            &report,
            self.window_duration,
            &self.channel_label,
            self.publisher.policy(),
            now,
        );
        Some(self.publisher.publish_at(&message, now).await)
    }

    /// Reset the window and replay the channel history it covers
    ///
    /// Returns the newest message id seen, for incremental polling.
    pub async fn rescan(
        &self,
        history: &dyn HistorySource,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageId>> {
        self.window.reset().await;
        match self.seen.lock() {
            Ok(mut seen) => seen.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }

        let messages = history
            .messages_since(&self.channel_id, now - self.window_duration)
            .await?;
        let newest = self.ingest_batch(&messages, now).await;
        let retained = self.window.len().await;
        info!(
            channel_id = %self.channel_id,
            messages = messages.len(),
            retained,
            "History scan complete"
        );
        Ok(newest)
    }

    /// Ingest messages in order; returns the last message id
    pub async fn ingest_batch(&self, messages: &[InboundMessage], now: DateTime<Utc>) -> Option<MessageId> {
        for message in messages {
            self.ingest_at(message, now).await;
        }
        messages.last().map(|m| m.id.clone())
    }
}
