//! Live dashboard messages that are edited in place
//!
//! One message per report stream is kept and edited on every render. Once the
//! daily rollover time has passed in the configured zone, the next render
//! starts a fresh message if the current one was created on an earlier day.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;
use tracing::{info, warn};

use super::client::{Delivery, DispatchClient};
use super::messages::OutboundMessage;
use crate::common::errors::Result;
use crate::common::types::MessageId;
use crate::config::types::SignalConfig;

/// Daily boundary after which a new dashboard message is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverPolicy {
    pub time: NaiveTime,
    pub tz: Tz,
}

impl RolloverPolicy {
    pub fn new(time: NaiveTime, tz: Tz) -> Self {
        Self { time, tz }
    }

    pub fn from_config(config: &SignalConfig) -> Result<Self> {
        let (time, tz) = config.rollover()?;
        Ok(Self::new(time, tz))
    }

    /// Calendar day of `now` in the rollover zone
    pub fn local_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Whether a message created on `created_day` must be replaced at `now`
    pub fn should_replace(&self, created_day: NaiveDate, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        local.time() >= self.time && created_day < local.date_naive()
    }

    /// Human readable boundary, e.g. `16:15 Europe/Berlin`
    pub fn describe(&self) -> String {
        format!("{} {}", self.time.format("%H:%M"), self.tz.name())
    }
}

/// The one outstanding dashboard message of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMessageHandle {
    pub target: String,
    pub message_id: MessageId,
    pub created_day: NaiveDate,
}

/// What a publish call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created(MessageId),
    Edited(MessageId),
    /// Previous message was gone; a new one replaced it
    Recreated(MessageId),
    Dropped,
}

/// Upserts a recurring report into one live message
///
/// The handle lock is only held to read or swap the handle, never across a
/// send.
#[derive(Debug)]
pub struct LivePublisher {
    client: DispatchClient,
    target: String,
    policy: RolloverPolicy,
    handle: Mutex<Option<LiveMessageHandle>>,
}

impl LivePublisher {
    pub fn new(client: DispatchClient, target: impl Into<String>, policy: RolloverPolicy) -> Self {
        Self {
            client,
            target: target.into(),
            policy,
            handle: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RolloverPolicy {
        &self.policy
    }

    pub fn handle(&self) -> Option<LiveMessageHandle> {
        match self.handle.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, handle: Option<LiveMessageHandle>) {
        match self.handle.lock() {
            Ok(mut guard) => *guard = handle,
            Err(poisoned) => *poisoned.into_inner() = handle,
        }
    }

    pub async fn publish(&self, message: &OutboundMessage) -> PublishOutcome {
        self.publish_at(message, Utc::now()).await
    }

    /// Create or edit the live message as of `now`
    pub async fn publish_at(&self, message: &OutboundMessage, now: DateTime<Utc>) -> PublishOutcome {
        let current = self
            .handle()
            .filter(|h| !self.policy.should_replace(h.created_day, now));

        let Some(handle) = current else {
            return match self.create(message, now).await {
                Some(id) => PublishOutcome::Created(id),
                None => PublishOutcome::Dropped,
            };
        };

        match self
            .client
            .edit(&handle.target, &handle.message_id, message)
            .await
        {
            Delivery::Delivered { .. } => PublishOutcome::Edited(handle.message_id),
            Delivery::NotFound => {
                warn!(
                    message_id = %handle.message_id,
                    "Live message disappeared, creating a new one"
                );
                self.store(None);
                match self.create(message, now).await {
                    Some(id) => PublishOutcome::Recreated(id),
                    None => PublishOutcome::Dropped,
                }
            }
            Delivery::Dropped { .. } => PublishOutcome::Dropped,
        }
    }

    async fn create(&self, message: &OutboundMessage, now: DateTime<Utc>) -> Option<MessageId> {
        let id = self.client.send(&self.target, message).await.value()?;
        info!(message_id = %id, "Started new live message");
        self.store(Some(LiveMessageHandle {
            target: self.target.clone(),
            message_id: id.clone(),
            created_day: self.policy.local_day(now),
        }));
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::SinkError;
    use crate::common::retry::{BackoffPolicy, RecordingSleeper};
    use crate::common::traits::MockMessageSink;
    use crate::dispatch::messages::Embed;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn berlin_policy() -> RolloverPolicy {
        RolloverPolicy::new(
            NaiveTime::from_hms_opt(16, 15, 0).unwrap(),
            chrono_tz::Europe::Berlin,
        )
    }

    /// Berlin is UTC+2 in May
    fn berlin(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2024, 5, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn publisher(sink: MockMessageSink) -> LivePublisher {
        let client = DispatchClient::new(Arc::new(sink), BackoffPolicy::default())
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        LivePublisher::new(client, "hook", berlin_policy())
    }

    fn counting_creates(sink: &mut MockMessageSink, times: usize) -> Arc<AtomicU32> {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        sink.expect_create().times(times).returning(move |_, _| {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MessageId::new(format!("m{}", n)))
        });
        counter
    }

    #[test]
    fn test_rollover_rule() {
        let policy = berlin_policy();
        let yesterday = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        assert!(!policy.should_replace(yesterday, berlin(2, 16, 14)));
        assert!(policy.should_replace(yesterday, berlin(2, 16, 15)));
        assert!(policy.should_replace(yesterday, berlin(2, 23, 0)));
        assert!(!policy.should_replace(today, berlin(2, 18, 0)));
        assert_eq!(policy.describe(), "16:15 Europe/Berlin");
    }

    #[tokio::test]
    async fn test_renders_before_rollover_edit_same_message() {
        let mut sink = MockMessageSink::new();
        let creates = counting_creates(&mut sink, 1);
        sink.expect_edit()
            .times(2)
            .withf(|_, id, _| id.as_str() == "m1")
            .returning(|_, _, _| Ok(()));
        let publisher = publisher(sink);
        let message = OutboundMessage::embed(Embed::new("stats"));

        assert_eq!(
            publisher.publish_at(&message, berlin(2, 10, 0)).await,
            PublishOutcome::Created(MessageId::new("m1"))
        );
        assert_eq!(
            publisher.publish_at(&message, berlin(2, 11, 0)).await,
            PublishOutcome::Edited(MessageId::new("m1"))
        );
        assert_eq!(
            publisher.publish_at(&message, berlin(2, 16, 30)).await,
            PublishOutcome::Edited(MessageId::new("m1"))
        );
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_after_rollover_starts_new_message() {
        let mut sink = MockMessageSink::new();
        counting_creates(&mut sink, 2);
        sink.expect_edit().times(1).returning(|_, _, _| Ok(()));
        let publisher = publisher(sink);
        let message = OutboundMessage::embed(Embed::new("stats"));

        publisher.publish_at(&message, berlin(1, 12, 0)).await;
        // next day, before the boundary: still edited
        assert_eq!(
            publisher.publish_at(&message, berlin(2, 9, 0)).await,
            PublishOutcome::Edited(MessageId::new("m1"))
        );
        assert_eq!(
            publisher.publish_at(&message, berlin(2, 16, 20)).await,
            PublishOutcome::Created(MessageId::new("m2"))
        );
        assert_eq!(
            publisher.handle().unwrap().created_day,
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_message_is_recreated() {
        let mut sink = MockMessageSink::new();
        counting_creates(&mut sink, 2);
        sink.expect_edit()
            .times(1)
            .returning(|_, id, _| Err(SinkError::NotFound(id.to_string())));
        let publisher = publisher(sink);
        let message = OutboundMessage::embed(Embed::new("stats"));

        publisher.publish_at(&message, berlin(2, 10, 0)).await;
        assert_eq!(
            publisher.publish_at(&message, berlin(2, 10, 5)).await,
            PublishOutcome::Recreated(MessageId::new("m2"))
        );
        assert_eq!(publisher.handle().unwrap().message_id, MessageId::new("m2"));
    }
}
