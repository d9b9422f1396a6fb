//! Signal frequency report job

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::aggregator::SignalAggregator;
use super::inbound::InboundMessage;
use crate::common::channels::MailboxReceiver;
use crate::common::errors::Result;
use crate::common::traits::HistorySource;
use crate::common::types::MessageId;
use crate::config::types::AppConfig;
use crate::dispatch::client::DispatchClient;
use crate::dispatch::live::{LivePublisher, RolloverPolicy};
use crate::supervisor::job::{Job, Schedule};

pub const JOB_NAME: &str = "signal";

/// Keeps the block-difference stats message current
///
/// Startup rescans the channel history. Each tick then waits for either a
/// pushed mailbox message or the poll interval, whichever comes first.
pub struct SignalJob {
    config: Arc<AppConfig>,
    client: DispatchClient,
    history: Arc<dyn HistorySource>,
    mailbox: Option<AsyncMutex<MailboxReceiver>>,
    mailbox_open: AtomicBool,
    aggregator: Mutex<Option<Arc<SignalAggregator>>>,
    last_seen: Mutex<Option<MessageId>>,
}

impl SignalJob {
    pub fn new(config: Arc<AppConfig>, client: DispatchClient, history: Arc<dyn HistorySource>) -> Self {
        Self {
            config,
            client,
            history,
            mailbox: None,
            mailbox_open: AtomicBool::new(false),
            aggregator: Mutex::new(None),
            last_seen: Mutex::new(None),
        }
    }

    /// Also ingest messages pushed through an in-process mailbox
    pub fn with_mailbox(mut self, mailbox: MailboxReceiver) -> Self {
        self.mailbox = Some(AsyncMutex::new(mailbox));
        self.mailbox_open = AtomicBool::new(true);
        self
    }

    fn aggregator(&self) -> Option<Arc<SignalAggregator>> {
        match self.aggregator.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_last_seen(&self, id: Option<MessageId>) {
        let Some(id) = id else { return };
        match self.last_seen.lock() {
            Ok(mut guard) => *guard = Some(id),
            Err(poisoned) => *poisoned.into_inner() = Some(id),
        }
    }

    fn last_seen(&self) -> Option<MessageId> {
        match self.last_seen.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Build the aggregator once; later restarts keep the live message handle
    fn ensure_aggregator(&self) -> Result<Arc<SignalAggregator>> {
        if let Some(existing) = self.aggregator() {
            return Ok(existing);
        }
        let channel = self.config.require_monitor_channel()?;
        let webhook = self.config.require_signal_webhook()?;
        let policy = RolloverPolicy::from_config(&self.config.signal)?;
        let publisher = LivePublisher::new(self.client.clone(), webhook, policy);
        let aggregator = Arc::new(SignalAggregator::new(
            channel,
            self.config.signal.window(),
            publisher,
        ));
        match self.aggregator.lock() {
            Ok(mut guard) => *guard = Some(aggregator.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(aggregator.clone()),
        }
        Ok(aggregator)
    }

    async fn next_pushed(&self, wait: Duration) -> Option<InboundMessage> {
        let mailbox = match &self.mailbox {
            Some(mailbox) if self.mailbox_open.load(Ordering::SeqCst) => mailbox,
            _ => {
                tokio::time::sleep(wait).await;
                return None;
            }
        };
        let mut rx = mailbox.lock().await;
        tokio::select! {
            received = rx.recv() => {
                if received.is_none() {
                    info!(job = JOB_NAME, "Mailbox closed, polling history only");
                    self.mailbox_open.store(false, Ordering::SeqCst);
                }
                received
            }
            _ = tokio::time::sleep(wait) => None,
        }
    }

    async fn poll_history(&self, aggregator: &SignalAggregator) -> Result<usize> {
        let now = Utc::now();
        let messages = match self.last_seen() {
            Some(after) => {
                self.history
                    .messages_after(aggregator.channel_id(), &after)
                    .await?
            }
            None => {
                self.history
                    .messages_since(aggregator.channel_id(), now - self.config.signal.window())
                    .await?
            }
        };
        let newest = aggregator.ingest_batch(&messages, now).await;
        self.set_last_seen(newest);
        Ok(messages.len())
    }
}

#[async_trait]
impl Job for SignalJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn schedule(&self) -> Schedule {
        Schedule::Continuous
    }

    async fn startup(&self) -> Result<()> {
        self.config.require_bot_token()?;
        let aggregator = self.ensure_aggregator()?;

        let now = Utc::now();
        let newest = aggregator.rescan(self.history.as_ref(), now).await?;
        self.set_last_seen(newest);
        aggregator.publish_at(now).await;
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        let Some(aggregator) = self.aggregator() else {
            return self.startup().await;
        };
        let wait = Duration::from_secs(self.config.signal.poll_interval_seconds.max(1));

        match self.next_pushed(wait).await {
            Some(message) => {
                let summary = aggregator.ingest_at(&message, Utc::now()).await;
                if !summary.changed() {
                    return Ok(());
                }
                debug!(job = JOB_NAME, message_id = %message.id, "Pushed signal ingested");
            }
            None => {
                let fetched = self.poll_history(&aggregator).await?;
                debug!(job = JOB_NAME, fetched, "Polled channel history");
            }
        }

        aggregator.publish_at(Utc::now()).await;
        Ok(())
    }
}
