//! Retrying delivery on top of a message sink
//!
//! Delivery is best effort: every failure ends in a logged `Delivery` outcome,
//! never in an error returned to the caller.
//!
//! Transient failures (network errors, 5xx responses, rate limits) are
//! retried up to the policy's attempt ceiling. A rate-limit response that
//! carries a retry hint is waited out for exactly that long plus a small
//! buffer; everything else follows exponential backoff. Edits of deleted
//! messages come back as `Delivery::NotFound` so callers can recreate them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::messages::OutboundMessage;
use crate::common::errors::SinkError;
use crate::common::retry::{BackoffPolicy, Sleeper, TokioSleeper, DEFAULT_RATE_LIMIT_BUFFER};
use crate::common::traits::MessageSink;
use crate::common::types::MessageId;
use crate::config::types::DispatchConfig;

/// Outcome of a delivery attempt sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    Delivered { value: T, attempts: u32 },
    /// Edit target no longer exists
    NotFound,
    /// Retry budget spent or failure not retryable; the message was dropped
    Dropped { attempts: u32, last_error: SinkError },
}

impl<T> Delivery<T> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }

    pub fn value(self) -> Option<T> {
        match self {
            Delivery::Delivered { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Counts from a batch send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Sends messages with exponential backoff and rate-limit handling
///
/// Cloning is cheap; clones share the underlying sink and sleeper.
#[derive(Clone)]
pub struct DispatchClient {
    sink: Arc<dyn MessageSink>,
    policy: BackoffPolicy,
    rate_limit_buffer: Duration,
    batch_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for DispatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchClient")
            .field("policy", &self.policy)
            .field("rate_limit_buffer", &self.rate_limit_buffer)
            .field("batch_delay", &self.batch_delay)
            .finish()
    }
}

impl DispatchClient {
    pub fn new(sink: Arc<dyn MessageSink>, policy: BackoffPolicy) -> Self {
        Self {
            sink,
            policy,
            rate_limit_buffer: DEFAULT_RATE_LIMIT_BUFFER,
            batch_delay: Duration::from_millis(1500),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Build a client using the backoff, buffer and batch pause from `config`
    pub fn from_config(sink: Arc<dyn MessageSink>, config: &DispatchConfig) -> Self {
        Self::new(sink, config.backoff())
            .with_rate_limit_buffer(Duration::from_millis(config.rate_limit_buffer_ms))
            .with_batch_delay(Duration::from_millis(config.batch_delay_ms))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_rate_limit_buffer(mut self, buffer: Duration) -> Self {
        self.rate_limit_buffer = buffer;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Create a new message
    ///
    /// # Arguments
    /// * `target` - Webhook URL to post through
    /// * `message` - Message to create
    ///
    /// Returns `Delivery::Delivered` with the new message id, or
    /// `Delivery::Dropped` once retries are spent.
    pub async fn send(&self, target: &str, message: &OutboundMessage) -> Delivery<MessageId> {
        self.with_retry("create", message.summary(), || {
            self.sink.create(target, message)
        })
        .await
    }

    /// Edit an existing message; `NotFound` is returned without retrying
    ///
    /// # Arguments
    /// * `target` - Webhook URL the message was created through
    /// * `message_id` - Id of the message to replace
    /// * `message` - Replacement content
    pub async fn edit(
        &self,
        target: &str,
        message_id: &MessageId,
        message: &OutboundMessage,
    ) -> Delivery<()> {
        self.with_retry("edit", message.summary(), || {
            self.sink.edit(target, message_id, message)
        })
        .await
    }

    /// Send independent messages with a fixed pause between them
    ///
    /// A dropped message does not stop the batch.
    pub async fn send_batch(&self, target: &str, messages: &[OutboundMessage]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, message) in messages.iter().enumerate() {
            if i > 0 {
                self.sleeper.sleep(self.batch_delay).await;
            }
            if self.send(target, message).await.is_delivered() {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }
        info!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Batch sent"
        );
        report
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, summary: &str, mut call: F) -> Delivery<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match call().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(op, summary, attempts, "Delivered after retries");
                    } else {
                        debug!(op, summary, "Delivered");
                    }
                    return Delivery::Delivered { value, attempts };
                }
                Err(SinkError::NotFound(what)) => {
                    warn!(op, summary, target = %what, "Delivery target not found");
                    return Delivery::NotFound;
                }
                Err(err) => err,
            };

            if !err.is_retryable() || !self.policy.has_attempts_left(attempts) {
                error!(op, summary, attempts, error = %err, "Dropping message");
                return Delivery::Dropped {
                    attempts,
                    last_error: err,
                };
            }

            let wait = match &err {
                SinkError::RateLimited { retry_after } => *retry_after + self.rate_limit_buffer,
                _ => self.policy.delay_for(attempts - 1),
            };
            warn!(
                op,
                summary,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Delivery failed, retrying"
            );
            self.sleeper.sleep(wait).await;
        }
    }
}
