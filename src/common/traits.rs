//! Trait definitions for external collaborators
//!
//! Every remote system the pipelines talk to sits behind one of these traits
//! so jobs can be driven against mocks in tests.
//!
//! Implementations report failures through `MonitorError` (or `SinkError`
//! for message sinks) and leave retry decisions to their callers. The
//! concrete HTTP-backed types live next to the pipeline that owns them:
//! `dispatch::webhook`, `balance::oracle`, `balance::price`,
//! `ledger::loader` and `signal::history`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::errors::{Result, SinkError};
use super::types::{Asset, MessageId};
use crate::dispatch::messages::OutboundMessage;
use crate::ledger::types::LedgerEntry;
use crate::signal::inbound::InboundMessage;

/// Outbound messaging endpoint (one webhook per target)
///
/// Implementations perform exactly one request per call; retries live in
/// `DispatchClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Create a new message and return its id
    ///
    /// # Arguments
    /// * `target` - Webhook URL the message is posted to
    /// * `message` - Content and embeds to send
    async fn create(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> std::result::Result<MessageId, SinkError>;

    /// Replace the content of an existing message
    ///
    /// A message deleted on the remote side yields `SinkError::NotFound`.
    ///
    /// # Arguments
    /// * `target` - Webhook URL the message was created through
    /// * `message_id` - Id returned by an earlier `create`
    /// * `message` - Replacement content
    async fn edit(
        &self,
        target: &str,
        message_id: &MessageId,
        message: &OutboundMessage,
    ) -> std::result::Result<(), SinkError>;
}

/// Source of wallet balances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Balance of `asset` held by `wallet`, in whole units
    ///
    /// A wallet without a token account for `asset` holds zero.
    ///
    /// # Arguments
    /// * `wallet` - Base58 account address
    /// * `asset` - Native SOL or one of the tracked token mints
    async fn balance(&self, wallet: &str, asset: Asset) -> Result<Decimal>;
}

/// Source of USD prices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current USD price of one unit of `asset`
    async fn usd_price(&self, asset: Asset) -> Result<Decimal>;
}

/// Source of trade ledger records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Load every available record, normalized to UTC
    async fn load(&self) -> Result<Vec<LedgerEntry>>;
}

/// Read access to a channel's message history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages created at or after `since`, oldest first
    ///
    /// # Arguments
    /// * `channel_id` - Channel to read
    /// * `since` - Earliest creation time to include
    async fn messages_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>>;

    /// Messages newer than `after`, oldest first
    ///
    /// Pages through the history until a short page is returned.
    ///
    /// # Arguments
    /// * `channel_id` - Channel to read
    /// * `after` - Last message already seen
    async fn messages_after(
        &self,
        channel_id: &str,
        after: &MessageId,
    ) -> Result<Vec<InboundMessage>>;
}
