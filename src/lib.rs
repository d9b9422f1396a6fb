//! SharpMonitor Library
//!
//! Monitoring pipelines for a copy-trading operation: block-difference
//! signal statistics, wallet balance alerts and multi-timeframe wallet
//! performance reports, all published to Discord webhooks and kept alive by
//! a supervisor.

pub mod balance;
pub mod common;
pub mod config;
pub mod dispatch;
pub mod ledger;
pub mod signal;
pub mod supervisor;

// Re-export commonly used types
pub use common::errors::{MonitorError, Result, SinkError};
pub use common::retry::{BackoffPolicy, RecordingSleeper, Sleeper, TokioSleeper};
pub use common::traits::{BalanceOracle, HistorySource, LedgerSource, MessageSink, PriceFeed};
pub use common::types::{Asset, MessageId};
pub use config::types::AppConfig;

// Pipelines
pub use balance::{
    BalanceJob, CoinGeckoPriceFeed, ConfiguredOracle, EmptyCheckJob, PnlBaseline, RpcBalanceOracle,
};
pub use dispatch::{
    Delivery, DispatchClient, Embed, LivePublisher, OutboundMessage, PublishOutcome,
    RolloverPolicy, WebhookSink,
};
pub use ledger::{LedgerJob, SessionDirectory, Timeframe, TimeframeResult, WalletPerformance};
pub use signal::{DiscordChannelHistory, EventWindow, Observation, SignalJob, SignalStats};
pub use supervisor::{Job, JobState, JobStatus, Schedule, StatusBoard, Supervisor, SupervisorSettings};
