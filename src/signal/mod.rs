//! Block-difference signal monitoring
//!
//! Inbound channel messages are parsed into observations, kept in a sliding
//! window, summarized, and published as a live dashboard message.

pub mod aggregator;
pub mod history;
pub mod inbound;
pub mod job;
pub mod report;
pub mod stats;
pub mod window;

pub use aggregator::{IngestSummary, SignalAggregator};
pub use history::DiscordChannelHistory;
pub use inbound::{FieldOutcome, GrpcSource, InboundEmbed, InboundField, InboundMessage};
pub use job::SignalJob;
pub use stats::{compute, SignalStats, StatsReport};
pub use window::{EventWindow, Observation, SharedWindow, WindowSnapshot};
