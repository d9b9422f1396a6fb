//! Outbound notification delivery
//!
//! - `messages`: embed and message builders
//! - `webhook`: one-request-per-call webhook sink
//! - `client`: retry, rate-limit and batch pacing on top of a sink
//! - `live`: edit-in-place dashboard messages with daily rollover

pub mod client;
pub mod live;
pub mod messages;
pub mod webhook;

pub use client::{BatchReport, Delivery, DispatchClient};
pub use live::{LiveMessageHandle, LivePublisher, PublishOutcome, RolloverPolicy};
pub use messages::{colors, Attachment, Embed, EmbedField, OutboundMessage};
pub use webhook::WebhookSink;
