//! Inbound messages from the monitored channel and their field parsing

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::types::MessageId;

/// Field carrying the block difference of a signal
pub const BLOCK_DIFFERENCE_FIELD: &str = "Block Difference";

/// Field carrying the gRPC source of a signal
pub const GRPC_FIELD: &str = "GRPC";

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("static integer pattern compiles"));

/// A single named field/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundField {
    pub name: String,
    pub value: String,
}

/// Structured block inside an inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmbed {
    #[serde(default)]
    pub fields: Vec<InboundField>,
}

/// Message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub channel_id: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub embeds: Vec<InboundEmbed>,
}

/// Source tag attached to a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrpcSource {
    InHouse,
    Custom,
}

impl GrpcSource {
    pub const ALL: [GrpcSource; 2] = [GrpcSource::InHouse, GrpcSource::Custom];

    /// Parse the exact field value; anything else is not a known source
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "In-House" => Some(GrpcSource::InHouse),
            "Custom" => Some(GrpcSource::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrpcSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrpcSource::InHouse => write!(f, "In-House"),
            GrpcSource::Custom => write!(f, "Custom"),
        }
    }
}

/// Result of looking at one inbound field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    BlockDifference(i64),
    Grpc(GrpcSource),
    /// Known field whose value did not parse
    Malformed { field: String, value: String },
    /// Field we do not track
    Ignored,
}

/// Classify a single field
pub fn classify_field(field: &InboundField) -> FieldOutcome {
    match field.name.as_str() {
        BLOCK_DIFFERENCE_FIELD => match parse_first_integer(&field.value) {
            Some(n) => FieldOutcome::BlockDifference(n),
            None => FieldOutcome::Malformed {
                field: field.name.clone(),
                value: field.value.clone(),
            },
        },
        GRPC_FIELD => match GrpcSource::parse(&field.value) {
            Some(source) => FieldOutcome::Grpc(source),
            None => FieldOutcome::Ignored,
        },
        _ => FieldOutcome::Ignored,
    }
}

/// First run of digits in `text`, if any
pub fn parse_first_integer(text: &str) -> Option<i64> {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Signal extracted from one embed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedSignal {
    /// Every parsed `Block Difference` field, in field order
    pub block_differences: Vec<i64>,
    pub grpc: Option<GrpcSource>,
    pub malformed: usize,
}

impl EmbedSignal {
    pub fn is_empty(&self) -> bool {
        self.block_differences.is_empty() && self.grpc.is_none()
    }
}

/// Extract the tracked fields of an embed
pub fn extract_signal(embed: &InboundEmbed) -> EmbedSignal {
    let mut signal = EmbedSignal::default();
    for field in &embed.fields {
        match classify_field(field) {
            FieldOutcome::BlockDifference(n) => signal.block_differences.push(n),
            FieldOutcome::Grpc(source) => signal.grpc = Some(source),
            FieldOutcome::Malformed { .. } => signal.malformed += 1,
            FieldOutcome::Ignored => {}
        }
    }
    signal
}
