//! Outbound message types
//!
//! Mirrors the subset of the Discord message/embed object the reports use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discord limits enforced when building messages
pub mod limits {
    pub const EMBEDS_MAX: usize = 10;
    pub const FIELDS_MAX: usize = 25;
    pub const FIELD_VALUE_MAX: usize = 1024;
    pub const DESCRIPTION_MAX: usize = 4096;
}

/// Common report colours
pub mod colors {
    pub const BLUE: u32 = 0x3498DB;
    pub const LIGHT_BLUE: u32 = 0x03B2F8;
    pub const GREEN: u32 = 0x00FF00;
    pub const LIGHT_GREEN: u32 = 0x90EE90;
    pub const WHITE: u32 = 0xFFFFFF;
    pub const ORANGE: u32 = 0xFFA500;
    pub const RED: u32 = 0xFF0000;
    pub const GRAY: u32 = 0x808080;
}

/// A named field inside an embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Embed footer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Rich embed with title, description, colour and ordered fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let mut description = description.into();
        truncate_chars(&mut description, limits::DESCRIPTION_MAX);
        self.description = Some(description);
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    /// Append a field; fields past the Discord limit are dropped
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        if self.fields.len() >= limits::FIELDS_MAX {
            return self;
        }
        let mut value = value.into();
        truncate_chars(&mut value, limits::FIELD_VALUE_MAX);
        self.fields.push(EmbedField {
            name: name.into(),
            value,
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Value of the first field with the given name
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// File uploaded alongside a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn csv(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "text/csv".to_string(),
            bytes,
        }
    }
}

/// Message sent to (or edited on) the messaging endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip)]
    pub attachment: Option<Attachment>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Append an embed; embeds past the Discord limit are dropped
    pub fn with_embed(mut self, embed: Embed) -> Self {
        if self.embeds.len() < limits::EMBEDS_MAX {
            self.embeds.push(embed);
        }
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Title of the first embed, used in logs
    pub fn summary(&self) -> &str {
        self.embeds
            .first()
            .and_then(|e| e.title.as_deref())
            .or(self.content.as_deref())
            .unwrap_or("<untitled>")
    }
}

fn truncate_chars(text: &mut String, max: usize) {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
}
