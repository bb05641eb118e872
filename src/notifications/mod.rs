//! Delivery of feed state to subscriber channels
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      Reconciler                            │
//! │  - Criteria matching                       │
//! │  - Edit-vs-create                          │
//! │  - Message reference persistence           │
//! │  - Per-subscription failure isolation      │
//! └────────────────────────────────────────────┘
//!           │                     │
//!           ▼                     ▼
//!   ┌───────────────┐     ┌───────────────┐
//!   │ DeliveryTarget│     │ PingJanitor   │
//!   │ (Discord/mem) │◄────│ (cleanup)     │
//!   └───────────────┘     └───────────────┘
//! ```
//!
//! Content messages are persistent and edited in place on every change.
//! Role mentions go out as separate transient messages that the janitor
//! deletes after a short delay.

pub mod channels;
pub mod janitor;
pub mod reconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use channels::{DeliveryError, DeliveryTarget};
pub use janitor::PingJanitor;
pub use reconciler::{Reconciler, ReconcilerConfig};

/// Maximum embed description length accepted by Discord
pub const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Maximum number of embed fields accepted by Discord
pub const MAX_FIELDS: usize = 25;

/// Rendered message body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Plain text above the embed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Rich embed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

impl MessageContent {
    /// Content consisting of a single embed
    pub fn embed(embed: Embed) -> Self {
        Self {
            text: None,
            embed: Some(embed),
        }
    }

    /// Content consisting of plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            embed: None,
        }
    }

    /// Copy of this content with mention tokens removed from every text part
    pub fn without_mentions(&self) -> Self {
        use crate::utils::strip_mentions;

        Self {
            text: self.text.as_deref().map(strip_mentions),
            embed: self.embed.as_ref().map(|embed| Embed {
                title: strip_mentions(&embed.title),
                description: embed.description.as_deref().map(strip_mentions),
                fields: embed
                    .fields
                    .iter()
                    .map(|field| EmbedField {
                        name: strip_mentions(&field.name),
                        value: strip_mentions(&field.value),
                        inline: field.inline,
                    })
                    .collect(),
                color: embed.color,
                footer: embed.footer.as_deref().map(strip_mentions),
                timestamp: embed.timestamp,
            }),
        }
    }
}

/// Rich message embed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description, truncated to the platform limit
    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.description = Some(crate::utils::truncate_text(
            description.as_ref(),
            MAX_DESCRIPTION_CHARS,
        ));
        self
    }

    /// Add a field; fields past the platform limit are dropped
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        if self.fields.len() < MAX_FIELDS {
            self.fields.push(EmbedField {
                name: name.into(),
                value: value.into(),
                inline,
            });
        }
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One name/value pair inside an embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}
