//! Discord REST delivery target
//!
//! Posts, edits and deletes channel messages through the bot API.
//!
//! # Payload Format
//!
//! ```json
//! {
//!   "content": "<@&123456> Baro Ki'Teer has arrived",
//!   "embeds": [{ "title": "...", "fields": [...], "color": 5793266 }],
//!   "allowed_mentions": { "parse": [], "roles": ["123456"] }
//! }
//! ```
//!
//! Mentions are only ever allowed for the single role passed as `ping`.
//! Edits always clear `content` and allow no mentions at all.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{DeliveryError, DeliveryResult, DeliveryTarget};
use crate::config::DeliveryConfig;
use crate::models::MessageRef;
use crate::notifications::{Embed, MessageContent};

/// Discord bot API delivery target
pub struct DiscordTarget {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

impl DiscordTarget {
    /// Create a target for an API base and bot token
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> DeliveryResult<Self> {
        if token.trim().is_empty() {
            return Err(DeliveryError::InvalidConfig("bot token is empty".to_string()));
        }

        url::Url::parse(api_base)
            .map_err(|e| DeliveryError::InvalidConfig(format!("api base '{api_base}': {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("DiscordBot (lotus-relay, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| DeliveryError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Create a target from the delivery configuration
    pub fn from_config(config: &DeliveryConfig) -> DeliveryResult<Self> {
        let token = config
            .bot_token
            .as_deref()
            .ok_or_else(|| DeliveryError::InvalidConfig("DISCORD_BOT_TOKEN is not set".to_string()))?;

        Self::new(&config.api_base, token, Duration::from_secs(config.timeout_secs))
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.api_base)
    }

    fn message_url(&self, channel_id: &str, message: &MessageRef) -> String {
        format!("{}/channels/{channel_id}/messages/{message}", self.api_base)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Build the create payload
    fn build_create_payload(content: &MessageContent, ping: Option<&str>) -> serde_json::Value {
        let text = match (ping, content.text.as_deref()) {
            (Some(role), Some(text)) => format!("<@&{role}> {text}"),
            (Some(role), None) => format!("<@&{role}>"),
            (None, Some(text)) => text.to_string(),
            (None, None) => String::new(),
        };

        let roles: Vec<&str> = ping.into_iter().collect();

        serde_json::json!({
            "content": text,
            "embeds": content.embed.iter().map(embed_json).collect::<Vec<_>>(),
            "allowed_mentions": { "parse": [], "roles": roles },
        })
    }

    /// Build the edit payload; persistent messages never carry mentions
    fn build_edit_payload(content: &MessageContent) -> serde_json::Value {
        let content = content.without_mentions();

        serde_json::json!({
            "content": content.text.unwrap_or_default(),
            "embeds": content.embed.iter().map(embed_json).collect::<Vec<_>>(),
            "allowed_mentions": { "parse": [] },
        })
    }

    async fn check(response: Response, what: &str) -> DeliveryResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        Err(match status {
            StatusCode::NOT_FOUND => DeliveryError::NotFound(what.to_string()),
            StatusCode::FORBIDDEN => DeliveryError::Forbidden(what.to_string()),
            _ => DeliveryError::Status {
                status: status.as_u16(),
                body,
            },
        })
    }
}

fn embed_json(embed: &Embed) -> serde_json::Value {
    let mut value = serde_json::json!({
        "title": embed.title,
        "fields": embed.fields,
    });

    if let Some(description) = &embed.description {
        value["description"] = serde_json::json!(description);
    }
    if let Some(color) = embed.color {
        value["color"] = serde_json::json!(color);
    }
    if let Some(footer) = &embed.footer {
        value["footer"] = serde_json::json!({ "text": footer });
    }
    if let Some(timestamp) = embed.timestamp {
        value["timestamp"] = serde_json::json!(timestamp.to_rfc3339());
    }

    value
}

#[async_trait]
impl DeliveryTarget for DiscordTarget {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &MessageContent,
        ping: Option<&str>,
    ) -> DeliveryResult<MessageRef> {
        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header("Authorization", self.auth())
            .json(&Self::build_create_payload(content, ping))
            .send()
            .await?;

        let response = Self::check(response, &format!("channel {channel_id}")).await?;
        let created: CreatedMessage = response.json().await?;

        tracing::debug!(channel_id = channel_id, message_id = %created.id, "Message created");
        Ok(MessageRef::new(created.id))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message: &MessageRef,
        content: &MessageContent,
    ) -> DeliveryResult<()> {
        let response = self
            .client
            .patch(self.message_url(channel_id, message))
            .header("Authorization", self.auth())
            .json(&Self::build_edit_payload(content))
            .send()
            .await?;

        Self::check(response, &format!("message {message} in channel {channel_id}")).await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message: &MessageRef) -> DeliveryResult<()> {
        let response = self
            .client
            .delete(self.message_url(channel_id, message))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(response, &format!("message {message} in channel {channel_id}")).await?;
        Ok(())
    }
}
