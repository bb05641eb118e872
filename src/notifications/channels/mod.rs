//! Delivery targets for rendered feed messages
//!
//! A target owns three operations on a channel: post a message, edit a
//! previously posted one, and delete one. The Discord REST client is the
//! production target; the in-memory target records every call for tests.

pub mod discord;
pub mod memory;

use async_trait::async_trait;

use super::MessageContent;
use crate::models::MessageRef;

pub use discord::DiscordTarget;
pub use memory::{DeliveryCall, MemoryDeliveryTarget};

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors that can occur during delivery
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Channel or message no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bot lacks permission on the channel
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Target answered with an unexpected status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Delivery did not finish in time
    #[error("Delivery timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid target configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error
    #[error("Delivery error: {0}")]
    Other(String),
}

impl DeliveryError {
    /// Check whether a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::Forbidden(_) | Self::InvalidConfig(_) | Self::Other(_) => false,
        }
    }
}

/// A place rendered messages can be delivered to
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Target name for logging
    fn name(&self) -> &str;

    /// Post a new message, optionally mentioning a role
    async fn send_message(
        &self,
        channel_id: &str,
        content: &MessageContent,
        ping: Option<&str>,
    ) -> DeliveryResult<MessageRef>;

    /// Replace the content of an existing message
    ///
    /// Returns `DeliveryError::NotFound` when the message or channel is gone.
    async fn edit_message(
        &self,
        channel_id: &str,
        message: &MessageRef,
        content: &MessageContent,
    ) -> DeliveryResult<()>;

    /// Delete a message; best-effort
    async fn delete_message(&self, channel_id: &str, message: &MessageRef) -> DeliveryResult<()>;
}
