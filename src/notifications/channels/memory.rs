//! In-memory delivery target
//!
//! Keeps every channel's messages in a map and logs each call, so tests can
//! assert on exactly what the reconciler did. Channels can be removed,
//! messages deleted behind the reconciler's back, and calls slowed down.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{DeliveryError, DeliveryResult, DeliveryTarget};
use crate::models::MessageRef;
use crate::notifications::MessageContent;

/// One recorded call against the target
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryCall {
    Send {
        channel_id: String,
        message: MessageRef,
        ping: Option<String>,
    },
    Edit {
        channel_id: String,
        message: MessageRef,
    },
    Delete {
        channel_id: String,
        message: MessageRef,
    },
}

/// A message currently present in a channel
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub content: MessageContent,
    pub ping: Option<String>,
}

#[derive(Default)]
struct State {
    messages: BTreeMap<(String, MessageRef), StoredMessage>,
    missing_channels: HashSet<String>,
    slow_channels: HashSet<String>,
    calls: Vec<DeliveryCall>,
}

/// Recording delivery target backed by memory
pub struct MemoryDeliveryTarget {
    state: Mutex<State>,
    next_id: AtomicU64,
    slow_delay: Duration,
}

impl Default for MemoryDeliveryTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeliveryTarget {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            slow_delay: Duration::from_secs(3600),
        }
    }

    /// Set how long calls against slow channels hang
    pub fn with_slow_delay(mut self, delay: Duration) -> Self {
        self.slow_delay = delay;
        self
    }

    /// Make every call against a channel fail with `NotFound`
    pub fn remove_channel(&self, channel_id: &str) {
        let mut state = self.lock();
        state.missing_channels.insert(channel_id.to_string());
        state.messages.retain(|(channel, _), _| channel != channel_id);
    }

    /// Make every call against a channel hang for the slow delay
    pub fn slow_channel(&self, channel_id: &str) {
        self.lock().slow_channels.insert(channel_id.to_string());
    }

    /// Delete a message without recording a call, as a moderator would
    pub fn delete_externally(&self, channel_id: &str, message: &MessageRef) -> bool {
        self.lock()
            .messages
            .remove(&(channel_id.to_string(), message.clone()))
            .is_some()
    }

    /// Get a message currently present in a channel
    pub fn message(&self, channel_id: &str, message: &MessageRef) -> Option<StoredMessage> {
        self.lock()
            .messages
            .get(&(channel_id.to_string(), message.clone()))
            .cloned()
    }

    /// Messages currently present in a channel
    pub fn messages_in(&self, channel_id: &str) -> Vec<(MessageRef, StoredMessage)> {
        self.lock()
            .messages
            .iter()
            .filter(|((channel, _), _)| channel == channel_id)
            .map(|((_, message), stored)| (message.clone(), stored.clone()))
            .collect()
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.lock().calls.clone()
    }

    /// Number of content messages created (pings excluded)
    pub fn creates(&self) -> usize {
        self.count(|call| matches!(call, DeliveryCall::Send { ping: None, .. }))
    }

    /// Number of transient ping messages created
    pub fn pings(&self) -> usize {
        self.count(|call| matches!(call, DeliveryCall::Send { ping: Some(_), .. }))
    }

    /// Number of successful edits
    pub fn edits(&self) -> usize {
        self.count(|call| matches!(call, DeliveryCall::Edit { .. }))
    }

    /// Number of successful deletes
    pub fn deletes(&self) -> usize {
        self.count(|call| matches!(call, DeliveryCall::Delete { .. }))
    }

    fn count(&self, predicate: impl Fn(&DeliveryCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, channel_id: &str) -> DeliveryResult<()> {
        let slow = {
            let state = self.lock();
            if state.missing_channels.contains(channel_id) {
                return Err(DeliveryError::NotFound(format!("channel {channel_id}")));
            }
            state.slow_channels.contains(channel_id)
        };

        if slow {
            tokio::time::sleep(self.slow_delay).await;
        }

        Ok(())
    }
}

#[async_trait]
impl DeliveryTarget for MemoryDeliveryTarget {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &MessageContent,
        ping: Option<&str>,
    ) -> DeliveryResult<MessageRef> {
        self.enter(channel_id).await?;

        let message = MessageRef::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        let mut state = self.lock();
        state.messages.insert(
            (channel_id.to_string(), message.clone()),
            StoredMessage {
                content: content.clone(),
                ping: ping.map(str::to_string),
            },
        );
        state.calls.push(DeliveryCall::Send {
            channel_id: channel_id.to_string(),
            message: message.clone(),
            ping: ping.map(str::to_string),
        });

        Ok(message)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message: &MessageRef,
        content: &MessageContent,
    ) -> DeliveryResult<()> {
        self.enter(channel_id).await?;

        let mut state = self.lock();
        let key = (channel_id.to_string(), message.clone());
        let Some(stored) = state.messages.get_mut(&key) else {
            return Err(DeliveryError::NotFound(format!(
                "message {message} in channel {channel_id}"
            )));
        };

        stored.content = content.without_mentions();
        stored.ping = None;
        state.calls.push(DeliveryCall::Edit {
            channel_id: channel_id.to_string(),
            message: message.clone(),
        });

        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message: &MessageRef) -> DeliveryResult<()> {
        self.enter(channel_id).await?;

        let mut state = self.lock();
        if state
            .messages
            .remove(&(channel_id.to_string(), message.clone()))
            .is_none()
        {
            return Err(DeliveryError::NotFound(format!(
                "message {message} in channel {channel_id}"
            )));
        }

        state.calls.push(DeliveryCall::Delete {
            channel_id: channel_id.to_string(),
            message: message.clone(),
        });

        Ok(())
    }
}
