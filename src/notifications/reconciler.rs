//! Subscription reconciliation
//!
//! One pass takes a feed's classified entities and brings every matching
//! subscription's persistent message up to date: edit the message on record,
//! or create a replacement and persist its reference. Subscriptions are
//! processed concurrently and a failure in one never affects the others.
//! Two deliveries to the same subscription never overlap, so a manual
//! trigger racing a scheduled pass edits the message the other created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{DeliveryError, DeliveryTarget, MessageContent, PingJanitor};
use crate::feeds::{Entity, Feed};
use crate::models::{MessageRef, ReconcileReport, Subscription};
use crate::scheduler::change::ChangeSet;
use crate::storage::SharedSubscriptionStore;

/// Reconciliation limits
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Subscriptions delivered at the same time
    pub max_concurrent: usize,
    /// Upper bound for one subscription's delivery, ping included
    pub delivery_timeout: Duration,
    /// Lifetime of a ping message
    pub ping_delete_after: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            delivery_timeout: Duration::from_secs(15),
            ping_delete_after: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_concurrent: config.delivery.max_concurrent.max(1),
            delivery_timeout: config.delivery_timeout(),
            ping_delete_after: config.ping_delete_after(),
        }
    }
}

/// Result of one subscription's delivery
enum Outcome {
    Skipped,
    Delivered { persisted: bool },
    Failed(String),
}

/// Brings subscription messages in line with the current entities
#[derive(Clone)]
pub struct Reconciler {
    target: Arc<dyn DeliveryTarget>,
    store: SharedSubscriptionStore,
    janitor: Arc<PingJanitor>,
    config: ReconcilerConfig,
    in_flight: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Reconciler {
    pub fn new(
        target: Arc<dyn DeliveryTarget>,
        store: SharedSubscriptionStore,
        janitor: Arc<PingJanitor>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            target,
            store,
            janitor,
            config,
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Deliver the entities to every subscription
    ///
    /// `changes` is `None` for manual reconciliation, which never pings.
    pub async fn reconcile<F: Feed>(
        &self,
        feed: &F,
        entities: &[Entity<F>],
        subscriptions: Vec<Subscription>,
        changes: Option<&ChangeSet>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let outcomes: Vec<(String, Outcome)> = stream::iter(subscriptions)
            .map(|subscription| async move {
                let id = subscription.subscription_id.clone();
                let outcome = match tokio::time::timeout(
                    self.config.delivery_timeout,
                    self.deliver(feed, entities, &subscription, changes, now),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Failed(
                        DeliveryError::Timeout(self.config.delivery_timeout.as_secs()).to_string(),
                    ),
                };
                (id, outcome)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut report = ReconcileReport::default();
        for (subscription_id, outcome) in outcomes {
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Delivered { persisted } => {
                    report.attempted += 1;
                    report.succeeded += 1;
                    if !persisted {
                        report.persistence_failures += 1;
                    }
                }
                Outcome::Failed(reason) => {
                    tracing::warn!(
                        feed = feed.kind().as_str(),
                        subscription_id = %subscription_id,
                        reason = %reason,
                        "Delivery failed"
                    );
                    report.record_failure(subscription_id, reason);
                }
            }
        }

        report
    }

    async fn deliver<F: Feed>(
        &self,
        feed: &F,
        entities: &[Entity<F>],
        subscription: &Subscription,
        changes: Option<&ChangeSet>,
        now: DateTime<Utc>,
    ) -> Outcome {
        let criteria = match feed.parse_criteria(&subscription.match_criteria) {
            Ok(criteria) => criteria,
            Err(e) => return Outcome::Failed(format!("invalid criteria: {e}")),
        };

        let selected = feed.select(&criteria, entities);
        if selected.is_empty() {
            return Outcome::Skipped;
        }

        let content = feed.render(&selected, now);
        let channel = subscription.target_channel_id.as_str();

        let _guard = self.lock_subscription(&subscription.subscription_id).await;
        let last_message_ref = self.current_ref(subscription);

        let persisted = match self
            .upsert_message(subscription, last_message_ref.as_ref(), channel, &content)
            .await
        {
            Ok(persisted) => persisted,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        let Some(changes) = changes else {
            return Outcome::Delivered { persisted };
        };

        if changes.baseline || !feed.wants_ping(&selected, changes) {
            return Outcome::Delivered { persisted };
        }

        if let Some(role) = subscription.ping_target_id.as_deref() {
            let ping = MessageContent::text(feed.ping_text(&selected));
            match self.target.send_message(channel, &ping, Some(role)).await {
                Ok(message) => {
                    self.janitor
                        .schedule(channel, message, self.config.ping_delete_after);
                }
                Err(e) => return Outcome::Failed(format!("ping failed: {e}")),
            }
        }

        Outcome::Delivered { persisted }
    }

    /// Edit the recorded message or replace it; returns whether the reference is durable
    async fn upsert_message(
        &self,
        subscription: &Subscription,
        last_message_ref: Option<&MessageRef>,
        channel: &str,
        content: &MessageContent,
    ) -> Result<bool, DeliveryError> {
        if let Some(existing) = last_message_ref {
            match self.target.edit_message(channel, existing, content).await {
                Ok(()) => return Ok(true),
                Err(e) => {
                    tracing::debug!(
                        subscription_id = %subscription.subscription_id,
                        message_id = %existing,
                        error = %e,
                        "Edit failed, creating a replacement message"
                    );
                }
            }
        }

        let created = self.target.send_message(channel, content, None).await?;
        Ok(self.persist_ref(subscription, &created))
    }

    /// Exclusive access to one subscription's message
    async fn lock_subscription(&self, subscription_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(in_flight.entry(subscription_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Reference on record now, which may be newer than the listed one
    fn current_ref(&self, subscription: &Subscription) -> Option<MessageRef> {
        match self.store.get(&subscription.subscription_id) {
            Ok(Some(stored)) => stored.last_message_ref,
            Ok(None) => subscription.last_message_ref.clone(),
            Err(e) => {
                tracing::debug!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Cannot re-read subscription, using listed reference"
                );
                subscription.last_message_ref.clone()
            }
        }
    }

    fn persist_ref(&self, subscription: &Subscription, message: &MessageRef) -> bool {
        match self
            .store
            .update_message_ref(&subscription.subscription_id, message)
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription.subscription_id,
                    message_id = %message,
                    error = %e,
                    "Message created but its reference could not be stored"
                );
                false
            }
        }
    }
}
