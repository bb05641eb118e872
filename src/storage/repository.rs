//! Repository pattern for subscription storage
//!
//! The engine only sees the [`SubscriptionStore`] trait. SQLite backs it in
//! production; the in-memory store backs it in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Reconciler / Control API / CLI                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SubscriptionStore                         │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!         ┌─────────────────┐       ┌─────────────────┐
//!         │     SQLite      │       │     Memory      │
//!         │  Implementation │       │ Implementation  │
//!         └─────────────────┘       └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lotus_relay::storage::{SqliteSubscriptionStore, SubscriptionStore};
//!
//! let store = SqliteSubscriptionStore::new("data/subscriptions.db")?;
//! let subs = store.list_all(FeedKind::Trader)?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::{FeedKind, MessageRef, Subscription};

// ============================================================================
// Repository Trait
// ============================================================================

/// Durable record of subscriptions per feed
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions of a feed
    fn list_all(&self, feed: FeedKind) -> Result<Vec<Subscription>>;

    /// Subscriptions of a feed belonging to one community
    fn list_by_community(&self, feed: FeedKind, community_id: &str) -> Result<Vec<Subscription>>;

    /// Record the message currently representing a subscription
    fn update_message_ref(&self, subscription_id: &str, message: &MessageRef) -> Result<()>;

    /// Create or reconfigure the subscription for (feed, community, channel)
    ///
    /// Reconfiguration keeps the recorded message reference.
    fn upsert(
        &self,
        feed: FeedKind,
        community_id: &str,
        target_channel_id: &str,
        match_criteria: &serde_json::Value,
        ping_target_id: Option<&str>,
    ) -> Result<Subscription>;

    /// Delete a subscription; returns whether it existed
    fn delete(&self, subscription_id: &str) -> Result<bool>;

    /// Get a subscription by id
    fn get(&self, subscription_id: &str) -> Result<Option<Subscription>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SubscriptionStore
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteSubscriptionStore {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str = "subscription_id, feed_kind, community_id, target_channel_id, \
     match_criteria, ping_target_id, last_message_ref, created_at, updated_at";

impl SqliteSubscriptionStore {
    /// Open or create a store at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "Subscription store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS subscriptions (
                    subscription_id TEXT PRIMARY KEY,
                    feed_kind TEXT NOT NULL,
                    community_id TEXT NOT NULL,
                    target_channel_id TEXT NOT NULL,
                    match_criteria TEXT NOT NULL DEFAULT '{}',
                    ping_target_id TEXT,
                    last_message_ref TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (feed_kind, community_id, target_channel_id)
                );

                CREATE INDEX IF NOT EXISTS idx_subscriptions_feed
                    ON subscriptions(feed_kind);

                CREATE INDEX IF NOT EXISTS idx_subscriptions_community
                    ON subscriptions(feed_kind, community_id);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).context("Failed to prepare query")?;

        let rows = stmt
            .query_map(args, RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read subscriptions")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let subscription_id = row.subscription_id.clone();
                match row.into_subscription() {
                    Ok(subscription) => Some(subscription),
                    Err(e) => {
                        tracing::warn!(
                            subscription_id = %subscription_id,
                            error = %format!("{e:#}"),
                            "Skipping undecodable subscription row"
                        );
                        None
                    }
                }
            })
            .collect())
    }
}

/// Row as stored, before JSON and timestamp decoding
struct RawRow {
    subscription_id: String,
    feed_kind: String,
    community_id: String,
    target_channel_id: String,
    match_criteria: String,
    ping_target_id: Option<String>,
    last_message_ref: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            subscription_id: row.get(0)?,
            feed_kind: row.get(1)?,
            community_id: row.get(2)?,
            target_channel_id: row.get(3)?,
            match_criteria: row.get(4)?,
            ping_target_id: row.get(5)?,
            last_message_ref: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_subscription(self) -> Result<Subscription> {
        let feed = self
            .feed_kind
            .parse::<FeedKind>()
            .map_err(|e| anyhow!("Subscription {}: {e}", self.subscription_id))?;

        let match_criteria = serde_json::from_str(&self.match_criteria).with_context(|| {
            format!("Subscription {} has invalid criteria JSON", self.subscription_id)
        })?;

        Ok(Subscription {
            feed,
            community_id: self.community_id,
            target_channel_id: self.target_channel_id,
            match_criteria,
            ping_target_id: self.ping_target_id,
            last_message_ref: self.last_message_ref.map(MessageRef),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            subscription_id: self.subscription_id,
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn list_all(&self, feed: FeedKind) -> Result<Vec<Subscription>> {
        self.query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE feed_kind = ?1 ORDER BY created_at, subscription_id"
            ),
            &[&feed.as_str()],
        )
    }

    fn list_by_community(&self, feed: FeedKind, community_id: &str) -> Result<Vec<Subscription>> {
        self.query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM subscriptions \
                 WHERE feed_kind = ?1 AND community_id = ?2 ORDER BY created_at, subscription_id"
            ),
            &[&feed.as_str(), &community_id],
        )
    }

    fn update_message_ref(&self, subscription_id: &str, message: &MessageRef) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE subscriptions SET last_message_ref = ?1, updated_at = ?2 WHERE subscription_id = ?3",
                params![message.as_str(), Utc::now().to_rfc3339(), subscription_id],
            )
            .context("Failed to update message reference")?;

        if changed == 0 {
            anyhow::bail!("Subscription {subscription_id} not found");
        }

        Ok(())
    }

    fn upsert(
        &self,
        feed: FeedKind,
        community_id: &str,
        target_channel_id: &str,
        match_criteria: &serde_json::Value,
        ping_target_id: Option<&str>,
    ) -> Result<Subscription> {
        let criteria = serde_json::to_string(match_criteria)?;
        let now = Utc::now().to_rfc3339();

        {
            let conn = self.lock()?;
            conn.execute(
                r#"
                    INSERT INTO subscriptions
                        (subscription_id, feed_kind, community_id, target_channel_id,
                         match_criteria, ping_target_id, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ON CONFLICT(feed_kind, community_id, target_channel_id) DO UPDATE SET
                        match_criteria = excluded.match_criteria,
                        ping_target_id = excluded.ping_target_id,
                        updated_at = excluded.updated_at
                    "#,
                params![
                    Uuid::new_v4().to_string(),
                    feed.as_str(),
                    community_id,
                    target_channel_id,
                    criteria,
                    ping_target_id,
                    now
                ],
            )
            .context("Failed to upsert subscription")?;
        }

        self.query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM subscriptions \
                 WHERE feed_kind = ?1 AND community_id = ?2 AND target_channel_id = ?3"
            ),
            &[&feed.as_str(), &community_id, &target_channel_id],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Upserted subscription could not be read back"))
    }

    fn delete(&self, subscription_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "DELETE FROM subscriptions WHERE subscription_id = ?1",
                params![subscription_id],
            )
            .context("Failed to delete subscription")?;

        Ok(changed > 0)
    }

    fn get(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE subscription_id = ?1"),
                params![subscription_id],
                RawRow::from_row,
            )
            .optional()
            .context("Failed to get subscription")?
        };

        raw.map(RawRow::into_subscription).transpose()
    }
}

// ============================================================================
// Memory Implementation (for testing)
// ============================================================================

/// In-memory implementation of SubscriptionStore
///
/// Can be told to fail reference updates, to exercise persistence failures.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    records: RwLock<HashMap<String, Subscription>>,
    fail_updates: std::sync::atomic::AtomicBool,
    fail_listing: std::sync::atomic::AtomicBool,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `update_message_ref` fail until switched off
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make both list operations fail until switched off
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Subscription>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Subscription>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn list(&self, predicate: impl Fn(&Subscription) -> bool) -> Result<Vec<Subscription>> {
        if self.fail_listing.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("subscription listing unavailable");
        }

        let mut subs: Vec<Subscription> = self.read().values().filter(|s| predicate(s)).cloned().collect();
        subs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.subscription_id.cmp(&b.subscription_id))
        });
        Ok(subs)
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn list_all(&self, feed: FeedKind) -> Result<Vec<Subscription>> {
        self.list(|s| s.feed == feed)
    }

    fn list_by_community(&self, feed: FeedKind, community_id: &str) -> Result<Vec<Subscription>> {
        self.list(|s| s.feed == feed && s.community_id == community_id)
    }

    fn update_message_ref(&self, subscription_id: &str, message: &MessageRef) -> Result<()> {
        if self.fail_updates.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("store write failed");
        }

        let mut records = self.write();
        let sub = records
            .get_mut(subscription_id)
            .ok_or_else(|| anyhow!("Subscription {subscription_id} not found"))?;
        sub.last_message_ref = Some(message.clone());
        sub.updated_at = Utc::now();
        Ok(())
    }

    fn upsert(
        &self,
        feed: FeedKind,
        community_id: &str,
        target_channel_id: &str,
        match_criteria: &serde_json::Value,
        ping_target_id: Option<&str>,
    ) -> Result<Subscription> {
        let mut records = self.write();
        let now = Utc::now();

        let existing = records.values_mut().find(|s| {
            s.feed == feed && s.community_id == community_id && s.target_channel_id == target_channel_id
        });

        if let Some(sub) = existing {
            sub.match_criteria = match_criteria.clone();
            sub.ping_target_id = ping_target_id.map(String::from);
            sub.updated_at = now;
            return Ok(sub.clone());
        }

        let sub = Subscription {
            subscription_id: Uuid::new_v4().to_string(),
            feed,
            community_id: community_id.to_string(),
            target_channel_id: target_channel_id.to_string(),
            match_criteria: match_criteria.clone(),
            ping_target_id: ping_target_id.map(String::from),
            last_message_ref: None,
            created_at: now,
            updated_at: now,
        };
        records.insert(sub.subscription_id.clone(), sub.clone());
        Ok(sub)
    }

    fn delete(&self, subscription_id: &str) -> Result<bool> {
        Ok(self.write().remove(subscription_id).is_some())
    }

    fn get(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        Ok(self.read().get(subscription_id).cloned())
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store
pub type SharedSubscriptionStore = Arc<dyn SubscriptionStore>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> Result<SharedSubscriptionStore> {
    Ok(Arc::new(SqliteSubscriptionStore::new(path)?))
}

/// Create a shared memory store
pub fn create_memory_store() -> SharedSubscriptionStore {
    Arc::new(MemorySubscriptionStore::new())
}

// ============================================================================
// Tests
// ============================================================================
