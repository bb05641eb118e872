// Core data structures for the relay engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The independent feeds the engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Mission rotation (void fissures)
    Fissures,
    /// Traveling merchant
    Trader,
    /// Special mission (arbitration)
    Arbitration,
}

impl FeedKind {
    /// All feeds, in start-up order
    pub const ALL: [FeedKind; 3] = [Self::Fissures, Self::Trader, Self::Arbitration];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fissures => "fissures",
            Self::Trader => "trader",
            Self::Arbitration => "arbitration",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fissures" | "fissure" => Ok(Self::Fissures),
            "trader" | "baro" => Ok(Self::Trader),
            "arbitration" | "arbitrations" | "arby" => Ok(Self::Arbitration),
            other => Err(format!(
                "Unknown feed '{other}'. Valid options: fissures, trader, arbitration"
            )),
        }
    }
}

/// Lifecycle of a classified entity relative to an observation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Upcoming,
    Active,
    Expired,
}

impl LifecycleStatus {
    /// Derive the status from the activation/expiry window
    ///
    /// `upcoming` before activation, `active` in `[activation, expiry)`, `expired` after.
    pub fn at(activation_at: DateTime<Utc>, expiry_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < activation_at {
            Self::Upcoming
        } else if now < expiry_at {
            Self::Active
        } else {
            Self::Expired
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical, feed-specific record derived from one raw snapshot entry
///
/// `X` carries the attributes only one feed knows about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedEntity<X> {
    pub id: String,
    pub display_name: String,
    pub location_name: String,
    pub category: String,
    pub activation_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub status: LifecycleStatus,
    pub extra: X,
}

impl<X> ClassifiedEntity<X> {
    /// Check whether the entity is active at classification time
    pub fn is_active(&self) -> bool {
        self.status == LifecycleStatus::Active
    }

    /// Re-derive the status for another observation time
    pub fn status_at(&self, now: DateTime<Utc>) -> LifecycleStatus {
        LifecycleStatus::at(self.activation_at, self.expiry_at, now)
    }
}

/// Reference to a message previously delivered to a target channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One community's configured delivery target for a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    pub feed: FeedKind,
    pub community_id: String,
    pub target_channel_id: String,
    /// Feed-specific criteria; parsed by the feed at reconciliation time
    pub match_criteria: serde_json::Value,
    pub ping_target_id: Option<String>,
    pub last_message_ref: Option<MessageRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single subscription that could not be brought up to date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelivery {
    pub subscription_id: String,
    pub reason: String,
}

/// Outcome of one reconciliation pass, used for logging and metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Subscriptions whose criteria matched and a delivery was attempted
    pub attempted: usize,
    pub succeeded: usize,
    /// Subscriptions whose criteria did not match the current state
    pub skipped: usize,
    /// Created messages whose reference could not be persisted
    pub persistence_failures: usize,
    pub failed: Vec<FailedDelivery>,
}

impl ReconcileReport {
    /// Record a failed subscription
    pub fn record_failure(&mut self, subscription_id: impl Into<String>, reason: impl Into<String>) {
        self.attempted += 1;
        self.failed.push(FailedDelivery {
            subscription_id: subscription_id.into(),
            reason: reason.into(),
        });
    }

    /// Check that every attempted delivery succeeded
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} succeeded={} failed={} skipped={}",
            self.attempted,
            self.succeeded,
            self.failed.len(),
            self.skipped
        )
    }
}
