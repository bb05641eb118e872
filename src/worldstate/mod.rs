//! Raw world-state snapshots
//!
//! This module holds the upstream document as fetched, the wire formats shared
//! by every feed (wrapped millisecond epochs and object ids), and the tolerant
//! per-entry decoding used by the classifiers.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "_id": { "$oid": "65a1f0c2e4b0a1b2c3d4e5f6" },
//!   "Activation": { "$date": { "$numberLong": "1700000000000" } },
//!   "Expiry": { "$date": { "$numberLong": "1700003600000" } },
//!   "Node": "SolNode129"
//! }
//! ```

pub mod fetcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::utils::error::{ClassifyError, FetchError};

pub use fetcher::WorldStateFetcher;

/// The full upstream document as of one poll
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub body: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawSnapshot {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            fetched_at: Utc::now(),
        }
    }

    /// Get a top-level array section by key
    pub fn section(&self, key: &str) -> Result<&[serde_json::Value], ClassifyError> {
        self.body
            .get(key)
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .ok_or_else(|| ClassifyError::MissingSection(key.to_string()))
    }
}

/// Anything that can produce a snapshot for a feed
///
/// The HTTP fetcher is the production implementation; tests swap in
/// in-memory sources.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Retrieve the current snapshot
    async fn fetch(&self) -> Result<RawSnapshot, FetchError>;

    /// Endpoint description for logging
    fn describe(&self) -> String;
}

/// Millisecond epoch wrapped the way the upstream serializes dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "RawDate")]
pub struct MongoDate(pub DateTime<Utc>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Wrapped {
        #[serde(rename = "$date")]
        date: RawNumberLong,
    },
    Bare(RawNumberLong),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumberLong {
    Long {
        #[serde(rename = "$numberLong")]
        value: String,
    },
    Text(String),
    Number(i64),
}

impl TryFrom<RawDate> for MongoDate {
    type Error = ClassifyError;

    fn try_from(raw: RawDate) -> Result<Self, Self::Error> {
        let number = match raw {
            RawDate::Wrapped { date } => date,
            RawDate::Bare(number) => number,
        };

        let millis = match number {
            RawNumberLong::Long { value } | RawNumberLong::Text(value) => value
                .trim()
                .parse::<i64>()
                .map_err(|_| ClassifyError::Timestamp(value.clone()))?,
            RawNumberLong::Number(n) => n,
        };

        parse_epoch_millis(millis).map(MongoDate)
    }
}

/// Convert a millisecond epoch into a UTC timestamp
pub fn parse_epoch_millis(millis: i64) -> Result<DateTime<Utc>, ClassifyError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| ClassifyError::Timestamp(millis.to_string()))
}

/// Object identifier, either `{"$oid": ".."}` or a bare string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MongoId {
    Oid {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Plain(String),
}

impl MongoId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Oid { oid } => oid,
            Self::Plain(s) => s,
        }
    }
}

/// Decode every entry of a section independently
///
/// Entries that fail to decode are logged and dropped; the rest proceed.
pub fn decode_entries<T: DeserializeOwned>(feed: &str, entries: &[serde_json::Value]) -> Vec<T> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match decode_entry::<T>(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(feed = feed, index = index, error = %e, "Dropping unclassifiable entry");
                None
            }
        })
        .collect()
}

/// Decode one entry, mapping serde failures onto classification errors
pub fn decode_entry<T: DeserializeOwned>(raw: &serde_json::Value) -> Result<T, ClassifyError> {
    T::deserialize(raw).map_err(|e| {
        let message = e.to_string();
        if message.contains("Invalid timestamp") {
            ClassifyError::Timestamp(message)
        } else {
            ClassifyError::Entry(message)
        }
    })
}
