//! Feed definitions
//!
//! A feed knows how to read its part of a world-state snapshot, which of the
//! classified entities a subscription wants, how to render them, and when a
//! change deserves a role ping. Everything else (polling, change detection,
//! reconciliation) is shared and lives in [`crate::scheduler`] and
//! [`crate::notifications`].
//!
//! | Feed          | Source section  | Entities per snapshot |
//! |---------------|-----------------|-----------------------|
//! | `fissures`    | `ActiveMissions`, `VoidStorms` | many   |
//! | `trader`      | `VoidTraders`   | one (primary)         |
//! | `arbitration` | `Arbitrations`  | one (active now)      |

pub mod arbitration;
pub mod fissure;
pub mod trader;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::localization::LocalizationResolver;
use crate::models::{ClassifiedEntity, FeedKind};
use crate::notifications::MessageContent;
use crate::scheduler::change::ChangeSet;
use crate::utils::error::ClassifyError;
use crate::worldstate::RawSnapshot;

pub use arbitration::ArbitrationFeed;
pub use fissure::FissureFeed;
pub use trader::TraderFeed;

/// Classified entity of a feed
pub type Entity<F> = ClassifiedEntity<<F as Feed>::Attributes>;

/// One independently polled feed
pub trait Feed: Send + Sync + 'static {
    /// Feed-specific entity attributes
    type Attributes: Clone + std::fmt::Debug + Serialize + Send + Sync + 'static;

    /// Feed-specific subscription criteria
    type Criteria: DeserializeOwned + Default + std::fmt::Debug + Send + Sync;

    fn kind(&self) -> FeedKind;

    /// Turn a snapshot into canonical entities
    ///
    /// Malformed entries are dropped individually; an error here means the
    /// snapshot as a whole has nothing to propagate.
    fn classify(
        &self,
        snapshot: &RawSnapshot,
        resolver: &LocalizationResolver,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entity<Self>>, ClassifyError>;

    /// Entities a subscription with `criteria` wants; empty means skip
    fn select<'a>(
        &self,
        criteria: &Self::Criteria,
        entities: &'a [Entity<Self>],
    ) -> Vec<&'a Entity<Self>>;

    /// Render the persistent content message
    fn render(&self, selected: &[&Entity<Self>], now: DateTime<Utc>) -> MessageContent;

    /// Whether this change warrants pinging the subscription's role
    fn wants_ping(&self, selected: &[&Entity<Self>], changes: &ChangeSet) -> bool;

    /// Text of the transient ping message
    fn ping_text(&self, selected: &[&Entity<Self>]) -> String;

    /// Parse stored criteria; `null` means match everything
    fn parse_criteria(&self, raw: &serde_json::Value) -> Result<Self::Criteria, serde_json::Error> {
        if raw.is_null() {
            return Ok(Self::Criteria::default());
        }
        serde_json::from_value(raw.clone())
    }
}

/// Check that raw criteria parse for the given feed
pub fn validate_criteria(kind: FeedKind, raw: &serde_json::Value) -> Result<(), serde_json::Error> {
    match kind {
        FeedKind::Fissures => FissureFeed.parse_criteria(raw).map(|_| ()),
        FeedKind::Trader => TraderFeed.parse_criteria(raw).map(|_| ()),
        FeedKind::Arbitration => ArbitrationFeed.parse_criteria(raw).map(|_| ()),
    }
}

/// Case-insensitive membership; an empty filter accepts everything
pub(crate) fn matches_any(filter: &[String], value: &str) -> bool {
    filter.is_empty() || filter.iter().any(|f| f.eq_ignore_ascii_case(value))
}

/// Case-insensitive substring match; an empty filter accepts everything
pub(crate) fn contains_any(filter: &[String], value: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let value = value.to_lowercase();
    filter.iter().any(|f| value.contains(&f.to_lowercase()))
}
