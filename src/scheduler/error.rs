//! Error types for the scheduler module

use std::fmt;

use crate::models::FeedKind;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
///
/// Only raised for conditions that stop a whole pass or trigger before any
/// subscription is touched; single-subscription problems end up in the
/// `ReconcileReport` instead.
#[derive(Debug)]
pub enum SchedulerError {
    /// Feed name not recognised
    UnknownFeed { name: String },

    /// Feed exists but is not running in this process
    FeedDisabled { feed: FeedKind },

    /// Fetch failed before classification
    FetchFailed { feed: FeedKind, reason: String },

    /// Snapshot could not be classified
    ClassifyFailed { feed: FeedKind, reason: String },

    /// Listing subscriptions failed
    StoreUnavailable { operation: String, reason: String },

    /// Scheduler was already stopped
    Stopped { feed: FeedKind },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFeed { name } => {
                write!(
                    f,
                    "Unknown feed '{}'. Valid options: fissures, trader, arbitration",
                    name
                )
            }
            Self::FeedDisabled { feed } => write!(f, "Feed '{}' is not enabled", feed),
            Self::FetchFailed { feed, reason } => {
                write!(f, "Fetch failed for feed '{}': {}", feed, reason)
            }
            Self::ClassifyFailed { feed, reason } => {
                write!(f, "Classification failed for feed '{}': {}", feed, reason)
            }
            Self::StoreUnavailable { operation, reason } => {
                write!(f, "Subscription store error during '{}': {}", operation, reason)
            }
            Self::Stopped { feed } => write!(f, "Scheduler for feed '{}' is stopped", feed),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an unknown feed error
    pub fn unknown_feed(name: impl Into<String>) -> Self {
        Self::UnknownFeed { name: name.into() }
    }

    /// Create a store error with context
    pub fn store(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Get localized description for the error
    pub fn localized_desc(&self) -> String {
        use crate::i18n::t;

        match self {
            Self::UnknownFeed { name } => t!("errors.scheduler.unknown_feed", name = name).to_string(),
            Self::FeedDisabled { feed } => {
                t!("errors.scheduler.feed_disabled", feed = feed.as_str()).to_string()
            }
            Self::FetchFailed { feed, reason } | Self::ClassifyFailed { feed, reason } => {
                t!("errors.scheduler.pass_failed", feed = feed.as_str(), reason = reason).to_string()
            }
            Self::StoreUnavailable { operation, reason } => {
                t!("errors.scheduler.store", operation = operation, reason = reason).to_string()
            }
            Self::Stopped { feed } => t!("errors.scheduler.stopped", feed = feed.as_str()).to_string(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::ClassifyFailed { .. } | Self::StoreUnavailable { .. }
        )
    }
}
