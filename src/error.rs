//! Unified error handling for the lotus-relay crate
//!
//! Domain errors stay close to the code that raises them; this module folds
//! them into a single `Error` enum for module boundaries.
//!
//! # Architecture
//!
//! - [`RelayErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use lotus_relay::error::{Error, RelayErrorTrait};
//!
//! fn report(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!("Will retry next tick: {}", err.localized_desc());
//!     } else {
//!         tracing::error!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::notifications::channels::DeliveryError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{ClassifyError, FetchError};

/// Common trait for relay error types
pub trait RelayErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later pass may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get localized description for user-facing messages
    fn localized_desc(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream fetch errors (HTTP, timeout, status)
    Network,
    /// Snapshot classification errors
    Classification,
    /// Delivery target errors
    Delivery,
    /// Subscription store and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get localized description for the category
    pub fn localized_desc(&self) -> String {
        match self {
            Self::Network => crate::i18n::t!("errors.category.network").to_string(),
            Self::Classification => crate::i18n::t!("errors.category.classification").to_string(),
            Self::Delivery => crate::i18n::t!("errors.category.delivery").to_string(),
            Self::Storage => crate::i18n::t!("errors.category.storage").to_string(),
            Self::Config => crate::i18n::t!("errors.category.config").to_string(),
            Self::Other => crate::i18n::t!("errors.category.other").to_string(),
        }
    }
}

/// Unified error type for the lotus-relay crate
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Snapshot classification errors
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    /// Delivery target errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RelayErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Classify(_) => true,
            Self::Delivery(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn localized_desc(&self) -> String {
        match self {
            Self::Fetch(e) => format!("{}: {e}", crate::i18n::t!("errors.fetch.error")),
            Self::Classify(e) => format!("{}: {e}", crate::i18n::t!("errors.classify.error")),
            Self::Delivery(e) => format!("{}: {e}", crate::i18n::t!("errors.delivery.error")),
            Self::Scheduler(e) => e.localized_desc(),
            Self::Database(e) => format!("{}: {e}", crate::i18n::t!("errors.database.error")),
            Self::Io(e) => format!("{}: {e}", crate::i18n::t!("errors.io.error")),
            Self::Json(e) => format!("{}: {e}", crate::i18n::t!("errors.json.error")),
            Self::Config(msg) => format!("{}: {msg}", crate::i18n::t!("errors.config.error")),
            Self::Other { context, .. } => context.clone(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Classify(_) | Self::Json(_) => ErrorCategory::Classification,
            Self::Delivery(_) => ErrorCategory::Delivery,
            Self::Scheduler(SchedulerError::FetchFailed { .. }) => ErrorCategory::Network,
            Self::Scheduler(SchedulerError::ClassifyFailed { .. }) => ErrorCategory::Classification,
            Self::Scheduler(SchedulerError::StoreUnavailable { .. }) => ErrorCategory::Storage,
            Self::Scheduler(SchedulerError::UnknownFeed { .. })
            | Self::Scheduler(SchedulerError::FeedDisabled { .. }) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Other,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
