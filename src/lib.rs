//! lotus-relay - World-state relay for community chat servers
//!
//! Polls the game's world-state for void fissures, the traveling merchant and
//! arbitrations, detects what changed, and keeps one message per subscribed
//! channel up to date, pinging a role when something new goes live.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`worldstate`] - Snapshot retrieval and wire formats
//! - [`localization`] - Internal identifier to display name lookup
//! - [`feeds`] - Per-feed classification, selection and rendering
//! - [`scheduler`] - Polling loops, change detection and the engine
//! - [`notifications`] - Delivery targets, reconciliation and ping cleanup
//! - [`storage`] - Subscription persistence (SQLite)
//! - [`api`] - Operator REST API
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use lotus_relay::config::Config;
//! use lotus_relay::scheduler::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let engine = Engine::from_config(&config)?;
//!     engine.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

rust_i18n::i18n!("locales", fallback = "en");

pub mod api;
pub mod config;
pub mod error;
pub mod feeds;
pub mod i18n;
pub mod localization;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod worldstate;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, RelayErrorTrait, Result};
    pub use crate::feeds::{ArbitrationFeed, Feed, FissureFeed, TraderFeed};
    pub use crate::localization::LocalizationResolver;
    pub use crate::models::{ClassifiedEntity, FeedKind, LifecycleStatus, MessageRef, ReconcileReport, Subscription};
    pub use crate::notifications::{DeliveryTarget, MessageContent, Reconciler};
    pub use crate::scheduler::{Engine, FeedScheduler, PassOutcome};
    pub use crate::storage::{SharedSubscriptionStore, SubscriptionStore};
    pub use crate::worldstate::{RawSnapshot, SnapshotSource};
}

pub use models::{FeedKind, ReconcileReport, Subscription};
