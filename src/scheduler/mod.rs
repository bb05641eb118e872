//! Feed scheduling
//!
//! Every enabled feed runs its own polling loop. A pass fetches a snapshot,
//! classifies it, compares it with the last propagated state and, when the
//! change is significant, reconciles every subscription of that feed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │   ┌────────────────┐ ┌────────────────┐ ┌────────────────┐   │
//! │   │ FeedScheduler  │ │ FeedScheduler  │ │ FeedScheduler  │   │
//! │   │   fissures     │ │    trader      │ │  arbitration   │   │
//! │   └───────┬────────┘ └───────┬────────┘ └───────┬────────┘   │
//! └───────────┼──────────────────┼──────────────────┼────────────┘
//!             │  fetch → classify → detect           │
//!             ▼                                      ▼
//!      ┌─────────────┐                       ┌──────────────┐
//!      │ Reconciler  │ ────── edits ───────▶ │ DeliveryTarget│
//!      └──────┬──────┘                       └──────────────┘
//!             │ message refs
//!             ▼
//!      ┌──────────────────┐
//!      │ SubscriptionStore│
//!      └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`change`]: fingerprints and change detection
//! - [`feed`]: the per-feed polling loop
//! - [`engine`]: wiring of all feeds, manual triggers, shutdown
//! - [`error`]: scheduler errors

pub mod change;
pub mod engine;
pub mod error;
pub mod feed;

pub use change::{ChangeDetector, ChangeSet, Fingerprint, LastObserved};
pub use engine::{Engine, FeedRunner};
pub use error::{SchedulerError, SchedulerResult};
pub use feed::{FeedScheduler, PassOutcome, SchedulerStatus};
