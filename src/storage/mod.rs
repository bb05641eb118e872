//! Subscription persistence
//!
//! SQLite holds one row per (feed, community, channel) subscription along
//! with the reference of the message currently representing it.

pub mod repository;

pub use repository::{
    create_memory_store, create_sqlite_store, MemorySubscriptionStore, SharedSubscriptionStore,
    SqliteSubscriptionStore, SubscriptionStore,
};
