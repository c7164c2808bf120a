//! Storage Engine Module
//!
//! This module provides the core storage functionality for zsetkv.
//! It holds two independent namespaces: expiring string values and
//! sorted sets. Both are sharded so that unrelated keys rarely contend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────┐   ┌───────────────────────────┐  │
//! │  │      StringStore      │   │      SortedSetStore       │  │
//! │  │  64 x RwLock<HashMap> │   │  64 x RwLock<HashMap>     │  │
//! │  │  key -> Entry         │   │  key -> Arc<Mutex<ZSet>>  │  │
//! │  └───────────┬───────────┘   └───────────────────────────┘  │
//! └──────────────┼──────────────────────────────────────────────┘
//!                │
//!   ┌────────────┴──────────────┐
//!   │ per-key expiry timers     │
//!   │ + ExpirySweeper           │
//!   └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards per namespace
//! - **Per-Set Locks**: each sorted set has its own mutex
//! - **TTL Support**: string keys can have a time-to-live
//! - **Lazy Expiry**: expired strings are evicted on access
//! - **Scheduled Expiry**: a timer per TTL key does compare-then-delete
//! - **Active Expiry**: background sweeper reclaims anything left over
//!
//! ## Example
//!
//! ```
//! use zsetkv::storage::StorageEngine;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("name", "alice", None);
//! assert_eq!(engine.get("name"), Some("alice".to_string()));
//!
//! engine.set("session", "token123", Some(Duration::from_secs(3600)));
//!
//! engine.zadd("scores", &[(10.0, "a".to_string()), (20.0, "b".to_string())]);
//! assert_eq!(engine.zrange("scores", 0, -1), vec!["a", "b"]);
//! ```

pub mod engine;
pub mod error;
pub mod expiry;
pub mod strings;
pub mod zsets;

use std::hash::{DefaultHasher, Hash, Hasher};

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
pub use error::StoreError;
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use strings::{Entry, StringStore};
pub use zsets::{SortedSet, SortedSetStore};

/// Number of shards per namespace.
/// More shards = less lock contention, but more memory overhead.
pub(crate) const NUM_SHARDS: usize = 64;

/// Determines which shard a key belongs to.
#[inline]
pub(crate) fn shard_index(key: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}
