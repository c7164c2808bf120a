//! Expiring Value Store
//!
//! String values with an optional absolute expiry. Expiry is enforced in
//! three places, and whichever runs first wins:
//!
//! 1. **Lazy**: every read checks the deadline and evicts on the spot.
//! 2. **Scheduled**: `set` with a TTL arms a timer (see `expiry.rs`) that
//!    calls [`StringStore::remove_if_stale`] once the TTL has elapsed.
//! 3. **Active**: the sweeper calls [`StringStore::cleanup_expired`].
//!
//! Every entry carries a `version` stamp. A scheduled removal only
//! deletes the exact entry it was armed for, so a later `set` on the same
//! key is never clobbered by a stale timer.

use crate::storage::{shard_index, StoreError, NUM_SHARDS};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Identity used by compare-then-delete
    pub version: u64,
}

impl Entry {
    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Returns the remaining TTL, or None if no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// A single shard containing a portion of the string keys.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<String, Entry>>,
}

/// Concurrent map of string values with time-based expiry.
pub struct StringStore {
    shards: Vec<Shard>,
    /// Source of entry versions
    next_version: AtomicU64,
    /// Statistics: number of expired keys evicted (any path)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringStore")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .field("expired", &self.expired_count())
            .finish()
    }
}

impl Default for StringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StringStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            next_version: AtomicU64::new(1),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        &self.shards[shard_index(key)]
    }

    fn new_entry(&self, value: String, expires_at: Option<Instant>) -> Entry {
        Entry {
            value,
            expires_at,
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Sets a key, replacing any previous value and TTL.
    ///
    /// A TTL too large to express as a deadline means the key never expires.
    ///
    /// # Returns
    ///
    /// The version of the new entry, which a scheduled expiry must present
    /// to [`remove_if_stale`](Self::remove_if_stale).
    pub fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> u64 {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let entry = self.new_entry(value, expires_at);
        let version = entry.version;

        self.shard(key).data.write().insert(key.to_string(), entry);
        version
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// An expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key (including expiry metadata).
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        let shard = self.shard(key);

        // Fast path: read lock for existing, non-expired keys
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - take the write lock and check again before evicting
        let mut data = shard.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Rewritten between the two locks
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Returns the remaining TTL of a live key.
    ///
    /// `Some(None)` means the key exists without an expiry.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.get_entry(key).map(|entry| entry.ttl())
    }

    /// Deletes a key.
    ///
    /// # Returns
    ///
    /// Returns `true` if an entry was removed. An entry that had already
    /// expired but was not yet evicted still counts as removed.
    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).data.write().remove(key).is_some()
    }

    /// Increments the integer stored at `key` by one.
    ///
    /// An absent or expired key counts as `0`, so the first call yields `1`
    /// and leaves a key without TTL. A live key keeps its TTL and version,
    /// which keeps any pending scheduled expiry valid for it.
    ///
    /// The whole read-modify-write runs under the shard's write lock.
    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut data = self.shard(key).data.write();

        if let Some(entry) = data.get_mut(key) {
            if !entry.is_expired() {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::NotAnInteger)?;
                let next = current.checked_add(1).ok_or(StoreError::Overflow)?;
                entry.value = next.to_string();
                return Ok(next);
            }
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }

        data.insert(key.to_string(), self.new_entry("1".to_string(), None));
        Ok(1)
    }

    /// Removes `key` only if it still holds the entry stamped `version`
    /// and that entry has expired.
    ///
    /// # Returns
    ///
    /// Returns `true` if the entry was removed.
    pub fn remove_if_stale(&self, key: &str, version: u64) -> bool {
        let mut data = self.shard(key).data.write();

        let stale = data
            .get(key)
            .is_some_and(|entry| entry.version == version && entry.is_expired());

        if stale {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
        stale
    }

    /// Counts entries that have not expired.
    pub fn live_len(&self) -> u64 {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .data
                    .read()
                    .values()
                    .filter(|entry| !entry.is_expired_at(now))
                    .count() as u64
            })
            .sum()
    }

    /// Counts stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.data.read().len() as u64)
            .sum()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of expired entries evicted so far.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Removes every expired entry from every shard.
    ///
    /// # Returns
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let now = Instant::now();
            let mut data = shard.data.write();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}
