//! Data Store Engine
//!
//! [`StorageEngine`] is what callers talk to. It owns one
//! [`StringStore`] and one [`SortedSetStore`] and exposes a single
//! command surface over both.
//!
//! ## Design Decisions
//!
//! 1. **Two Namespaces**: a key can be a string and a sorted set at the
//!    same time. `DEL` removes both; `DBSIZE` counts both.
//! 2. **No Global Lock**: each namespace is sharded on its own, and each
//!    sorted set has its own mutex. Cross-namespace operations are only
//!    consistent per namespace.
//! 3. **NotFound is `None`**: the printable `(nil)` lives in the protocol
//!    layer. The only real failure is `INCR` on a non-integer.

use crate::storage::expiry::schedule_expiry;
use crate::storage::{SortedSetStore, StoreError, StringStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time counters for `INFO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Stored string entries, including expired ones not yet evicted
    pub string_keys: u64,
    /// Sorted-set keys
    pub sorted_set_keys: u64,
    /// Expired string entries evicted so far
    pub expired: u64,
}

/// The main storage engine for zsetkv.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks. All operations are synchronous and
/// thread-safe.
///
/// # Example
///
/// ```
/// use zsetkv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
///
/// engine.set("counter", "41", None);
/// assert_eq!(engine.incr("counter"), Ok(42));
///
/// engine.zadd("board", &[(1.0, "b".to_string()), (1.0, "a".to_string())]);
/// assert_eq!(engine.zrank("board", "a"), Some(0));
///
/// assert_eq!(engine.dbsize(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    strings: Arc<StringStore>,
    zsets: SortedSetStore,
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // String Operations
    // ========================================================================

    /// Sets a string value, replacing any previous value and TTL.
    ///
    /// With a TTL, and when called inside a Tokio runtime, a one-shot
    /// timer is armed that removes the key once the TTL has elapsed,
    /// unless the key has been rewritten or deleted in the meantime.
    pub fn set(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let version = self.strings.set(key, value.into(), ttl);

        if let Some(ttl) = ttl.filter(|&ttl| Instant::now().checked_add(ttl).is_some()) {
            schedule_expiry(&self.strings, key, version, ttl);
        }
    }

    /// Gets a string value. Expired values are evicted and read as `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.strings.get(key)
    }

    /// Remaining TTL of a live string key; `Some(None)` if it never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.strings.ttl(key)
    }

    /// Increments the integer stored at `key`, treating absent or expired
    /// keys as `0`.
    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.strings.incr(key)
    }

    // ========================================================================
    // Sorted Set Operations
    // ========================================================================

    /// Adds or updates members of the sorted set at `key`.
    ///
    /// # Returns
    ///
    /// The number of members that were newly inserted; score updates of
    /// existing members are not counted.
    pub fn zadd(&self, key: &str, members: &[(f64, String)]) -> usize {
        self.zsets.zadd_many(key, members)
    }

    /// Cardinality of the sorted set, `0` if it doesn't exist.
    pub fn zcard(&self, key: &str) -> usize {
        self.zsets.zcard(key)
    }

    /// 0-based rank of `member` in ascending `(score, member)` order.
    pub fn zrank(&self, key: &str, member: &str) -> Option<usize> {
        self.zsets.zrank(key, member)
    }

    /// Score of `member`.
    pub fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        self.zsets.zscore(key, member)
    }

    /// Members in the inclusive index window `start..=stop`.
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        self.zsets.zrange(key, start, stop)
    }

    // ========================================================================
    // Keyspace Operations
    // ========================================================================

    /// Deletes `key` from both namespaces.
    ///
    /// # Returns
    ///
    /// Returns `true` if it existed in either.
    pub fn delete(&self, key: &str) -> bool {
        let removed_string = self.strings.delete(key);
        let removed_zset = self.zsets.delete(key);
        removed_string || removed_zset
    }

    /// Live string keys plus sorted-set keys.
    ///
    /// A key present in both namespaces is counted twice.
    pub fn dbsize(&self) -> u64 {
        self.strings.live_len() + self.zsets.len()
    }

    /// Key count reported to metrics. Always equal to [`dbsize`](Self::dbsize).
    pub fn total_keys(&self) -> u64 {
        self.dbsize()
    }

    /// Removes every expired string entry.
    ///
    /// This is called by the background expiry sweeper.
    pub fn cleanup_expired(&self) -> u64 {
        self.strings.cleanup_expired()
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            string_keys: self.strings.len(),
            sorted_set_keys: self.zsets.len(),
            expired: self.strings.expired_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tokio_test::{assert_err, assert_ok};

    fn members(pairs: &[(f64, &str)]) -> Vec<(f64, String)> {
        pairs.iter().map(|(s, m)| (*s, m.to_string())).collect()
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine.set("foo", "bar", None);
        assert_eq!(engine.get("foo"), Some("bar".to_string()));
        assert_eq!(engine.get("nonexistent"), None);
    }

    #[test]
    fn test_ttl_boundary() {
        let engine = StorageEngine::new();

        engine.set("temp", "expiring", Some(Duration::from_millis(100)));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.get("temp"), Some("expiring".to_string()));

        thread::sleep(Duration::from_millis(120));
        assert_eq!(engine.get("temp"), None);
    }

    #[test]
    fn test_rewrite_cancels_expiry() {
        let engine = StorageEngine::new();

        engine.set("k", "v1", Some(Duration::from_millis(100)));
        thread::sleep(Duration::from_millis(50));
        engine.set("k", "v2", None);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(engine.get("k"), Some("v2".to_string()));
    }

    #[test]
    fn test_del_touches_both_namespaces() {
        let engine = StorageEngine::new();

        engine.set("both", "value", None);
        engine.zadd("both", &members(&[(1.0, "a")]));
        assert_eq!(engine.dbsize(), 2);

        assert!(engine.delete("both"));
        assert_eq!(engine.get("both"), None);
        assert_eq!(engine.zcard("both"), 0);
        assert_eq!(engine.zrank("both", "a"), None);
        assert_eq!(engine.dbsize(), 0);

        assert!(!engine.delete("both"));
    }

    #[test]
    fn test_del_only_sorted_set() {
        let engine = StorageEngine::new();

        engine.zadd("z", &members(&[(1.0, "a")]));
        assert!(engine.delete("z"));
        assert!(engine.zrange("z", 0, -1).is_empty());
    }

    #[test]
    fn test_dbsize_skips_expired_and_double_counts() {
        let engine = StorageEngine::new();

        engine.set("a", "1", None);
        engine.set("b", "2", Some(Duration::from_millis(20)));
        engine.set("shared", "3", None);
        engine.zadd("shared", &members(&[(1.0, "m")]));
        engine.zadd("z", &members(&[(1.0, "m")]));

        assert_eq!(engine.dbsize(), 5);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.dbsize(), 4);
        assert_eq!(engine.total_keys(), engine.dbsize());
    }

    #[test]
    fn test_incr_semantics() {
        let engine = StorageEngine::new();

        assert_eq!(engine.incr("fresh"), Ok(1));

        engine.set("counter", "1", None);
        assert_eq!(engine.incr("counter"), Ok(2));

        engine.set("k", "notanumber", None);
        assert_eq!(engine.incr("k"), Err(StoreError::NotAnInteger));
        assert_eq!(engine.get("k"), Some("notanumber".to_string()));

        engine.set("big", i64::MAX.to_string(), None);
        let err = assert_err!(engine.incr("big"));
        assert_eq!(err, StoreError::Overflow);
        engine.set("neg", "-5", None);
        assert_eq!(assert_ok!(engine.incr("neg")), -4);
    }

    #[test]
    fn test_concurrent_incr() {
        let engine = Arc::new(StorageEngine::new());
        engine.set("k", "0", None);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..250 {
                        engine.incr("k").unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.get("k"), Some("4000".to_string()));
    }

    #[test]
    fn test_zadd_upsert() {
        let engine = StorageEngine::new();

        assert_eq!(engine.zadd("k", &members(&[(1.0, "a")])), 1);
        assert_eq!(engine.zadd("k", &members(&[(0.0, "z")])), 1);
        assert_eq!(engine.zrank("k", "a"), Some(1));

        assert_eq!(engine.zadd("k", &members(&[(5.0, "a")])), 0);
        assert_eq!(engine.zcard("k"), 2);
        assert_eq!(engine.zscore("k", "a"), Some(5.0));
        assert_eq!(engine.zrank("k", "a"), Some(1));
    }

    #[test]
    fn test_zadd_batch_sums_new_members() {
        let engine = StorageEngine::new();

        let added = engine.zadd("k", &members(&[(1.0, "a"), (2.0, "b"), (3.0, "a")]));
        assert_eq!(added, 2);
        assert_eq!(engine.zscore("k", "a"), Some(3.0));
        assert_eq!(engine.zrange("k", 0, -1), vec!["b", "a"]);
    }

    #[test]
    fn test_zrange_and_zrank() {
        let engine = StorageEngine::new();

        engine.zadd(
            "k",
            &members(&[(10.0, "a"), (20.0, "b"), (30.0, "c"), (40.0, "d"), (50.0, "e")]),
        );

        assert_eq!(engine.zrange("k", -2, -1), vec!["d", "e"]);
        assert_eq!(engine.zrange("k", 0, -1), vec!["a", "b", "c", "d", "e"]);
        assert!(engine.zrange("k", 2, 1).is_empty());
        assert_eq!(engine.zrank("k", "c"), Some(2));
    }

    #[test]
    fn test_sorted_sets_never_expire() {
        let engine = StorageEngine::new();

        engine.zadd("k", &members(&[(1.0, "a")]));
        engine.set("s", "v", Some(Duration::from_millis(10)));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(engine.cleanup_expired(), 1);
        assert_eq!(engine.zcard("k"), 1);

        let stats = engine.stats();
        assert_eq!(stats.string_keys, 0);
        assert_eq!(stats.sorted_set_keys, 1);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_stored_without_timer() {
        let engine = StorageEngine::new();

        engine.set("k", "v", Some(Duration::MAX));
        tokio::task::yield_now().await;

        assert_eq!(engine.get("k"), Some("v".to_string()));
        assert_eq!(engine.ttl("k"), Some(None));
    }

    #[tokio::test]
    async fn test_scheduled_expiry_through_engine() {
        let engine = StorageEngine::new();

        engine.set("k", "v", Some(Duration::from_millis(30)));
        assert_eq!(engine.stats().string_keys, 1);

        tokio::time::sleep(Duration::from_millis(120)).await;

        // Gone without anyone reading it
        assert_eq!(engine.stats().string_keys, 0);
    }

    #[tokio::test]
    async fn test_scheduled_expiry_spares_deleted_then_rewritten_key() {
        let engine = StorageEngine::new();

        engine.set("k", "v1", Some(Duration::from_millis(50)));
        assert!(engine.delete("k"));
        engine.set("k", "v2", None);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(engine.get("k"), Some("v2".to_string()));
    }
}
