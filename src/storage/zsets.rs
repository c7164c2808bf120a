//! Ordered Set Store
//!
//! Each key maps to a [`SortedSet`]: unique members, each with a 64-bit
//! float score, kept in the total order `(score asc, member asc)`.
//! Sorted sets never expire.
//!
//! ## Locking
//!
//! ```text
//!   shard RwLock (lookup / create / remove only)
//!        │
//!        ▼
//!   Arc<Mutex<SortedSet>>  (held for the whole add / rank / range)
//! ```
//!
//! The shard lock is released before the set's mutex is taken, so a
//! long read on one set never blocks another key. An operation that
//! cloned the `Arc` just before a concurrent `delete` finishes on the
//! detached set, which is indistinguishable from it having run first.

use crate::storage::{shard_index, NUM_SHARDS};
use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

type Score = OrderedFloat<f64>;

/// A collection of unique members ordered by `(score, member)`.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<String, Score>,
    ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `member` or replaces its score.
    ///
    /// # Returns
    ///
    /// Returns `true` if the member was not present before.
    pub fn insert(&mut self, score: f64, member: &str) -> bool {
        let score = OrderedFloat(score);

        match self.scores.insert(member.to_string(), score) {
            Some(old) if old == score => false,
            Some(old) => {
                self.ordered.remove(&(old, member.to_string()));
                self.ordered.insert((score, member.to_string()));
                false
            }
            None => {
                self.ordered.insert((score, member.to_string()));
                true
            }
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Returns the score of `member`.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).map(|score| score.0)
    }

    /// 0-based position of `member` in ascending order.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = *self.scores.get(member)?;
        Some(self.ordered.range(..(score, member.to_string())).count())
    }

    /// Members between `start` and `stop`, both inclusive.
    ///
    /// Negative indices count from the end (`-1` is the last member).
    /// Out-of-range bounds are clamped; an empty window yields an empty
    /// vector rather than an error.
    pub fn range(&self, start: i64, stop: i64) -> Vec<String> {
        let len = self.len() as i64;

        let start = if start < 0 { len + start } else { start }.max(0);
        let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

        if start > stop || start >= len {
            return Vec::new();
        }

        self.ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(_, member)| member.clone())
            .collect()
    }
}

/// A single shard containing a portion of the sorted-set keys.
#[derive(Debug, Default)]
struct Shard {
    sets: RwLock<HashMap<String, Arc<Mutex<SortedSet>>>>,
}

/// Concurrent collection of sorted sets, one lock per set.
#[derive(Debug)]
pub struct SortedSetStore {
    shards: Vec<Shard>,
}

impl Default for SortedSetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedSetStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        &self.shards[shard_index(key)]
    }

    /// Looks up the set for `key` without creating it.
    fn lookup(&self, key: &str) -> Option<Arc<Mutex<SortedSet>>> {
        self.shard(key).sets.read().get(key).cloned()
    }

    /// Looks up the set for `key`, creating an empty one if needed.
    fn lookup_or_create(&self, key: &str) -> Arc<Mutex<SortedSet>> {
        if let Some(set) = self.lookup(key) {
            return set;
        }

        let mut sets = self.shard(key).sets.write();
        Arc::clone(sets.entry(key.to_string()).or_default())
    }

    /// Adds or updates a single member.
    ///
    /// # Returns
    ///
    /// Returns `true` if the member was newly inserted.
    pub fn zadd(&self, key: &str, score: f64, member: &str) -> bool {
        self.lookup_or_create(key).lock().insert(score, member)
    }

    /// Adds or updates a batch of members under one lock acquisition.
    ///
    /// # Returns
    ///
    /// Returns the number of newly inserted members. An empty batch
    /// leaves the store untouched.
    pub fn zadd_many(&self, key: &str, members: &[(f64, String)]) -> usize {
        if members.is_empty() {
            return 0;
        }

        let set = self.lookup_or_create(key);
        let mut set = set.lock();

        let mut added = 0;
        for (score, member) in members {
            if set.insert(*score, member) {
                added += 1;
            }
        }
        added
    }

    /// Number of members in the set, `0` if the key doesn't exist.
    pub fn zcard(&self, key: &str) -> usize {
        self.lookup(key).map_or(0, |set| set.lock().len())
    }

    /// 0-based rank of `member`, or `None` if the key or member is missing.
    pub fn zrank(&self, key: &str, member: &str) -> Option<usize> {
        self.lookup(key)?.lock().rank(member)
    }

    /// Score of `member`, or `None` if the key or member is missing.
    pub fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        self.lookup(key)?.lock().score(member)
    }

    /// Members from `start` to `stop` inclusive; see [`SortedSet::range`].
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        self.lookup(key)
            .map(|set| set.lock().range(start, stop))
            .unwrap_or_default()
    }

    /// Removes the whole set stored at `key`.
    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).sets.write().remove(key).is_some()
    }

    /// Number of sorted-set keys.
    pub fn len(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.sets.read().len() as u64)
            .sum()
    }

    /// Returns true if there are no sorted-set keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn letters(store: &SortedSetStore, key: &str) {
        for (score, member) in [(10.0, "a"), (20.0, "b"), (30.0, "c"), (40.0, "d"), (50.0, "e")] {
            store.zadd(key, score, member);
        }
    }

    #[test]
    fn test_zadd_and_zcard() {
        let store = SortedSetStore::new();

        assert!(store.zadd("z", 1.0, "a"));
        assert!(store.zadd("z", 2.0, "b"));
        assert_eq!(store.zcard("z"), 2);
        assert_eq!(store.zcard("missing"), 0);
    }

    #[test]
    fn test_zadd_upsert_replaces_score() {
        let store = SortedSetStore::new();

        assert!(store.zadd("z", 1.0, "a"));
        store.zadd("z", 3.0, "b");
        assert_eq!(store.zrank("z", "a"), Some(0));

        assert!(!store.zadd("z", 5.0, "a"));
        assert_eq!(store.zcard("z"), 2);
        assert_eq!(store.zscore("z", "a"), Some(5.0));
        assert_eq!(store.zrank("z", "a"), Some(1));
        assert_eq!(store.zrange("z", 0, -1), vec!["b", "a"]);
    }

    #[test]
    fn test_zadd_many_counts_only_new_members() {
        let store = SortedSetStore::new();

        store.zadd("z", 1.0, "a");
        let added = store.zadd_many(
            "z",
            &[(2.0, "a".to_string()), (3.0, "b".to_string()), (4.0, "c".to_string())],
        );
        assert_eq!(added, 2);
        assert_eq!(store.zcard("z"), 3);

        assert_eq!(store.zadd_many("empty", &[]), 0);
        assert!(store.lookup("empty").is_none());
    }

    #[test]
    fn test_zrank_tie_break_by_member() {
        let store = SortedSetStore::new();

        store.zadd("z", 1.0, "b");
        store.zadd("z", 1.0, "a");

        assert_eq!(store.zrank("z", "a"), Some(0));
        assert_eq!(store.zrank("z", "b"), Some(1));
        assert_eq!(store.zrank("z", "nope"), None);
        assert_eq!(store.zrank("missing", "a"), None);
    }

    #[test]
    fn test_member_order_is_ordinal() {
        let store = SortedSetStore::new();

        store.zadd("z", 0.0, "b");
        store.zadd("z", 0.0, "B");
        store.zadd("z", 0.0, "a");
        store.zadd("z", 0.0, "_");

        // Byte order: 'B' < '_' < 'a' < 'b'
        assert_eq!(store.zrange("z", 0, -1), vec!["B", "_", "a", "b"]);
    }

    #[test]
    fn test_zrange_indices() {
        let store = SortedSetStore::new();
        letters(&store, "z");

        assert_eq!(store.zrange("z", 0, -1), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.zrange("z", -2, -1), vec!["d", "e"]);
        assert_eq!(store.zrange("z", 1, 2), vec!["b", "c"]);
        assert_eq!(store.zrange("z", -100, 1), vec!["a", "b"]);
        assert_eq!(store.zrange("z", 3, 100), vec!["d", "e"]);
        assert_eq!(store.zrange("z", 4, 4), vec!["e"]);
    }

    #[test]
    fn test_zrange_empty_windows() {
        let store = SortedSetStore::new();
        letters(&store, "z");

        assert!(store.zrange("z", 2, 1).is_empty());
        assert!(store.zrange("z", 5, 10).is_empty());
        assert!(store.zrange("z", -1, -2).is_empty());
        assert!(store.zrange("z", 0, -6).is_empty());
        assert!(store.zrange("missing", 0, -1).is_empty());
    }

    #[test]
    fn test_negative_scores_and_infinities() {
        let store = SortedSetStore::new();

        store.zadd("z", f64::INFINITY, "top");
        store.zadd("z", -1.5, "low");
        store.zadd("z", f64::NEG_INFINITY, "bottom");
        store.zadd("z", 0.0, "mid");

        assert_eq!(store.zrange("z", 0, -1), vec!["bottom", "low", "mid", "top"]);
    }

    #[test]
    fn test_delete() {
        let store = SortedSetStore::new();

        store.zadd("z", 1.0, "a");
        assert!(store.delete("z"));
        assert!(!store.delete("z"));
        assert_eq!(store.zcard("z"), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_zadd_same_key() {
        let store = Arc::new(SortedSetStore::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut added = 0;
                    for i in 0..100 {
                        // Every thread also rewrites a shared member
                        store.zadd("z", i as f64, "shared");
                        if store.zadd("z", i as f64, &format!("m-{}-{}", t, i)) {
                            added += 1;
                        }
                        let _ = store.zrange("z", 0, -1);
                    }
                    added
                })
            })
            .collect();

        let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(added, 800);
        assert_eq!(store.zcard("z"), 801);
        assert_eq!(store.zrange("z", 0, -1).len(), 801);
    }
}
