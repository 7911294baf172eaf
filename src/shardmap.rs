use crate::config::{Config, DEFAULT_SHARD_COUNT};
use crate::error::{Error, Result};
use crate::hash::HashFunction;
use crate::shard::ConcurrentMap;
use crate::stats::{Diagnostics, ShardDiagnostics, ShardOps, Stats};
use hashbrown::HashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use tracing::{debug, trace};

/// Concurrent map split into a fixed number of independently locked shards.
///
/// Each key lives in exactly one shard, chosen from the upper half of
/// `hash(key)` modulo `shard_count`.
/// Keyed operations lock only that shard, so operations on keys in different
/// shards run in parallel. Values come back as owned copies, never references.
///
/// Whole-map operations (`len`, `clear`, `snapshot`, `load_factor`, ...) visit
/// the shards one at a time in index order. There is no global lock, so such
/// an operation racing with writers may observe some shards before and others
/// after a concurrent change.
///
/// # Example
///
/// ```rust
/// use concurrent_shardmap::ShardMap;
///
/// let map = ShardMap::new();
/// map.insert("key1", "value1");
///
/// assert_eq!(map.at(&"key1"), Ok("value1"));
/// assert!(map.get(&"missing").is_none());
/// ```
pub struct ShardMap<K, V, S = HashFunction> {
    shards: Vec<ConcurrentMap<K, V, S>>,
    hasher: S,
}

impl<K, V> ShardMap<K, V, HashFunction>
where
    K: Hash + Eq,
{
    /// Create a new map with defaults (32 shards, ahash).
    pub fn new() -> Self {
        Self::from_parts(DEFAULT_SHARD_COUNT, None, HashFunction::default())
    }

    /// Create a new map with custom config.
    pub fn with_config(config: Config) -> Result<Self> {
        let hasher = config.hash_function;
        Self::with_config_and_hasher(config, hasher)
    }
}

impl<K, V, S> ShardMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Create a new map from `config`, routing and hashing with `hasher`.
    ///
    /// The config's hash function is ignored in favor of `hasher`.
    pub fn with_config_and_hasher(config: Config, hasher: S) -> Result<Self> {
        if config.shard_count == 0 {
            return Err(Error::InvalidShardCount);
        }
        Ok(Self::from_parts(
            config.shard_count,
            config.capacity_per_shard,
            hasher,
        ))
    }

    fn from_parts(shard_count: usize, capacity_per_shard: Option<usize>, hasher: S) -> Self {
        let capacity = capacity_per_shard.unwrap_or(0);
        let shards = (0..shard_count)
            .map(|_| ConcurrentMap::with_capacity_and_hasher(capacity, hasher.clone()))
            .collect();
        debug!(shard_count, capacity_per_shard = capacity, "created shard map");
        Self { shards, hasher }
    }

    /// Which shard `key` belongs to. Stable for the lifetime of the map.
    ///
    /// Routes on the upper half of the hash. The shard tables pick buckets
    /// from the low bits of the same hash, which must stay spread out inside
    /// each shard.
    #[inline]
    pub fn shard_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let routing_bits = self.hasher.hash_one(key) >> 32;
        (routing_bits % self.shards.len() as u64) as usize
    }

    /// Whether `other` sends every key to the same shard as this map does.
    fn routes_like(&self, other: &Self) -> bool {
        const SENTINELS: [u64; 4] = [0, 1, 0x9e37_79b9_7f4a_7c15, u64::MAX];
        self.shards.len() == other.shards.len()
            && SENTINELS
                .iter()
                .all(|s| self.hasher.hash_one(s) == other.hasher.hash_one(s))
    }

    /// Empty every shard, one at a time, returning what they held.
    fn drain_all(&self) -> Vec<(K, V)> {
        let mut entries = Vec::new();
        for shard in &self.shards {
            let mut drained = HashMap::with_hasher(self.hasher.clone());
            shard.swap_with_map(&mut drained);
            entries.extend(drained);
        }
        entries
    }

    #[inline]
    fn shard<Q>(&self, key: &Q) -> &ConcurrentMap<K, V, S>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        &self.shards[self.shard_index(key)]
    }

    /// Insert a key-value pair if the key is absent. Returns `true` if inserted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use concurrent_shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// assert!(map.insert("key", "value"));
    /// assert!(!map.insert("key", "new_value"));
    /// assert_eq!(map.at(&"key"), Ok("value"));
    /// ```
    pub fn insert(&self, key: K, value: V) -> bool {
        self.shard(&key).insert(key, value)
    }

    /// Insert each entry in order, as if by [`insert`](Self::insert).
    ///
    /// Entries are routed and locked one at a time; the batch as a whole is
    /// not atomic. Returns how many entries were inserted.
    pub fn insert_many<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        entries
            .into_iter()
            .map(|(key, value)| self.insert(key, value))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Insert a key-value pair, overwriting any existing value.
    ///
    /// Returns `true` if the key was not present before.
    pub fn insert_or_assign(&self, key: K, value: V) -> bool {
        self.shard(&key).insert_or_assign(key, value)
    }

    /// Remove a key, returning how many entries were removed (0 or 1).
    pub fn erase<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).erase(key)
    }

    /// Remove a key-value pair, returning the value if it existed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use concurrent_shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("key", "value");
    /// assert_eq!(map.remove(&"key"), Some("value"));
    /// assert!(map.get(&"key").is_none());
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).remove(key)
    }

    /// Remove a key and hand back the detached entry.
    pub fn extract<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).extract(key)
    }

    /// Get a copy of the value for `key`, or [`Error::KeyNotFound`].
    pub fn at<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shard(key).at(key)
    }

    /// Get a copy of the value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shard(key).get(key)
    }

    /// Get a copy of the value for `key`, inserting `V::default()` first if
    /// the key is absent.
    pub fn get_or_insert_default(&self, key: K) -> V
    where
        V: Default + Clone,
    {
        self.shard(&key).get_or_insert_default(key)
    }

    /// Number of entries with this key (0 or 1).
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).count(key)
    }

    /// Check whether the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).contains_key(key)
    }

    /// Get the total number of entries across all shards.
    ///
    /// Shards are counted one after another, so a concurrent insert may or
    /// may not be included.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Check if the map is empty. Stops at the first non-empty shard.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.is_empty())
    }

    /// Clear every shard, one at a time.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
        debug!(shard_count = self.shards.len(), "cleared shard map");
    }

    /// Copy all entries into one ordinary, unsynchronized map.
    ///
    /// Each shard is copied under its own read lock. Shards hold disjoint
    /// keys, so the union has exactly one entry per key.
    pub fn snapshot(&self) -> HashMap<K, V, S>
    where
        K: Clone,
        V: Clone,
    {
        let mut all = HashMap::with_hasher(self.hasher.clone());
        for shard in &self.shards {
            all.extend(shard.snapshot());
        }
        all
    }

    /// Create a snapshot-based iterator over all key-value pairs.
    ///
    /// # Example
    ///
    /// ```rust
    /// use concurrent_shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("key1", "value1");
    /// map.insert("key2", "value2");
    ///
    /// let mut count = 0;
    /// for (_key, _value) in map.iter_snapshot() {
    ///     count += 1;
    /// }
    /// assert_eq!(count, 2);
    /// ```
    pub fn iter_snapshot(&self) -> crate::iter::SnapshotIter<K, V>
    where
        K: Clone,
        V: Clone,
    {
        crate::iter::SnapshotIter::new(self.snapshot())
    }

    /// Move entries from another ShardMap whose keys are absent here.
    ///
    /// Entries with a key already present stay in `source` untouched. Each
    /// entry moves under the locks of its two shards only, so the merge is
    /// safe per entry but not atomic as a whole. Returns how many moved.
    pub fn merge(&self, source: &Self) -> usize
    where
        K: Clone,
    {
        if std::ptr::eq(self, source) {
            return 0;
        }
        let mut moved = 0;
        let mut skipped = 0;
        for source_shard in &source.shards {
            for key in source_shard.keys() {
                if self.shard(&key).take_from(source_shard, &key) {
                    moved += 1;
                } else {
                    skipped += 1;
                }
            }
        }
        debug!(moved, skipped, "merged shard map");
        moved
    }

    /// Move entries from a single [`ConcurrentMap`] whose keys are absent here.
    pub fn merge_shard(&self, source: &ConcurrentMap<K, V, S>) -> usize
    where
        K: Clone,
    {
        let mut moved = 0;
        for key in source.keys() {
            if self.shard(&key).take_from(source, &key) {
                moved += 1;
            }
        }
        debug!(moved, remaining = source.len(), "merged concurrent map");
        moved
    }

    /// Move entries from an ordinary map whose keys are absent here.
    pub fn merge_map<S2>(&self, source: &mut HashMap<K, V, S2>) -> usize
    where
        S2: BuildHasher,
    {
        let pending: Vec<(K, V)> = source.drain().collect();
        let mut moved = 0;
        for (key, value) in pending {
            match self.shard(&key).try_insert(key, value) {
                Ok(()) => moved += 1,
                Err((key, value)) => {
                    source.insert(key, value);
                }
            }
        }
        debug!(moved, remaining = source.len(), "merged map");
        moved
    }

    /// Merge from a sequence that may repeat keys.
    ///
    /// The first entry for each absent key moves here; everything else stays
    /// in `source`, in its original order.
    pub fn merge_entries(&self, source: &mut Vec<(K, V)>) -> usize {
        let pending = std::mem::take(source);
        let mut moved = 0;
        for (key, value) in pending {
            match self.shard(&key).try_insert(key, value) {
                Ok(()) => moved += 1,
                Err(entry) => source.push(entry),
            }
        }
        debug!(moved, remaining = source.len(), "merged entries");
        moved
    }

    /// Exchange contents with another ShardMap.
    ///
    /// When both maps route keys alike, shard `i` here swaps with shard `i`
    /// there, in index order, locking at most those two shards at a time.
    /// Otherwise both maps are drained and every entry is re-routed into its
    /// new owner. Shard counts must match.
    pub fn swap(&self, other: &Self) -> Result<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        if self.shards.len() != other.shards.len() {
            return Err(Error::ShardCountMismatch {
                left: self.shards.len(),
                right: other.shards.len(),
            });
        }
        if self.routes_like(other) {
            for (ours, theirs) in self.shards.iter().zip(&other.shards) {
                ours.swap(theirs);
            }
            debug!(shard_count = self.shards.len(), "swapped shard maps");
        } else {
            let ours = self.drain_all();
            let theirs = other.drain_all();
            let (incoming, outgoing) = (theirs.len(), ours.len());
            self.insert_many(theirs);
            other.insert_many(ours);
            debug!(incoming, outgoing, "swapped shard maps by re-routing");
        }
        Ok(())
    }

    /// Exchange contents with an ordinary map.
    ///
    /// Drains every shard into `other` and re-inserts the previous contents
    /// of `other` through normal routing. Not atomic with respect to
    /// concurrent writers.
    pub fn swap_with_map(&self, other: &mut HashMap<K, V, S>) {
        let incoming = std::mem::replace(other, HashMap::with_hasher(self.hasher.clone()));
        other.extend(self.drain_all());
        let inserted = self.insert_many(incoming);
        debug!(outgoing = other.len(), incoming = inserted, "swapped with map");
    }

    /// Number of shards. Fixed at construction.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Arithmetic mean of the shards' load factors.
    ///
    /// Shards of different sizes weigh equally, so this only approximates the
    /// load factor of the map as a whole.
    pub fn load_factor(&self) -> f32 {
        let total: f32 = self.shards.iter().map(|shard| shard.load_factor()).sum();
        total / self.shards.len() as f32
    }

    /// Load factor of one shard, or [`Error::ShardIndexOutOfRange`].
    pub fn shard_load_factor(&self, index: usize) -> Result<f32> {
        self.shards
            .get(index)
            .map(|shard| shard.load_factor())
            .ok_or(Error::ShardIndexOutOfRange {
                index,
                shard_count: self.shards.len(),
            })
    }

    /// Maximum load factor, as configured on the first shard.
    pub fn max_load_factor(&self) -> f32 {
        self.shards[0].max_load_factor()
    }

    /// Set the maximum load factor of every shard.
    pub fn set_max_load_factor(&self, max_load_factor: f32) -> Result<()> {
        for shard in &self.shards {
            shard.set_max_load_factor(max_load_factor)?;
        }
        Ok(())
    }

    /// Rehash every shard to a capacity of at least `capacity`.
    ///
    /// Applies per shard: total capacity ends up near `capacity * shard_count`.
    pub fn rehash(&self, capacity: usize) {
        for shard in &self.shards {
            shard.rehash(capacity);
        }
        trace!(capacity, shard_count = self.shards.len(), "rehashed shard map");
    }

    /// Reserve room for `entries` in every shard.
    ///
    /// Applies per shard: total room ends up near `entries * shard_count`.
    pub fn reserve(&self, entries: usize) {
        for shard in &self.shards {
            shard.reserve(entries);
        }
        trace!(entries, shard_count = self.shards.len(), "reserved shard map");
    }

    /// The hasher used for routing and inside every shard.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Number of entries in each shard, in shard index order.
    pub fn shard_loads(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.len()).collect()
    }

    /// Get detailed statistics about the map and its shards.
    pub fn stats(&self) -> Stats {
        let shard_sizes = self.shard_loads();
        let shard_load_factors = self.shards.iter().map(|s| s.load_factor()).collect();
        let operations: Vec<ShardOps> = self.shards.iter().map(|s| s.stats()).collect();
        let size: usize = shard_sizes.iter().sum();

        Stats {
            size,
            shard_sizes,
            shard_load_factors,
            operations,
        }
    }

    /// Per-shard load and operation breakdown, with imbalance ratios.
    pub fn diagnostics(&self) -> Diagnostics {
        let shards = self
            .shards
            .iter()
            .map(|shard| {
                let ops = shard.stats();
                ShardDiagnostics {
                    entries: shard.len(),
                    load_factor: shard.load_factor(),
                    reads: ops.reads,
                    writes: ops.writes,
                    removes: ops.removes,
                    paired_locks: ops.paired_locks,
                }
            })
            .collect();
        Diagnostics::from_shards(shards)
    }
}

impl<K, V> Default for ShardMap<K, V, HashFunction>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Clone for ShardMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        Self {
            shards: self.shards.clone(),
            hasher: self.hasher.clone(),
        }
    }
}

impl<K, V, S> PartialEq for ShardMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.snapshot() == other.snapshot()
    }
}

impl<K, V, S> Eq for ShardMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Eq + Clone,
    S: BuildHasher + Clone,
{
}

impl<K, V, S> fmt::Debug for ShardMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for ShardMap<K, V, HashFunction>
where
    K: Hash + Eq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        map.insert_many(iter);
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ShardMap<K, V, HashFunction>
where
    K: Hash + Eq,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K, V, S> Extend<(K, V)> for ShardMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.insert_many(iter);
    }
}
