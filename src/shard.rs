use crate::error::{Error, Result};
use crate::hash::HashFunction;
use crate::stats::{ShardOps, ShardStats};
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use tracing::{trace, warn};

/// Max load factor a fresh table starts with: entries per unit of capacity.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 1.0;

/// The state guarded by a shard's lock.
struct Table<K, V, S> {
    map: HashMap<K, V, S>,
    max_load_factor: f32,
}

impl<K, V, S> Table<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn load_factor(&self) -> f32 {
        let capacity = self.map.capacity();
        if capacity == 0 {
            0.0
        } else {
            self.map.len() as f32 / capacity as f32
        }
    }

    /// Smallest capacity that holds `len` entries without exceeding the max load factor.
    fn required_capacity(&self, len: usize) -> usize {
        (len as f32 / self.max_load_factor).ceil() as usize
    }

    /// Grow to hold `capacity` entries. A request that cannot be allocated
    /// leaves the table as it is.
    fn grow_to(&mut self, capacity: usize) {
        if capacity > self.map.capacity() {
            let additional = capacity - self.map.len();
            if let Err(err) = self.map.try_reserve(additional) {
                warn!(capacity, error = ?err, "shard table cannot grow");
            }
        }
    }

    // hashbrown already keeps len <= capacity, so only factors below 1.0 need help.
    fn enforce_max_load_factor(&mut self) {
        if self.max_load_factor < 1.0 {
            let required = self.required_capacity(self.map.len());
            self.grow_to(required);
        }
    }

    fn insert_absent(&mut self, key: K, value: V) -> std::result::Result<(), (K, V)> {
        if self.map.contains_key(&key) {
            return Err((key, value));
        }
        self.map.insert(key, value);
        self.enforce_max_load_factor();
        Ok(())
    }

    /// Move every entry of `source` whose key is absent here; the rest stay in `source`.
    fn absorb<S2: BuildHasher>(&mut self, source: &mut HashMap<K, V, S2>) -> usize {
        let pending: Vec<(K, V)> = source.drain().collect();
        let mut moved = 0;
        for (key, value) in pending {
            match self.insert_absent(key, value) {
                Ok(()) => moved += 1,
                Err((key, value)) => {
                    source.insert(key, value);
                }
            }
        }
        moved
    }
}

/// A thread-safe hash map guarded by a single reader/writer lock.
///
/// This is one shard of a [`ShardMap`](crate::ShardMap), and is also usable
/// on its own when sharding is not wanted. Every operation takes the lock for
/// exactly its own duration: reads share it, writes hold it exclusively.
///
/// Nothing hands out references or cursors into the table. Lookups return
/// owned copies of values (hence the `V: Clone` bounds) or plain presence
/// flags, so the lock is already released when the caller looks at a result.
///
/// # Example
///
/// ```rust
/// use concurrent_shardmap::ConcurrentMap;
///
/// let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
/// assert!(map.insert("a", 1));
/// assert!(!map.insert("a", 2)); // never overwrites
/// assert_eq!(map.at(&"a"), Ok(1));
///
/// assert!(!map.insert_or_assign("a", 3));
/// assert_eq!(map.get(&"a"), Some(3));
/// ```
pub struct ConcurrentMap<K, V, S = HashFunction> {
    table: RwLock<Table<K, V, S>>,
    stats: ShardStats,
}

impl<K, V> ConcurrentMap<K, V, HashFunction>
where
    K: Hash + Eq,
{
    /// Create an empty map hashing with ahash.
    pub fn new() -> Self {
        Self::with_hasher(HashFunction::default())
    }

    /// Create an empty map with room for at least `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, HashFunction::default())
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Create an empty map that hashes keys with `hasher`.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Create an empty map with room for `capacity` entries, hashing with `hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            table: RwLock::new(Table {
                map: HashMap::with_capacity_and_hasher(capacity, hasher),
                max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            }),
            stats: ShardStats::new(),
        }
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, Table<K, V, S>> {
        self.stats.record_read();
        self.table.read()
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, Table<K, V, S>> {
        self.stats.record_write();
        self.table.write()
    }

    /// Write-lock `self` and `other` in ascending address order.
    ///
    /// The guards come back as `(self, other)` regardless of locking order.
    /// Callers must rule out `self` and `other` being the same map.
    fn write_pair<'a>(
        &'a self,
        other: &'a Self,
    ) -> (
        RwLockWriteGuard<'a, Table<K, V, S>>,
        RwLockWriteGuard<'a, Table<K, V, S>>,
    ) {
        debug_assert!(!std::ptr::eq(self, other));
        self.stats.record_paired();
        other.stats.record_paired();
        if (self as *const Self) < (other as *const Self) {
            let ours = self.write();
            let theirs = other.write();
            (ours, theirs)
        } else {
            let theirs = other.write();
            let ours = self.write();
            (ours, theirs)
        }
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.read().map.is_empty()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    /// Remove all entries, keeping the allocated capacity.
    pub fn clear(&self) {
        let mut table = self.write();
        let removed = table.map.len();
        table.map.clear();
        self.stats.record_removes(removed);
    }

    /// Insert a key-value pair if the key is absent.
    ///
    /// Returns `true` if the entry was inserted. An existing entry is never
    /// overwritten; use [`insert_or_assign`](Self::insert_or_assign) for that.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.write().insert_absent(key, value).is_ok()
    }

    /// Insert a key-value pair, handing it back if the key is already present.
    pub(crate) fn try_insert(&self, key: K, value: V) -> std::result::Result<(), (K, V)> {
        self.write().insert_absent(key, value)
    }

    /// Insert each entry in order, as if by [`insert`](Self::insert).
    ///
    /// Every entry takes the lock separately, so a concurrent reader may see
    /// any prefix of the batch. Returns how many entries were inserted.
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

    /// Insert a key-value pair, overwriting the value if the key exists.
    ///
    /// Returns `true` if the key was not present before.
    pub fn insert_or_assign(&self, key: K, value: V) -> bool {
        let mut table = self.write();
        let fresh = table.map.insert(key, value).is_none();
        if fresh {
            table.enforce_max_load_factor();
        }
        fresh
    }

    /// Remove a key, returning how many entries were removed (0 or 1).
    pub fn erase<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        usize::from(self.remove(key).is_some())
    }

    /// Remove a key, returning its value if it existed.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.write().map.remove(key);
        if removed.is_some() {
            self.stats.record_removes(1);
        }
        removed
    }

    /// Remove a key and hand back the detached entry.
    ///
    /// The entry can be put back with [`insert`](Self::insert), here or in
    /// another map.
    pub fn extract<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.write().map.remove_entry(key);
        if entry.is_some() {
            self.stats.record_removes(1);
        }
        entry
    }

    /// Get a copy of the value for `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] when the key is absent.
    pub fn at<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Get a copy of the value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.read().map.get(key).cloned()
    }

    /// Get a copy of the value for `key`, inserting `V::default()` first if
    /// the key is absent.
    pub fn get_or_insert_default(&self, key: K) -> V
    where
        V: Default + Clone,
    {
        let mut table = self.write();
        let value = table.map.entry(key).or_default().clone();
        table.enforce_max_load_factor();
        value
    }

    /// Number of entries with this key (0 or 1).
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Check whether the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.read().map.contains_key(key)
    }

    /// Copy the whole table out as an ordinary, unsynchronized map.
    ///
    /// The copy is coherent: it is taken under a single read lock.
    pub fn snapshot(&self) -> HashMap<K, V, S>
    where
        K: Clone,
        V: Clone,
        S: Clone,
    {
        self.read().map.clone()
    }

    /// Snapshot-based iterator over the current contents.
    pub fn iter_snapshot(&self) -> crate::iter::SnapshotIter<K, V>
    where
        K: Clone,
        V: Clone,
        S: Clone,
    {
        crate::iter::SnapshotIter::new(self.snapshot())
    }

    /// Exchange contents (and table tuning) with another map.
    ///
    /// Both maps are write-locked for the exchange, in a fixed order, so
    /// opposing swaps cannot deadlock.
    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut ours, mut theirs) = self.write_pair(other);
        std::mem::swap(&mut *ours, &mut *theirs);
        trace!(
            left = ours.map.len(),
            right = theirs.map.len(),
            "swapped shard contents"
        );
    }

    /// Exchange contents with an ordinary map.
    pub fn swap_with_map(&self, other: &mut HashMap<K, V, S>) {
        std::mem::swap(&mut self.write().map, other);
    }

    /// Move entries from `source` whose keys are absent here.
    ///
    /// Entries whose key already exists stay in `source`, and the existing
    /// value here is left untouched. Returns how many entries moved.
    pub fn merge_map<S2>(&self, source: &mut HashMap<K, V, S2>) -> usize
    where
        S2: BuildHasher,
    {
        self.write().absorb(source)
    }

    /// Merge from a sequence that may repeat keys.
    ///
    /// The first entry for each absent key moves here; everything else stays
    /// in `source`, in its original order. Returns how many entries moved.
    pub fn merge_entries(&self, source: &mut Vec<(K, V)>) -> usize {
        let mut table = self.write();
        let pending = std::mem::take(source);
        let mut moved = 0;
        for (key, value) in pending {
            match table.insert_absent(key, value) {
                Ok(()) => moved += 1,
                Err(entry) => source.push(entry),
            }
        }
        moved
    }

    /// Merge from another concurrent map, holding both locks for the whole
    /// transfer. Merging a map into itself does nothing.
    pub fn merge(&self, source: &Self) -> usize {
        if std::ptr::eq(self, source) {
            return 0;
        }
        let (mut ours, mut theirs) = self.write_pair(source);
        let moved = ours.absorb(&mut theirs.map);
        source.stats.record_removes(moved);
        moved
    }

    /// Copy out every key currently present.
    pub(crate) fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.read().map.keys().cloned().collect()
    }

    /// Move the entry for `key` out of `source` if this map lacks the key.
    ///
    /// Both maps are locked for the check and the move, so the entry is never
    /// observable in neither or both maps.
    pub(crate) fn take_from(&self, source: &Self, key: &K) -> bool {
        if std::ptr::eq(self, source) {
            return false;
        }
        let (mut ours, mut theirs) = self.write_pair(source);
        if ours.map.contains_key(key) {
            return false;
        }
        match theirs.map.remove_entry(key) {
            Some((key, value)) => {
                ours.map.insert(key, value);
                ours.enforce_max_load_factor();
                source.stats.record_removes(1);
                true
            }
            None => false,
        }
    }

    /// Ratio of entries to table capacity (0.0 for an unallocated table).
    pub fn load_factor(&self) -> f32 {
        self.read().load_factor()
    }

    /// Current maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.read().max_load_factor
    }

    /// Set the maximum load factor, growing the table if it is now exceeded.
    ///
    /// The table never runs fuller than 1.0 regardless of this setting.
    pub fn set_max_load_factor(&self, max_load_factor: f32) -> Result<()> {
        if !max_load_factor.is_finite() || max_load_factor <= 0.0 {
            return Err(Error::InvalidLoadFactor(max_load_factor));
        }
        let mut table = self.write();
        table.max_load_factor = max_load_factor;
        table.enforce_max_load_factor();
        trace!(max_load_factor, "set shard max load factor");
        Ok(())
    }

    /// Resize the table to a capacity of at least `capacity`, and at least
    /// enough for the current entries under the max load factor. May shrink.
    ///
    /// A capacity that cannot be allocated is logged and ignored.
    pub fn rehash(&self, capacity: usize) {
        let mut table = self.write();
        let target = capacity.max(table.required_capacity(table.map.len()));
        if target > table.map.capacity() {
            table.grow_to(target);
        } else {
            table.map.shrink_to(target);
        }
        trace!(target, capacity = table.map.capacity(), "rehashed shard");
    }

    /// Make room for at least `entries` entries in total without exceeding
    /// the max load factor.
    ///
    /// A request that cannot be allocated is logged and ignored.
    pub fn reserve(&self, entries: usize) {
        let mut table = self.write();
        let target = table.required_capacity(entries);
        table.grow_to(target);
        trace!(entries, capacity = table.map.capacity(), "reserved shard");
    }

    /// Number of entries the table holds before it must reallocate.
    pub fn capacity(&self) -> usize {
        self.read().map.capacity()
    }

    /// A copy of the hasher used by the table.
    pub fn hasher(&self) -> S
    where
        S: Clone,
    {
        self.read().map.hasher().clone()
    }

    /// Get a snapshot of operation counters for this map.
    pub fn stats(&self) -> ShardOps {
        self.stats.snapshot()
    }
}

impl<K, V, S> Default for ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Clone for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let table = self.read();
        Self {
            table: RwLock::new(Table {
                map: table.map.clone(),
                max_load_factor: table.max_load_factor,
            }),
            stats: ShardStats::new(),
        }
    }
}

impl<K, V, S> PartialEq for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // One lock at a time: compare against a copy of the other side.
        let theirs = other.snapshot();
        self.read().map == theirs
    }
}

impl<K, V, S> Eq for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Eq + Clone,
    S: BuildHasher + Clone,
{
}

impl<K, V, S> PartialEq<HashMap<K, V, S>> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &HashMap<K, V, S>) -> bool {
        self.read().map == *other
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.read().map.iter()).finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::default();
        map.insert_many(iter);
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ConcurrentMap<K, V>
where
    K: Hash + Eq,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}
