use hashbrown::hash_map;

/// Snapshot-based iterator over owned copies of a map's entries.
///
/// The entries are copied out under the map's locks when the iterator is
/// created, so iterating never holds a lock and never sees later writes.
/// For a [`ShardMap`](crate::ShardMap) each shard is copied under its own
/// lock: the result is consistent per shard, not across shards.
pub struct SnapshotIter<K, V> {
    entries: hash_map::IntoIter<K, V>,
}

impl<K, V> SnapshotIter<K, V> {
    pub(crate) fn new<S>(snapshot: hashbrown::HashMap<K, V, S>) -> Self {
        Self {
            entries: snapshot.into_iter(),
        }
    }
}

impl<K, V> Iterator for SnapshotIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for SnapshotIter<K, V> {}
