//! Statistics and diagnostics types.

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-shard operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardOps {
    /// Number of read-locked operations on this shard.
    pub reads: u64,
    /// Number of write-locked operations on this shard.
    pub writes: u64,
    /// Number of entries removed from this shard.
    pub removes: u64,
    /// Times this shard was write-locked together with another map, for a
    /// swap or merge (0 when metrics feature disabled).
    pub paired_locks: u64,
}

/// Thread-safe statistics tracker for a single shard.
#[cfg(feature = "metrics")]
pub(crate) struct ShardStats {
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    paired_locks: AtomicU64,
}

#[cfg(feature = "metrics")]
impl ShardStats {
    pub fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            removes: AtomicU64::new(0),
            paired_locks: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_paired(&self) {
        self.paired_locks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removes(&self, n: usize) {
        self.removes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShardOps {
        ShardOps {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            paired_locks: self.paired_locks.load(Ordering::Relaxed),
        }
    }
}

/// Zero-sized placeholder when metrics are disabled.
#[cfg(not(feature = "metrics"))]
pub(crate) struct ShardStats;

#[cfg(not(feature = "metrics"))]
impl ShardStats {
    pub fn new() -> Self {
        ShardStats
    }

    #[inline]
    pub fn record_read(&self) {}

    #[inline]
    pub fn record_write(&self) {}

    #[inline]
    pub fn record_paired(&self) {}

    #[inline]
    pub fn record_removes(&self, _n: usize) {}

    pub fn snapshot(&self) -> ShardOps {
        ShardOps::default()
    }
}

impl Default for ShardStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate statistics for a ShardMap instance.
///
/// Gathered one shard at a time, so under concurrent writes the figures
/// need not add up to a single moment's state.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Total number of entries across all shards.
    pub size: usize,
    /// Number of entries in each shard.
    pub shard_sizes: Vec<usize>,
    /// Load factor of each shard's table.
    pub shard_load_factors: Vec<f32>,
    /// Operation counts for each shard.
    pub operations: Vec<ShardOps>,
}

/// Per-shard diagnostics snapshot.
#[derive(Debug, Clone)]
pub struct ShardDiagnostics {
    /// Number of entries in this shard.
    pub entries: usize,
    /// Load factor of this shard's table.
    pub load_factor: f32,
    /// Read operations (0 when metrics disabled).
    pub reads: u64,
    /// Write operations (0 when metrics disabled).
    pub writes: u64,
    /// Removed entries (0 when metrics disabled).
    pub removes: u64,
    /// Two-map lock acquisitions (0 when metrics disabled).
    pub paired_locks: u64,
}

/// Structured snapshot for performance introspection.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Total number of entries across all shards.
    pub total_entries: usize,
    /// Per-shard diagnostics.
    pub shards: Vec<ShardDiagnostics>,
    /// Total read + write operations (0 when metrics disabled).
    pub total_operations: u64,
    /// Average load (entries) per shard.
    pub avg_load_per_shard: f64,
    /// Max load / avg load ratio. User interprets (e.g. threshold 2.0 for imbalance).
    pub max_load_ratio: f64,
}

impl Diagnostics {
    pub(crate) fn from_shards(shards: Vec<ShardDiagnostics>) -> Self {
        let total_entries: usize = shards.iter().map(|s| s.entries).sum();
        let total_operations = shards.iter().map(|s| s.reads + s.writes).sum();
        let avg_load_per_shard = if shards.is_empty() {
            0.0
        } else {
            total_entries as f64 / shards.len() as f64
        };
        let max_load = shards.iter().map(|s| s.entries).max().unwrap_or(0);
        let max_load_ratio = if avg_load_per_shard > 0.0 {
            max_load as f64 / avg_load_per_shard
        } else {
            0.0
        };

        Self {
            total_entries,
            shards,
            total_operations,
            avg_load_per_shard,
            max_load_ratio,
        }
    }
}
