//! # concurrent-shardmap
//!
//! A concurrent hash map split into independently locked shards.
//!
//! Every key is routed to exactly one shard by the upper half of
//! `hash(key)` modulo `shard_count`, and every shard guards its table with its own reader/writer lock. Reads
//! on a shard share the lock, writes take it exclusively, and operations on
//! different shards never block each other.
//!
//! No method hands out a reference or iterator into a table. Lookups return
//! owned copies, presence checks return `bool`, and whole-map iteration goes
//! through a snapshot, so no lock outlives the call that took it.
//!
//! ## Features
//!
//! - **Sharded**: a fixed shard count chosen at construction (default 32)
//! - **Copy-out API**: `at`, `get`, `extract` and `snapshot` return owned data
//! - **Deterministic**: the same key always maps to the same shard
//! - **Configurable**: shard count, hash function, per-shard capacity
//! - **Statistics**: per-shard sizes, load factors and operation counters
//!
//! ## Example
//!
//! ```rust
//! use concurrent_shardmap::{Error, ShardMap};
//!
//! let map = ShardMap::from([("a", 1), ("b", 2), ("c", 3)]);
//!
//! assert_eq!(map.len(), 3);
//! assert_eq!(map.at(&"b"), Ok(2));
//! assert_eq!(map.at(&"z"), Err(Error::KeyNotFound));
//!
//! // `insert` never overwrites; `insert_or_assign` does.
//! assert!(!map.insert("a", 10));
//! assert!(!map.insert_or_assign("a", 10));
//! assert_eq!(map.get(&"a"), Some(10));
//!
//! assert_eq!(map.erase(&"b"), 1);
//! assert!(!map.contains_key(&"b"));
//!
//! // Iterate over a copy, not the live map.
//! for (key, value) in map.iter_snapshot() {
//!     println!("{}: {}", key, value);
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use concurrent_shardmap::{HashFunction, ShardMapBuilder};
//!
//! let map = ShardMapBuilder::new()
//!     .shard_count(12)?
//!     .hash_function(HashFunction::AHash)
//!     .capacity_per_shard(64)
//!     .build::<String, i32>()?;
//! assert_eq!(map.shard_count(), 12);
//! # Ok::<(), concurrent_shardmap::Error>(())
//! ```
//!
//! ## Consistency
//!
//! A keyed operation is atomic within its shard. Whole-map operations
//! (`len`, `is_empty`, `clear`, `snapshot`, `merge`, `swap`, ...) visit
//! shards one at a time and are not atomic against concurrent writers on
//! other shards.

#![deny(missing_docs)]
#![warn(clippy::all)]

/// Configuration and builder types.
pub mod config;
/// Error types.
pub mod error;
/// Benchmark harness emitting CSV results.
pub mod harness;
/// Hash function implementations.
pub mod hash;
/// Iterator implementations.
pub mod iter;
/// Single-shard concurrent map.
pub mod shard;
/// Main ShardMap implementation.
pub mod shardmap;
/// Statistics and metrics collection.
pub mod stats;

// Re-export main types
pub use config::{Config, ShardMapBuilder, DEFAULT_SHARD_COUNT};
pub use error::{Error, Result};
pub use hash::HashFunction;
pub use iter::SnapshotIter;
pub use shard::ConcurrentMap;
pub use shardmap::ShardMap;
pub use stats::{Diagnostics, ShardDiagnostics, ShardOps, Stats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let map = ShardMap::new();

        // Insert
        assert!(map.insert("key1", "value1"));
        assert!(!map.insert("key1", "value2"));

        // Get
        assert_eq!(map.get(&"key1"), Some("value1"));
        assert!(map.get(&"nonexistent").is_none());

        // Remove
        assert_eq!(map.remove(&"key1"), Some("value1"));
        assert!(map.get(&"key1").is_none());
    }

    #[test]
    fn test_stats() {
        let map = ShardMap::new();
        map.insert("key1", "value1");
        map.insert("key2", "value2");

        let stats = map.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.shard_sizes.len(), DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn test_builder() {
        let map = ShardMapBuilder::new()
            .shard_count(8)
            .unwrap()
            .build::<String, i32>()
            .unwrap();

        map.insert("test".to_string(), 42);
        assert_eq!(map.at("test"), Ok(42));
    }
}
