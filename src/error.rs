use thiserror::Error;

/// Result type alias using the crate's [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building or querying a map.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The requested key was not found in the map.
    #[error("key not found")]
    KeyNotFound,

    /// The shard count is invalid (must be greater than 0).
    #[error("shard count must be greater than 0")]
    InvalidShardCount,

    /// A per-shard query named a shard that does not exist.
    #[error("shard index {index} out of range for {shard_count} shards")]
    ShardIndexOutOfRange {
        /// The requested shard index.
        index: usize,
        /// The number of shards in the map.
        shard_count: usize,
    },

    /// The maximum load factor must be finite and greater than 0.
    #[error("invalid max load factor: {0}")]
    InvalidLoadFactor(f32),

    /// Two maps with different shard counts cannot exchange shards.
    #[error("shard count mismatch: {left} vs {right}")]
    ShardCountMismatch {
        /// Shard count of the map the operation was called on.
        left: usize,
        /// Shard count of the other map.
        right: usize,
    },
}
