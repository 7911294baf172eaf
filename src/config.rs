use crate::error::Error;
use crate::hash::HashFunction;
use std::hash::{BuildHasher, Hash};

/// Shard count used when none is configured.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Configuration for a ShardMap instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) shard_count: usize,
    pub(crate) hash_function: HashFunction,
    pub(crate) capacity_per_shard: Option<usize>,
}

impl Config {
    /// Create a new config with defaults (32 shards, ahash).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards. Must be greater than 0.
    pub fn shard_count(mut self, count: usize) -> Result<Self, Error> {
        if count == 0 {
            return Err(Error::InvalidShardCount);
        }
        self.shard_count = count;
        Ok(self)
    }

    /// Set the hash function to use.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.hash_function = hash_fn;
        self
    }

    /// Set initial capacity per shard. Total capacity will be approximately
    /// `capacity_per_shard * shard_count`. Omitted by default (HashMap default).
    pub fn capacity_per_shard(mut self, capacity: usize) -> Self {
        self.capacity_per_shard = Some(capacity);
        self
    }

    /// The configured number of shards.
    pub fn get_shard_count(&self) -> usize {
        self.shard_count
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            hash_function: HashFunction::AHash,
            capacity_per_shard: None,
        }
    }
}

/// Builder for creating a ShardMap with custom configuration.
#[derive(Debug, Default)]
pub struct ShardMapBuilder {
    config: Config,
}

impl ShardMapBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the number of shards. Must be greater than 0.
    pub fn shard_count(mut self, count: usize) -> Result<Self, Error> {
        self.config = self.config.shard_count(count)?;
        Ok(self)
    }

    /// Set the hash function to use.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.config = self.config.hash_function(hash_fn);
        self
    }

    /// Set initial capacity per shard. Total capacity ≈ `capacity_per_shard * shard_count`.
    pub fn capacity_per_shard(mut self, capacity: usize) -> Self {
        self.config = self.config.capacity_per_shard(capacity);
        self
    }

    /// Build a ShardMap with the configured settings.
    pub fn build<K, V>(self) -> Result<crate::ShardMap<K, V>, Error>
    where
        K: Hash + Eq,
    {
        crate::ShardMap::with_config(self.config)
    }

    /// Build a ShardMap that routes and hashes with a caller-supplied hasher.
    ///
    /// The configured [`HashFunction`] is ignored. `hasher` must hash a given
    /// key to the same value on every call.
    pub fn build_with_hasher<K, V, S>(self, hasher: S) -> Result<crate::ShardMap<K, V, S>, Error>
    where
        K: Hash + Eq,
        S: BuildHasher + Clone,
    {
        crate::ShardMap::with_config_and_hasher(self.config, hasher)
    }
}
