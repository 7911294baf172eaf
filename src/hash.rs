use std::hash::{BuildHasher, Hasher};

/// Which hash function a map uses, both for shard routing and inside each
/// shard's table.
///
/// Both variants are seeded with fixed keys, so a key hashes to the same
/// value in every map instance and across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// AHash implementation (default, fast and well-distributed).
    #[default]
    AHash,
    /// FxHash implementation (faster but potentially less distributed).
    #[cfg(feature = "fxhash")]
    FxHash,
}

/// Hasher state produced by [`HashFunction`].
/// Uses an enum to avoid trait object limitations with generics.
pub enum ShardHasher {
    /// AHash state.
    AHash(ahash::AHasher),
    /// FxHash state.
    #[cfg(feature = "fxhash")]
    FxHash(fxhash::FxHasher),
}

impl Hasher for ShardHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        match self {
            ShardHasher::AHash(h) => h.write(bytes),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash(h) => h.write(bytes),
        }
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        match self {
            ShardHasher::AHash(h) => h.write_u64(i),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash(h) => h.write_u64(i),
        }
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        match self {
            ShardHasher::AHash(h) => h.write_usize(i),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash(h) => h.write_usize(i),
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        match self {
            ShardHasher::AHash(h) => h.finish(),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash(h) => h.finish(),
        }
    }
}

impl BuildHasher for HashFunction {
    type Hasher = ShardHasher;

    fn build_hasher(&self) -> ShardHasher {
        match self {
            HashFunction::AHash => ShardHasher::AHash(ahash::AHasher::default()),
            #[cfg(feature = "fxhash")]
            HashFunction::FxHash => ShardHasher::FxHash(fxhash::FxHasher::default()),
        }
    }
}
