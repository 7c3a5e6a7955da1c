//! # Key Hash Primitives
//!
//! The two pure hash functions injected into the shard router: a
//! short-key hasher for keys of 2..=32 bytes and a 64-bit hasher for
//! longer keys. Both are process-deterministic; neither is stable
//! across processes, which is fine because shard placement is never
//! persisted.

use std::hash::{BuildHasher, Hasher};
use std::sync::OnceLock;

use ahash::RandomState;
use xxhash_rust::xxh3::xxh3_64;

/// Pure key hash function, injectable through the cache builder.
pub type KeyHashFn = fn(&[u8]) -> u64;

/// Hashes a short key (up to 32 bytes) with a process-wide ahash state.
///
/// The state is seeded once per process so repeated calls with equal
/// input return equal output for the lifetime of the process.
pub fn short_hash(bytes: &[u8]) -> u64 {
    static STATE: OnceLock<RandomState> = OnceLock::new();
    let mut hasher = STATE.get_or_init(RandomState::new).build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

/// Hashes a long key (over 32 bytes) with xxh3.
pub fn long_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}
