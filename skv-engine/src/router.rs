//! # Shard Router
//!
//! Maps a key to one of the 512 shards in bounded work. Keys are
//! truncated to a configurable byte length before hashing, and the
//! hash strategy is picked by the truncated length: single-byte keys
//! index directly, keys up to 32 bytes use the short hasher, longer
//! keys use the 64-bit long hasher. Both hashers are injected pure
//! functions.

use skv_common::KeyHashFn;

/// Number of shards. Must stay a power of two for mask selection.
pub(crate) const SHARD_COUNT: usize = 512;

/// Index mask derived from the shard count.
pub(crate) const SHARD_MASK: u64 = (SHARD_COUNT as u64) - 1;

/// Longest key prefix (bytes) routed through the short hasher.
const SHORT_KEY_MAX: usize = 32;

/// Deterministic key -> shard index mapping.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ShardRouter {
    /// Bound on key bytes consumed; 0 means the full key.
    max_key_len: usize,
    short: KeyHashFn,
    long: KeyHashFn,
}

impl ShardRouter {
    pub fn new(max_key_len: usize, short: KeyHashFn, long: KeyHashFn) -> Self {
        ShardRouter {
            max_key_len,
            short,
            long,
        }
    }

    /// Returns the shard index for `key`.
    ///
    /// Keys sharing their first `max_key_len` bytes land on the same
    /// shard, which prefix-oriented callers may rely on.
    pub fn shard_of(&self, key: &str) -> usize {
        let bytes = key.as_bytes();
        let m = if self.max_key_len > 0 {
            bytes.len().min(self.max_key_len)
        } else {
            bytes.len()
        };

        let id = if m == 1 {
            u64::from(bytes[0])
        } else if m <= SHORT_KEY_MAX {
            (self.short)(&bytes[..m])
        } else {
            (self.long)(&bytes[..m])
        };

        (id & SHARD_MASK) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skv_common::{long_hash, short_hash};

    fn router(max_key_len: usize) -> ShardRouter {
        ShardRouter::new(max_key_len, short_hash, long_hash)
    }

    #[test]
    fn full_key_routing_is_deterministic_and_in_range() {
        let r = router(0);
        for key in [
            "a".to_string(),
            "ab".to_string(),
            "x".repeat(32),
            "y".repeat(33),
            "z".repeat(256),
            String::new(),
        ] {
            let id = r.shard_of(&key);
            assert!(id < SHARD_COUNT, "index {id} out of range for {key:?}");
            assert_eq!(id, r.shard_of(&key), "routing must be deterministic");
        }
    }

    #[test]
    fn single_byte_limit_uses_the_first_byte() {
        let r = router(1);
        assert_eq!(r.shard_of("abc"), r.shard_of("axyz"));
        assert_eq!(r.shard_of("abc"), (u64::from(b'a') & SHARD_MASK) as usize);
        assert!(r.shard_of("bcd") < SHARD_COUNT);
    }

    #[test]
    fn short_prefixes_isolate_suffix_bytes() {
        for kl in [2usize, 16, 32] {
            let r = router(kl);
            let key1 = format!("{}{}", "a".repeat(kl), "different-suffix");
            let key2 = "a".repeat(64);
            assert_eq!(
                r.shard_of(&key1),
                r.shard_of(&key2),
                "keys with identical first {kl} bytes must share a shard"
            );
        }
    }

    #[test]
    fn long_prefixes_isolate_suffix_bytes() {
        for kl in [33usize, 64, 256] {
            let r = router(kl);
            let key1 = format!("{}suffix1", "c".repeat(kl));
            let key2 = format!("{}suffix2", "c".repeat(kl));
            assert_eq!(r.shard_of(&key1), r.shard_of(&key2));
        }
    }

    #[test]
    fn keys_shorter_than_the_limit_use_their_full_length() {
        assert_eq!(router(100).shard_of("hi"), router(2).shard_of("hi"));

        // A one-byte key under a large limit still takes the
        // first-byte fast path.
        assert_eq!(
            router(50).shard_of("x"),
            (u64::from(b'x') & SHARD_MASK) as usize
        );
    }

    #[test]
    fn empty_key_routes_without_fault() {
        assert!(router(0).shard_of("") < SHARD_COUNT);
        assert!(router(64).shard_of("") < SHARD_COUNT);
    }
}
