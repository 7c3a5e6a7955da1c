// skv-common - Shared leaf types for the skv cache
//
// This crate defines the error taxonomy, the injected key-hash
// primitives, and the pluggable snapshot codecs consumed by skv-engine.

pub mod codec;
pub mod error;
pub mod hash;

// Re-export for convenience
pub use codec::{BincodeCodec, JsonCodec, SnapshotCodec};
pub use error::{CodecError, OptionsError, SnapshotError};
pub use hash::{long_hash, short_hash, KeyHashFn};
