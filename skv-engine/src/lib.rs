//! # skv-engine
//!
//! Sharded in-process key/value cache with optional TTL expiration,
//! built for high read/write throughput under heavy concurrency.
//!
//! Keys are strings; values are an opaque caller-chosen payload
//! carried by value. Storage is split across 512 shards, each a
//! concurrent map whose steady-state reads are lock-free. A coarse
//! atomic clock replaces per-operation system-time calls, a hashed
//! timing wheel indexes soon-to-expire keys, and a background reaper
//! confirms and evicts them, optionally notifying a user hook.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use skv_engine::Cache;
//!
//! let cache = Arc::new(
//!     Cache::builder()
//!         .default_expiration(Duration::from_secs(30))
//!         .build(),
//! );
//!
//! cache.set("user:1", "alice".to_string());
//! assert_eq!(cache.get("user:1"), Some("alice".to_string()));
//!
//! cache.start_expired(Duration::from_millis(100));
//! // ...
//! cache.stop();
//! ```

mod bus;
mod cache;
mod cancel;
mod clock;
mod options;
mod reaper;
mod router;
mod shard;
mod snapshot;
mod wheel;

pub use cache::{Cache, ExpiredHook};
pub use cancel::Cancel;
pub use options::CacheBuilder;

// Re-export the common leaf types so most callers need one import.
pub use skv_common::{
    BincodeCodec, CodecError, JsonCodec, OptionsError, SnapshotCodec, SnapshotError,
};
