//! Basic set/get usage with default and per-entry TTLs.
//!
//! Run with `cargo run --example basic`.

use std::time::Duration;

use skv_engine::Cache;

fn main() {
    tracing_subscriber::fmt().init();

    let cache = Cache::builder()
        .default_expiration(Duration::from_secs(10))
        .build();

    // Stored with the 10s default TTL.
    cache.set("key1", "value".to_string());
    cache.set("key2", "88888".to_string());
    cache.set("key3", String::new());

    for key in ["key1", "key2", "key3"] {
        if let Some(value) = cache.get(key) {
            tracing::info!(key, %value, "hit");
        }
    }

    // Explicit TTLs override the default per entry.
    cache.set_with_expire("short", "gone soon".to_string(), Duration::from_secs(30));
    cache.set_with_expire("long", "stays".to_string(), Duration::from_secs(3600));
    cache.set_with_expire("pinned", "never expires".to_string(), Duration::ZERO);

    let (value, expire_ns) = cache.get_with_expire("short");
    tracing::info!(?value, expire_ns, "deadline in clock nanoseconds");

    tracing::info!(len = cache.len(), bytes = cache.size(), "cache stats");
    cache.stop();
}
