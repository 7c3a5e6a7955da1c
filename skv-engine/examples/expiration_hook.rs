//! Expiration notifications delivered through the background reaper.
//!
//! Run with `cargo run --example expiration_hook`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skv_engine::Cache;

fn main() {
    tracing_subscriber::fmt().init();

    let cache = Arc::new(
        Cache::builder()
            .clock_interval(Duration::from_millis(100))
            .expired_hook(|key, value: u64| {
                tracing::info!(key, value, "entry expired");
            })
            .build(),
    );

    // The reaper advances the timing wheel, confirms expirations, and
    // forwards each (key, value) pair to the hook.
    cache.start_expired(Duration::from_millis(100));

    cache.set_with_expire("session-1", 42, Duration::from_millis(300));
    cache.set_with_expire("session-2", 7, Duration::from_millis(600));
    cache.set_with_expire("session-3", 9, Duration::from_secs(3600));

    thread::sleep(Duration::from_secs(2));
    tracing::info!(remaining = cache.len(), "after the sweep");

    cache.stop();
}
