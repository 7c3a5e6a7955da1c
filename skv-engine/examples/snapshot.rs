//! Snapshot persistence through the pluggable codec seam.
//!
//! Run with `cargo run --example snapshot`.

use std::time::Duration;

use skv_engine::{BincodeCodec, Cache, Cancel};

fn main() {
    tracing_subscriber::fmt().init();

    let cache = Cache::builder()
        .default_expiration(Duration::from_secs(3600))
        .build();
    cache.set("alpha", "one".to_string());
    cache.set("beta", "two".to_string());

    // Encode the live view; deadlines are not persisted.
    let mut buf = Vec::new();
    if let Err(err) = cache.write_snapshot(&Cancel::new(), &BincodeCodec, &mut buf) {
        tracing::error!(%err, "snapshot write failed");
        return;
    }
    tracing::info!(bytes = buf.len(), "snapshot encoded");

    // Restore into a fresh cache; entries pick up its default TTL.
    let restored: Cache<String> = Cache::builder()
        .default_expiration(Duration::from_secs(60))
        .build();
    if let Err(err) = restored.read_snapshot(&Cancel::new(), &BincodeCodec, &mut buf.as_slice()) {
        tracing::error!(%err, "snapshot read failed");
        return;
    }

    tracing::info!(
        alpha = ?restored.get("alpha"),
        beta = ?restored.get("beta"),
        len = restored.len(),
        "restored"
    );

    cache.stop();
    restored.stop();
}
