use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skv_engine::{Cache, Cancel};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Fast clock so TTL tests stay well within CI-friendly sleeps.
fn fast_builder() -> skv_engine::CacheBuilder<i32> {
    Cache::builder()
        .clock_interval(Duration::from_millis(10))
        .default_expiration(Duration::ZERO)
}

#[test]
fn entries_expire_lazily_on_access() {
    init_tracing();
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(30));
    assert_eq!(cache.get("k"), Some(1));

    sleep_ms(300);
    assert_eq!(cache.get("k"), None);
    assert_eq!(cache.len(), 0, "lazy expiration removes the entry");
}

#[test]
fn raw_accessors_ignore_deadlines() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(30));
    sleep_ms(300);

    // Raw reads neither hide nor evict the expired entry.
    assert_eq!(cache.get_raw("k"), Some(1));
    let (raw, _) = cache.to_raw_map(&Cancel::new());
    assert_eq!(raw.get("k"), Some(&1));
    assert_eq!(cache.len(), 1);

    // The valid view evicts it eagerly.
    let (map, _) = cache.to_map(&Cancel::new());
    assert!(map.is_empty());
    assert_eq!(cache.len(), 0);
}

#[test]
fn expired_hits_report_the_missed_deadline() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(30));
    sleep_ms(300);

    let (value, expire_ns) = cache.get_with_expire("k");
    assert_eq!(value, None);
    assert!(expire_ns > 0, "the last-seen deadline aids debugging");
    assert_eq!(cache.get_raw("k"), None, "the expired entry was evicted");
}

#[test]
fn set_if_absent_replaces_only_expired_entries() {
    let cache = fast_builder().build();
    assert!(cache.set_if_absent_with_expire("k", 1, Duration::from_millis(40)));
    assert_eq!(cache.len(), 1);

    assert!(!cache.set_if_absent("k", 2));
    assert_eq!(cache.get("k"), Some(1));

    sleep_ms(300);
    assert!(cache.set_if_absent_with_expire("k", 3, Duration::from_secs(10)));
    assert_eq!(cache.get("k"), Some(3));
    assert_eq!(cache.len(), 1, "replacing an expired entry reuses its slot");
}

#[test]
fn overwriting_extends_a_shorter_ttl() {
    init_tracing();
    let cache = Arc::new(fast_builder().build());
    cache.start_expired(Duration::from_millis(10));

    cache.set_with_expire("k", 1, Duration::from_millis(100));
    cache.set_with_expire("k", 2, Duration::from_secs(5));

    sleep_ms(500);
    // The stale wheel registration for the first deadline fails
    // re-verification against the refreshed entry.
    assert_eq!(cache.get("k"), Some(2));
    cache.stop();
}

#[test]
fn extend_expire_pushes_the_deadline_out() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(150));
    assert!(cache.extend_expire("k", Duration::from_secs(10)));

    sleep_ms(500);
    assert_eq!(cache.get("k"), Some(1));
}

#[test]
fn get_refresh_renews_valid_entries() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(100));
    assert_eq!(cache.get_refresh_with("k", Duration::from_secs(10)), Some(1));

    sleep_ms(400);
    assert_eq!(cache.get("k"), Some(1));
}

#[test]
fn get_refresh_reports_expired_entries_absent() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 1, Duration::from_millis(30));
    sleep_ms(300);

    assert_eq!(cache.get_refresh_with("k", Duration::from_secs(10)), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn pop_on_an_expired_entry_is_absent_but_removes_it() {
    let cache = fast_builder().build();
    cache.set_with_expire("k", 9, Duration::from_millis(30));
    sleep_ms(300);

    assert_eq!(cache.pop("k"), None);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.get_raw("k"), None);
}

#[test]
fn reaper_evicts_and_notifies_the_hook() {
    init_tracing();
    let (tx, rx) = crossbeam_channel::unbounded();
    let cache = Arc::new(
        Cache::builder()
            .clock_interval(Duration::from_millis(10))
            .default_expiration(Duration::from_secs(10))
            .expired_hook(move |key, value| {
                let _ = tx.send((key.to_string(), value));
            })
            .build(),
    );
    cache.start_expired(Duration::from_millis(10));

    cache.set_with_expire("k", 1, Duration::from_millis(50));
    assert_eq!(cache.get("k"), Some(1));

    sleep_ms(600);
    // Nothing read the key; the reaper alone removed it.
    let (raw, _) = cache.to_raw_map(&Cancel::new());
    assert!(raw.is_empty());
    assert_eq!(cache.len(), 0);

    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(received, vec![("k".to_string(), 1)]);
    cache.stop();
}

#[test]
fn delete_expired_sweeps_all_shards() {
    let cache = Cache::builder()
        .clock_interval(Duration::from_millis(5))
        .default_expiration(Duration::ZERO)
        .build();
    for i in 0..1_000 {
        cache.set_with_expire(&format!("k-{i}"), i, Duration::from_millis(1));
    }
    assert_eq!(cache.len(), 1_000);

    sleep_ms(200);
    let swept = cache.delete_expired(&Cancel::new());
    assert_eq!(swept, 1_000);
    assert_eq!(cache.len(), 0);
}

#[test]
fn hook_panics_do_not_break_the_reaper() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let cache = Arc::new(
        Cache::builder()
            .clock_interval(Duration::from_millis(10))
            .default_expiration(Duration::ZERO)
            .expired_hook(move |key, value| {
                if key == "boom" {
                    panic!("hook failure");
                }
                let _ = tx.send((key.to_string(), value));
            })
            .build(),
    );
    cache.start_expired(Duration::from_millis(10));

    cache.set_with_expire("boom", 1, Duration::from_millis(30));
    cache.set_with_expire("ok", 2, Duration::from_millis(30));

    sleep_ms(600);
    assert_eq!(cache.len(), 0, "both entries are evicted despite the panic");
    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(received, vec![("ok".to_string(), 2)]);
    cache.stop();
}

#[test]
fn disabled_hook_mode_suppresses_notifications() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let cache = Arc::new(
        fast_builder()
            .expired_hook(move |key, value| {
                let _ = tx.send((key.to_string(), value));
            })
            .build(),
    );
    cache.disable_expired_hook();
    cache.start_expired(Duration::from_millis(10));

    cache.set_with_expire("k", 1, Duration::from_millis(30));
    sleep_ms(400);

    assert_eq!(cache.len(), 0);
    assert!(rx.try_iter().next().is_none());
    cache.stop();
}
