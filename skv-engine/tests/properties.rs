use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skv_engine::{Cache, Cancel};

#[test]
fn single_key_writes_are_observed_in_program_order() {
    let cache = Cache::new();
    for i in 0..100 {
        cache.set("k", i);
        assert_eq!(cache.get("k"), Some(i));
    }
    assert_eq!(cache.get("k"), Some(99));
}

#[test]
fn len_equals_the_number_of_distinct_live_keys() {
    let cache = Cache::new();
    for i in 0..500 {
        cache.set(&format!("k{}", i % 50), i);
    }
    assert_eq!(cache.len(), 50);

    let (keys, complete) = cache.keys(&Cancel::new());
    assert!(complete);
    assert_eq!(keys.len(), 50);
}

#[test]
fn concurrent_set_if_absent_has_exactly_one_winner() {
    let cache = Arc::new(Cache::new());
    let contenders: usize = 16;

    let handles: Vec<_> = (0..contenders)
        .map(|id| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.set_if_absent("prize", id))
        })
        .collect();
    let wins: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(wins.iter().filter(|&&won| won).count(), 1);
    assert_eq!(cache.len(), 1);
    let winner = cache.get("prize").unwrap();
    assert!(winner < contenders);
}

#[test]
fn concurrent_deletes_return_the_value_exactly_once() {
    let cache = Arc::new(Cache::new());
    cache.set("k", 7);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.delete("k"))
        })
        .collect();
    let results: Vec<Option<i32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert!(results.into_iter().flatten().all(|v| v == 7));
    assert_eq!(cache.len(), 0);
}

#[test]
fn concurrent_refreshes_always_observe_the_value() {
    let cache = Arc::new(
        Cache::builder()
            .clock_interval(Duration::from_millis(10))
            .default_expiration(Duration::ZERO)
            .build(),
    );
    cache.set_with_expire("k", 1, Duration::from_secs(30));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(cache.get_refresh_with("k", Duration::from_secs(30)), Some(1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.get("k"), Some(1));
}

#[test]
fn concurrent_extend_expire_terminates_and_accumulates() {
    let cache = Arc::new(
        Cache::builder()
            .clock_interval(Duration::from_millis(10))
            .default_expiration(Duration::ZERO)
            .build(),
    );
    cache.set_with_expire("k", 1, Duration::from_secs(30));
    let (_, initial_deadline) = cache.get_with_expire("k");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..100 {
                    assert!(cache.extend_expire("k", Duration::from_millis(1)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (value, deadline) = cache.get_with_expire("k");
    assert_eq!(value, Some(1));
    // 800 one-millisecond extensions land on top of the original deadline.
    assert_eq!(deadline, initial_deadline + 800 * 1_000_000);
}

#[test]
fn range_skips_entries_that_expired_before_the_walk() {
    let cache = Cache::builder()
        .clock_interval(Duration::from_millis(10))
        .default_expiration(Duration::ZERO)
        .build();
    for i in 0..100 {
        if i % 2 == 0 {
            cache.set_with_expire(&format!("k{i}"), i, Duration::from_millis(30));
        } else {
            cache.set_with_expire(&format!("k{i}"), i, Duration::from_secs(30));
        }
    }
    thread::sleep(Duration::from_millis(300));

    let mut seen = HashSet::new();
    assert!(cache.range(&Cancel::new(), |key, _, _| {
        assert!(seen.insert(key.to_string()), "entry visited twice: {key}");
        true
    }));

    assert_eq!(seen.len(), 50);
    assert!(seen.iter().all(|k| {
        let i: usize = k[1..].parse().unwrap();
        i % 2 == 1
    }));
    // The walk eagerly evicted the expired half.
    assert_eq!(cache.len(), 50);
}

#[test]
fn quiescent_len_matches_the_materialized_view_after_churn() {
    let cache = Arc::new(Cache::new());
    let workers: usize = 8;

    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("shared-{}", (w * 31 + i) % 100);
                    cache.set(&key, i);
                    if i % 3 == 0 {
                        cache.delete(&key);
                    }
                    if i % 7 == 0 {
                        cache.pop(&key);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (keys, complete) = cache.keys(&Cancel::new());
    assert!(complete);
    assert_eq!(cache.len(), keys.len());
}
