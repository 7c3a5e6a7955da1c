//! # Coarse Atomic Clock
//!
//! A single atomic nanosecond timestamp refreshed by a background
//! thread. Every expiry comparison in the hot path reads this atomic
//! instead of calling into the OS, trading at most one refresh
//! interval of skew for constant-cost reads. TTL precision is already
//! bounded by the same interval, so the skew is not observable through
//! the public surface.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Converts a TTL duration into signed nanoseconds.
///
/// Saturates at `i64::MAX`, which is ~292 years and far beyond any
/// deadline the cache can meaningfully track.
pub(crate) fn duration_to_ns(d: Duration) -> i64 {
    d.as_nanos().min(i64::MAX as u128) as i64
}

struct ClockCell {
    now_ns: AtomicI64,
    stopped: AtomicBool,
}

/// Shared monotonic timestamp source for one cache instance.
pub(crate) struct Clock {
    cell: Arc<ClockCell>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Starts the background refresher at the given interval.
    ///
    /// The initial value is published before this returns, so
    /// `now_ns` is usable immediately.
    pub fn start(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        // Anchor the monotonic Instant stream to a wall-clock epoch so
        // published values look like unix nanos; monotonicity comes
        // from Instant, not from the wall clock.
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;
        let origin = Instant::now();

        let cell = Arc::new(ClockCell {
            now_ns: AtomicI64::new(epoch_ns),
            stopped: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&cell);
        let refresher = thread::spawn(move || loop {
            thread::sleep(interval);
            let Some(cell) = weak.upgrade() else { break };
            if cell.stopped.load(Ordering::Acquire) {
                break;
            }
            let now = epoch_ns + origin.elapsed().as_nanos() as i64;
            // fetch_max keeps published values non-decreasing even if
            // a stale refresh lands after a newer one.
            cell.now_ns.fetch_max(now, Ordering::AcqRel);
        });

        Clock {
            cell,
            refresher: Mutex::new(Some(refresher)),
        }
    }

    /// Returns the most recently published timestamp. Never blocks.
    pub fn now_ns(&self) -> i64 {
        self.cell.now_ns.load(Ordering::Acquire)
    }

    /// Stops the refresher; later `now_ns` calls return the last
    /// published value. Idempotent.
    pub fn stop(&self) {
        if self.cell.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = self.refresher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_immediately_and_advances() {
        let clock = Clock::start(Duration::from_millis(5));
        let first = clock.now_ns();
        assert!(first > 0);

        thread::sleep(Duration::from_millis(50));
        let later = clock.now_ns();
        assert!(later > first);
        clock.stop();
    }

    #[test]
    fn values_are_non_decreasing() {
        let clock = Clock::start(Duration::from_millis(1));
        let mut last = clock.now_ns();
        for _ in 0..100 {
            let now = clock.now_ns();
            assert!(now >= last);
            last = now;
            thread::sleep(Duration::from_micros(200));
        }
        clock.stop();
    }

    #[test]
    fn stop_freezes_the_value_and_is_idempotent() {
        let clock = Clock::start(Duration::from_millis(1));
        clock.stop();
        clock.stop();

        let frozen = clock.now_ns();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.now_ns(), frozen);
    }

    #[test]
    fn duration_conversion_saturates() {
        assert_eq!(duration_to_ns(Duration::ZERO), 0);
        assert_eq!(duration_to_ns(Duration::from_secs(1)), 1_000_000_000);
        assert_eq!(duration_to_ns(Duration::MAX), i64::MAX);
    }
}
