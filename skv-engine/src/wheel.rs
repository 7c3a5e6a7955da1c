//! # Timing Wheel
//!
//! A hashed ring of per-tick key buckets. Keys are filed under
//! `(deadline / tick) & mask`, so advancing the wheel yields an
//! O(expired) candidate set instead of scanning live entries. The
//! wheel is a hash, not a priority queue: deadlines far apart may
//! collide in one bucket, and keys it returns are candidates only —
//! callers re-verify against the shard before evicting.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::duration_to_ns;

/// log2 of the default bucket count (16384 buckets).
pub(crate) const DEFAULT_WHEEL_BITS: u32 = 14;

struct WheelState {
    buckets: Vec<Vec<Arc<str>>>,
    /// Absolute time of the last `advance`.
    last_check_ns: i64,
}

/// Ring of key buckets indexed by expiration tick.
pub(crate) struct TimingWheel {
    tick_ns: i64,
    size: i64,
    mask: i64,
    state: Mutex<WheelState>,
}

impl TimingWheel {
    /// Creates a wheel of `1 << bits` buckets with the given tick,
    /// anchored at `now_ns`.
    pub fn new(now_ns: i64, tick: Duration, bits: u32) -> Self {
        let bits = if bits == 0 { DEFAULT_WHEEL_BITS } else { bits };
        let size = 1i64 << bits;
        let tick_ns = duration_to_ns(tick).max(1);

        TimingWheel {
            tick_ns,
            size,
            mask: size - 1,
            state: Mutex::new(WheelState {
                buckets: (0..size).map(|_| Vec::new()).collect(),
                last_check_ns: now_ns,
            }),
        }
    }

    /// Files `key` under its deadline bucket. No-op when the deadline
    /// is non-positive (no TTL).
    pub fn add(&self, key: Arc<str>, expire_ns: i64) {
        if expire_ns <= 0 {
            return;
        }
        let idx = ((expire_ns / self.tick_ns) & self.mask) as usize;
        self.state.lock().buckets[idx].push(key);
    }

    /// Moves the wheel forward to `now_ns` and returns the keys filed
    /// under every tick that elapsed since the previous advance.
    ///
    /// When starved for longer than `size * tick`, the elapsed tick
    /// count is clamped to one full revolution; deadlines that wrapped
    /// are picked up by lazy eviction on access instead.
    pub fn advance(&self, now_ns: i64) -> Vec<Arc<str>> {
        let mut state = self.state.lock();
        if now_ns <= state.last_check_ns {
            return Vec::new();
        }

        let start = state.last_check_ns / self.tick_ns;
        let end = now_ns / self.tick_ns;
        state.last_check_ns = now_ns;
        if start == end {
            return Vec::new();
        }

        let count = (end - start).min(self.size);
        let mut expired = Vec::new();
        for i in 1..=count {
            let idx = ((start + i) & self.mask) as usize;
            let bucket = &mut state.buckets[idx];
            if !bucket.is_empty() {
                // drain keeps the bucket's capacity for reuse
                expired.extend(bucket.drain(..));
            }
        }
        expired
    }

    /// Empties every bucket.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for bucket in &mut state.buckets {
            bucket.clear();
        }
    }

    /// Best-effort byte estimate of the wheel's owned storage.
    pub fn approx_size(&self) -> usize {
        let state = self.state.lock();
        let mut total = mem::size_of::<Self>();
        total += state.buckets.capacity() * mem::size_of::<Vec<Arc<str>>>();
        for bucket in &state.buckets {
            total += bucket.capacity() * mem::size_of::<Arc<str>>();
        }
        total
    }
}
