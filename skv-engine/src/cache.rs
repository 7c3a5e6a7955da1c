//! # Cache Façade
//!
//! The public surface. A `Cache` owns 512 shard maps, one timing
//! wheel, one coarse clock, and the expiration bus; the background
//! reaper borrows them through a `Weak` handle for the duration of
//! its task.
//!
//! Hot-path reads and writes never block on a shard mutex in the
//! common case; they may block briefly on first-time key insertion,
//! on expunged-slot resurrection, or while a shard promotes its dirty
//! map. Expiry checks read the cached clock, so TTL precision is
//! bounded by the configured `clock_interval`.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::debug;

use crate::bus::{ExpirationBus, BUS_SLOTS_PER_SHARD};
use crate::cancel::Cancel;
use crate::clock::{duration_to_ns, Clock};
use crate::options::CacheBuilder;
use crate::reaper::ReaperHandle;
use crate::router::{ShardRouter, SHARD_COUNT};
use crate::shard::{Entry, ShardMap};
use crate::wheel::TimingWheel;

/// User callback invoked with each confirmed-expired `(key, value)`
/// pair while hook mode is enabled and the reaper is running.
pub type ExpiredHook<V> = Box<dyn Fn(&str, V) + Send + Sync>;

/// Sharded in-process key/value cache with optional TTL expiration.
///
/// Values are carried by value and cloned out on reads, so `V` is
/// typically cheap to clone (`Arc` payloads, small structs, numbers).
/// All operations take `&self` and are callable from any thread.
pub struct Cache<V> {
    shards: Box<[ShardMap<V>]>,
    router: ShardRouter,
    wheel: TimingWheel,
    clock: Clock,
    bus: ExpirationBus<V>,

    /// Live-entry counter across all shards.
    len: AtomicU64,
    /// Default TTL delta in nanoseconds; non-positive disables it.
    expire_default_ns: AtomicI64,
    hook_enabled: AtomicBool,
    hook: ArcSwapOption<ExpiredHook<V>>,

    reaper: Mutex<Option<ReaperHandle>>,
}

impl<V> Cache<V> {
    /// Creates a cache with default options.
    pub fn new() -> Self {
        CacheBuilder::new().build()
    }

    /// Returns a builder for a customized cache.
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    pub(crate) fn from_builder(builder: CacheBuilder<V>) -> Self {
        let clock = Clock::start(builder.clock_interval);
        let wheel = TimingWheel::new(clock.now_ns(), builder.clock_interval, builder.wheel_bits);
        let router = ShardRouter::new(
            builder.max_key_len,
            builder.short_hasher,
            builder.long_hasher,
        );

        // One hash state shared by every shard keeps key distribution
        // uniform across read and dirty maps.
        let hash_state = RandomState::new();
        let shards: Box<[ShardMap<V>]> = (0..SHARD_COUNT)
            .map(|_| ShardMap::new(hash_state.clone()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Cache {
            shards,
            router,
            wheel,
            clock,
            bus: ExpirationBus::bounded(SHARD_COUNT * BUS_SLOTS_PER_SHARD),
            len: AtomicU64::new(0),
            expire_default_ns: AtomicI64::new(duration_to_ns(builder.default_expiration)),
            hook_enabled: AtomicBool::new(builder.hook.is_some()),
            hook: ArcSwapOption::new(builder.hook.map(Arc::new)),
            reaper: Mutex::new(None),
        }
    }

    fn shard_for(&self, key: &str) -> &ShardMap<V> {
        &self.shards[self.router.shard_of(key)]
    }

    /// Number of live entries. Entries past their deadline but not
    /// yet evicted still count until eviction confirms them.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort estimate of the bytes owned by the cache's
    /// internal structures.
    pub fn size(&self) -> usize {
        let mut total = std::mem::size_of::<Self>() + self.wheel.approx_size();
        for shard in self.shards.iter() {
            total += shard.approx_size();
        }
        total
    }

    /// Replaces the default TTL delta applied by `set`.
    pub fn set_default_expiration(&self, ttl: Duration) {
        self.expire_default_ns
            .store(duration_to_ns(ttl), Ordering::Relaxed);
    }

    /// Registers (or replaces) the expiration hook. Hook mode must
    /// also be enabled for notifications to be published.
    pub fn set_expired_hook(&self, hook: impl Fn(&str, V) + Send + Sync + 'static) {
        let hook: ExpiredHook<V> = Box::new(hook);
        self.hook.store(Some(Arc::new(hook)));
    }

    /// Turns hook mode on; eviction publishes to the bus from now on.
    pub fn enable_expired_hook(&self) {
        self.hook_enabled.store(true, Ordering::Release);
    }

    /// Turns hook mode off; eviction skips publishing.
    pub fn disable_expired_hook(&self) {
        self.hook_enabled.store(false, Ordering::Release);
    }

    /// Stops the background reaper, if running. Idempotent.
    pub fn stop_expired(&self) {
        let handle = self.reaper.lock().take();
        if let Some(handle) = handle {
            handle.stop();
            debug!("expiration reaper stopped");
        }
    }

    /// Stops the reaper and the clock. After this the cache still
    /// serves requests, but time is frozen at the last published
    /// tick, so no further entries expire on their own.
    pub fn stop(&self) {
        self.stop_expired();
        self.clock.stop();
        debug!("cache stopped");
    }
}

impl<V: Clone> Cache<V> {
    /// Returns the value when present and not past its deadline.
    /// An expired entry is lazily evicted and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.shard_for(key).load(key)?;
        let (value, expire_ns) = entry.as_live()?;
        if is_expired(expire_ns, self.clock.now_ns()) {
            self.lazy_expire(key);
            return None;
        }
        Some(value.clone())
    }

    /// Like [`get`](Self::get), additionally returning the observed
    /// deadline. An expired hit reports `(None, deadline)` so callers
    /// can see the deadline that was missed; a miss reports 0.
    pub fn get_with_expire(&self, key: &str) -> (Option<V>, i64) {
        let Some(entry) = self.shard_for(key).load(key) else {
            return (None, 0);
        };
        let Some((value, expire_ns)) = entry.as_live() else {
            return (None, 0);
        };
        if is_expired(expire_ns, self.clock.now_ns()) {
            self.lazy_expire(key);
            return (None, expire_ns);
        }
        (Some(value.clone()), expire_ns)
    }

    /// Returns the raw value regardless of its deadline and never
    /// triggers eviction.
    pub fn get_raw(&self, key: &str) -> Option<V> {
        let entry = self.shard_for(key).load(key)?;
        entry.as_live().map(|(value, _)| value.clone())
    }

    /// On a valid hit, pushes the deadline out to `now + default TTL`
    /// and returns the value.
    pub fn get_refresh(&self, key: &str) -> Option<V> {
        self.refresh_with_ttl_ns(key, self.expire_default_ns.load(Ordering::Relaxed))
    }

    /// On a valid hit, pushes the deadline out to `now + ttl` and
    /// returns the value. `Duration::ZERO` clears the deadline.
    pub fn get_refresh_with(&self, key: &str, ttl: Duration) -> Option<V> {
        self.refresh_with_ttl_ns(key, duration_to_ns(ttl))
    }

    fn refresh_with_ttl_ns(&self, key: &str, ttl_ns: i64) -> Option<V> {
        let shard = self.shard_for(key);
        loop {
            let current = shard.load(key)?;
            let (value, expire_ns) = current.as_live()?;
            let now = self.clock.now_ns();
            if is_expired(expire_ns, now) {
                self.lazy_expire(key);
                return None;
            }

            let deadline = deadline_from(now, ttl_ns);
            let value = value.clone();
            if shard.compare_and_swap(key, &current, Entry::live(value.clone(), deadline)) {
                if deadline > 0 {
                    self.wheel.add(Arc::from(key), deadline);
                }
                return Some(value);
            }
            // Lost the race; re-observe and retry.
        }
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl_ns(key, value, self.expire_default_ns.load(Ordering::Relaxed));
    }

    /// Stores `value` under `key` with an explicit TTL;
    /// `Duration::ZERO` stores without a deadline.
    pub fn set_with_expire(&self, key: &str, value: V, ttl: Duration) {
        self.set_with_ttl_ns(key, value, duration_to_ns(ttl));
    }

    fn set_with_ttl_ns(&self, key: &str, value: V, ttl_ns: i64) {
        let key: Arc<str> = Arc::from(key);
        let deadline = deadline_from(self.clock.now_ns(), ttl_ns);
        let (_, loaded) = self
            .shard_for(&key)
            .swap(&key, Entry::live(value, deadline));
        if !loaded {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        if deadline > 0 {
            self.wheel.add(key, deadline);
        }
    }

    /// Stores `value` only when `key` is absent or holds an expired
    /// entry. Returns true when this call's value was stored.
    pub fn set_if_absent(&self, key: &str, value: V) -> bool {
        self.set_if_absent_ttl_ns(key, value, self.expire_default_ns.load(Ordering::Relaxed))
    }

    /// [`set_if_absent`](Self::set_if_absent) with an explicit TTL.
    pub fn set_if_absent_with_expire(&self, key: &str, value: V, ttl: Duration) -> bool {
        self.set_if_absent_ttl_ns(key, value, duration_to_ns(ttl))
    }

    fn set_if_absent_ttl_ns(&self, key: &str, value: V, ttl_ns: i64) -> bool {
        let key: Arc<str> = Arc::from(key);
        let shard = self.shard_for(&key);
        let now = self.clock.now_ns();
        let deadline = deadline_from(now, ttl_ns);
        let entry = Entry::live(value, deadline);

        loop {
            let (current, loaded) = shard.load_or_store(&key, Arc::clone(&entry));
            if !loaded {
                self.len.fetch_add(1, Ordering::Relaxed);
                if deadline > 0 {
                    self.wheel.add(Arc::clone(&key), deadline);
                }
                return true;
            }

            let Some((_, current_expire)) = current.as_live() else {
                return false;
            };
            if !is_expired(current_expire, now) {
                // A valid entry wins; leave it in place.
                return false;
            }

            // The existing entry is expired: replace it in its slot.
            // The slot is reused, so the live count does not change.
            if shard.compare_and_swap(&key, &current, Arc::clone(&entry)) {
                if deadline > 0 {
                    self.wheel.add(Arc::clone(&key), deadline);
                }
                return true;
            }
            // Raced with another writer; observe the winner and retry.
        }
    }

    /// Adds `add` to the deadline of a valid entry and re-registers
    /// it with the wheel. Entries without a deadline are untouched.
    /// Returns false when the key is absent or already expired.
    pub fn extend_expire(&self, key: &str, add: Duration) -> bool {
        let add_ns = duration_to_ns(add);
        let shard = self.shard_for(key);
        loop {
            let Some(current) = shard.load(key) else {
                return false;
            };
            let Some((value, expire_ns)) = current.as_live() else {
                return false;
            };
            if expire_ns <= 0 {
                // No deadline to extend.
                return true;
            }
            if is_expired(expire_ns, self.clock.now_ns()) {
                self.lazy_expire(key);
                return false;
            }

            let deadline = expire_ns.saturating_add(add_ns);
            if shard.compare_and_swap(key, &current, Entry::live(value.clone(), deadline)) {
                self.wheel.add(Arc::from(key), deadline);
                return true;
            }
        }
    }

    /// Unconditionally removes `key`, returning the previous value
    /// (even when it was already past its deadline).
    pub fn delete(&self, key: &str) -> Option<V> {
        let prev = self.shard_for(key).load_and_delete(key)?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        prev.as_live().map(|(value, _)| value.clone())
    }

    /// Removes `key` and returns its value. When the removed entry
    /// was already expired the result is absent and, with hook mode
    /// enabled, the pair is published as a regular expiration.
    pub fn pop(&self, key: &str) -> Option<V> {
        let prev = self.shard_for(key).load_and_delete(key)?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        let (value, expire_ns) = prev.as_live()?;
        if is_expired(expire_ns, self.clock.now_ns()) {
            if self.hook_enabled.load(Ordering::Acquire) {
                self.bus.publish(Arc::from(key), value.clone());
            }
            return None;
        }
        Some(value.clone())
    }

    /// Visits every valid entry as `(key, value, deadline)`. Invalid
    /// entries encountered along the way are eagerly evicted instead
    /// of visited. Entries are visited at most once; no consistent
    /// snapshot across shards is implied.
    ///
    /// Returns true when the walk was not cancelled. The visitor may
    /// stop the walk early by returning false; that still counts as a
    /// complete (uncancelled) walk.
    pub fn range(&self, cancel: &Cancel, mut visit: impl FnMut(&str, &V, i64) -> bool) -> bool {
        for shard in self.shards.iter() {
            if cancel.is_cancelled() {
                return false;
            }
            let now = self.clock.now_ns();
            let mut keep_going = true;
            let mut expired: Vec<Arc<str>> = Vec::new();

            shard.range(|key, entry| {
                let Some((value, expire_ns)) = entry.as_live() else {
                    return true;
                };
                if is_expired(expire_ns, now) {
                    expired.push(Arc::clone(key));
                    return true;
                }
                keep_going = visit(key, value, expire_ns);
                keep_going
            });

            for key in expired {
                self.lazy_expire(&key);
            }
            if !keep_going {
                return true;
            }
        }
        true
    }

    /// Collects the keys of all valid entries.
    pub fn keys(&self, cancel: &Cancel) -> (Vec<String>, bool) {
        let mut out = Vec::new();
        let complete = self.range(cancel, |key, _, _| {
            out.push(key.to_string());
            true
        });
        (out, complete)
    }

    /// Materializes all valid entries into an owned map.
    pub fn to_map(&self, cancel: &Cancel) -> (HashMap<String, V>, bool) {
        let mut out = HashMap::new();
        let complete = self.range(cancel, |key, value, _| {
            out.insert(key.to_string(), value.clone());
            true
        });
        (out, complete)
    }

    /// Materializes every stored entry, ignoring deadlines and
    /// without triggering eviction.
    pub fn to_raw_map(&self, cancel: &Cancel) -> (HashMap<String, V>, bool) {
        let mut out = HashMap::new();
        for shard in self.shards.iter() {
            if cancel.is_cancelled() {
                return (out, false);
            }
            shard.range(|key, entry| {
                if let Some((value, _)) = entry.as_live() {
                    out.insert(key.to_string(), value.clone());
                }
                true
            });
        }
        (out, true)
    }

    /// Drops every entry and resets the live count.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
        self.wheel.clear();
        self.len.store(0, Ordering::Relaxed);
        debug!("cache cleared");
    }

    /// Scans all shards and evicts every entry past its deadline,
    /// returning the confirmed-evicted count. Checks `cancel` between
    /// shards and between evictions; a cancelled scan returns the
    /// count so far.
    pub fn delete_expired(&self, cancel: &Cancel) -> u64 {
        let mut swept = 0;
        for shard in self.shards.iter() {
            if cancel.is_cancelled() {
                return swept;
            }
            let now = self.clock.now_ns();
            let mut expired: Vec<Arc<str>> = Vec::new();
            shard.range(|key, entry| {
                if let Some((_, expire_ns)) = entry.as_live() {
                    if is_expired(expire_ns, now) {
                        expired.push(Arc::clone(key));
                    }
                }
                true
            });

            for key in expired {
                if cancel.is_cancelled() {
                    return swept;
                }
                if self.evict_if_expired(&key) {
                    swept += 1;
                }
            }
        }
        swept
    }

    /// One wheel-driven sweep: advances the wheel to the current tick
    /// and evicts every candidate that re-verifies as expired.
    pub(crate) fn sweep_wheel(&self, cancel: &Cancel) -> u64 {
        let now = self.clock.now_ns();
        let mut swept = 0;
        for key in self.wheel.advance(now) {
            if cancel.is_cancelled() {
                break;
            }
            if self.evict_if_expired(&key) {
                swept += 1;
            }
        }
        swept
    }

    /// Forwards pending bus notifications to the user hook. A hook
    /// panic is contained and discarded so delivery continues.
    pub(crate) fn drain_bus(&self) {
        while let Some((key, value)) = self.bus.try_next() {
            if let Some(hook) = self.hook.load_full() {
                let _ = catch_unwind(AssertUnwindSafe(|| (*hook)(&key, value)));
            }
        }
    }

    /// Lazy expiration: re-verifies the observed entry and deletes it
    /// only when it is still the current handle and still expired.
    fn lazy_expire(&self, key: &str) {
        let _ = self.evict_if_expired(key);
    }

    /// Confirms and evicts one expired entry. Returns true when this
    /// call performed the eviction.
    fn evict_if_expired(&self, key: &str) -> bool {
        let shard = self.shard_for(key);
        let Some(current) = shard.load(key) else {
            return false;
        };
        let Some((value, expire_ns)) = current.as_live() else {
            return false;
        };
        if !is_expired(expire_ns, self.clock.now_ns()) {
            // A racing writer refreshed the entry; keep it.
            return false;
        }
        if !shard.compare_and_delete(key, &current) {
            return false;
        }

        self.len.fetch_sub(1, Ordering::Relaxed);
        if self.hook_enabled.load(Ordering::Acquire) {
            self.bus.publish(Arc::from(key), value.clone());
        }
        true
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Spawns the background reaper with the given sweep interval.
    /// Returns false when a reaper is already running.
    ///
    /// The reaper holds only a weak handle, so dropping the last
    /// `Arc` of the cache terminates it even without `stop`.
    pub fn start_expired(self: &Arc<Self>, interval: Duration) -> bool {
        let mut guard = self.reaper.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(crate::reaper::spawn(Arc::downgrade(self), interval));
        debug!(interval_ms = interval.as_millis() as u64, "expiration reaper started");
        true
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An entry with deadline `expire_ns` is expired once the clock moves
/// strictly past it; non-positive deadlines never expire.
fn is_expired(expire_ns: i64, now_ns: i64) -> bool {
    expire_ns > 0 && now_ns > expire_ns
}

/// Deadline arithmetic shared by all TTL-taking operations: positive
/// deltas become absolute deadlines, everything else stays as the
/// "no TTL" marker.
fn deadline_from(now_ns: i64, ttl_ns: i64) -> i64 {
    if ttl_ns > 0 {
        now_ns + ttl_ns
    } else {
        ttl_ns
    }
}
