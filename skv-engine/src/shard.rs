//! # Shard Map
//!
//! Per-shard concurrent storage of `key -> entry` with a two-map
//! read/dirty split that keeps steady-state reads lock-free.
//!
//! ## Structure Overview
//!
//! ```text
//! ShardMap
//!   ├── read: ArcSwap<ReadOnly>          (atomically replaced snapshot)
//!   │     ├── m: HashMap<Arc<str>, Slot>
//!   │     └── amended: AtomicBool        (dirty may hold extra keys)
//!   ├── inner: Mutex<Inner>
//!   │     ├── dirty: Option<HashMap<Arc<str>, Slot>>
//!   │     └── misses: usize              (reads that fell through)
//!   └── expunged: Arc<Entry>             (per-map sentinel)
//! ```
//!
//! A `Slot` is a shared atomic pointer with three states: a live
//! entry, tombstoned (`None`, may still sit in `read`), or the
//! `expunged` sentinel proving the slot was absent from `dirty` when
//! `dirty` was last rebuilt. Slots are shared between `read` and
//! `dirty`, so a handle-level CAS is visible through both maps.
//!
//! Reads consult `read` without locking; only a miss on an amended
//! snapshot takes the mutex and falls through to `dirty`, bumping
//! `misses`. Once misses reach the dirty size, `dirty` is promoted
//! wholesale into a fresh `read` snapshot.
//!
//! Equality for the CAS operations is handle identity of a previously
//! observed entry, never structural comparison of the payload; that
//! keeps replace/delete races ABA-safe without requiring the payload
//! to be comparable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use arc_swap::{ArcSwap, ArcSwapOption};
use hashbrown::HashMap;
use parking_lot::Mutex;

/// What a slot can point at.
///
/// `Expunged` never escapes this module: loads filter it, and exactly
/// one sentinel instance exists per map so it can be recognized by
/// pointer identity.
pub(crate) enum Entry<V> {
    /// A stored payload with its absolute deadline in clock
    /// nanoseconds; a non-positive deadline means "no TTL".
    Live { value: V, expire_ns: i64 },
    /// Sentinel: the slot was known absent from `dirty` when `dirty`
    /// was last rebuilt.
    Expunged,
}

/// Shared handle to an entry; the handle itself is the CAS token.
pub(crate) type EntryRef<V> = Arc<Entry<V>>;

impl<V> Entry<V> {
    pub fn live(value: V, expire_ns: i64) -> EntryRef<V> {
        Arc::new(Entry::Live { value, expire_ns })
    }

    /// Returns the payload and deadline of a live entry.
    pub fn as_live(&self) -> Option<(&V, i64)> {
        match self {
            Entry::Live { value, expire_ns } => Some((value, *expire_ns)),
            Entry::Expunged => None,
        }
    }
}

/// Marker returned when a lock-free slot operation observed the
/// expunged sentinel and the caller must retry under the shard lock.
struct SlotExpunged;

/// Atomic entry pointer shared between `read` and `dirty`.
struct Slot<V>(Arc<ArcSwapOption<Entry<V>>>);

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Slot(Arc::clone(&self.0))
    }
}

fn same_entry<V>(a: &Option<EntryRef<V>>, b: &Option<EntryRef<V>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<V> Slot<V> {
    fn new_entry(entry: EntryRef<V>) -> Self {
        Slot(Arc::new(ArcSwapOption::new(Some(entry))))
    }

    /// Loads the current entry, hiding tombstoned and expunged slots.
    fn load(&self, expunged: &EntryRef<V>) -> Option<EntryRef<V>> {
        self.0.load_full().filter(|p| !Arc::ptr_eq(p, expunged))
    }

    fn raw(&self) -> Option<EntryRef<V>> {
        self.0.load_full()
    }

    /// Swaps in `new` unless the slot is expunged, returning the
    /// previous live entry (or `None` when tombstoned).
    fn try_swap(
        &self,
        new: &EntryRef<V>,
        expunged: &EntryRef<V>,
    ) -> Result<Option<EntryRef<V>>, SlotExpunged> {
        loop {
            let cur = self.0.load_full();
            if let Some(p) = &cur {
                if Arc::ptr_eq(p, expunged) {
                    return Err(SlotExpunged);
                }
            }
            let prev = self.0.compare_and_swap(&cur, Some(Arc::clone(new)));
            if same_entry(&*prev, &cur) {
                return Ok(cur);
            }
        }
    }

    /// Unconditional swap. Only valid while the shard lock is held
    /// and the slot is known not to be expunged.
    fn swap_locked(&self, new: EntryRef<V>, expunged: &EntryRef<V>) -> Option<EntryRef<V>> {
        self.0
            .swap(Some(new))
            .filter(|p| !Arc::ptr_eq(p, expunged))
    }

    /// Returns the existing live entry or stores `new` into an empty
    /// slot. `loaded` is true when an existing entry was returned.
    fn try_load_or_store(
        &self,
        new: &EntryRef<V>,
        expunged: &EntryRef<V>,
    ) -> Result<(EntryRef<V>, bool), SlotExpunged> {
        loop {
            match self.0.load_full() {
                Some(cur) => {
                    if Arc::ptr_eq(&cur, expunged) {
                        return Err(SlotExpunged);
                    }
                    return Ok((cur, true));
                }
                None => {
                    let prev = self
                        .0
                        .compare_and_swap(&None::<EntryRef<V>>, Some(Arc::clone(new)));
                    if prev.is_none() {
                        return Ok((Arc::clone(new), false));
                    }
                }
            }
        }
    }

    /// Atomically takes the live entry, leaving a tombstone.
    fn delete(&self, expunged: &EntryRef<V>) -> Option<EntryRef<V>> {
        loop {
            let cur = self.0.load_full()?;
            if Arc::ptr_eq(&cur, expunged) {
                return None;
            }
            let expected = Some(Arc::clone(&cur));
            let prev = self.0.compare_and_swap(&expected, None);
            if same_entry(&*prev, &expected) {
                return Some(cur);
            }
        }
    }

    /// Replaces the entry only if the current handle is `old`.
    fn compare_and_swap_entry(
        &self,
        old: &EntryRef<V>,
        new: &EntryRef<V>,
        expunged: &EntryRef<V>,
    ) -> bool {
        let cur = self.0.load_full();
        match &cur {
            Some(p) if Arc::ptr_eq(p, old) && !Arc::ptr_eq(p, expunged) => {}
            _ => return false,
        }
        let prev = self.0.compare_and_swap(&cur, Some(Arc::clone(new)));
        same_entry(&*prev, &cur)
    }

    /// Tombstones the entry only if the current handle is `old`.
    fn compare_and_delete_entry(&self, old: &EntryRef<V>, expunged: &EntryRef<V>) -> bool {
        let cur = self.0.load_full();
        match &cur {
            Some(p) if Arc::ptr_eq(p, old) && !Arc::ptr_eq(p, expunged) => {}
            _ => return false,
        }
        let prev = self.0.compare_and_swap(&cur, None);
        same_entry(&*prev, &cur)
    }

    /// Converts a tombstone into the expunged sentinel. Returns true
    /// when the slot ends up expunged. Requires the shard lock.
    fn try_expunge_locked(&self, expunged: &EntryRef<V>) -> bool {
        loop {
            match self.0.load_full() {
                None => {
                    let prev = self
                        .0
                        .compare_and_swap(&None::<EntryRef<V>>, Some(Arc::clone(expunged)));
                    if prev.is_none() {
                        return true;
                    }
                }
                Some(cur) => return Arc::ptr_eq(&cur, expunged),
            }
        }
    }

    /// Converts the expunged sentinel back into a plain tombstone so
    /// the slot may be stored through again. Returns true when this
    /// call performed the conversion. Requires the shard lock.
    fn unexpunge_locked(&self, expunged: &EntryRef<V>) -> bool {
        let expected = Some(Arc::clone(expunged));
        let prev = self.0.compare_and_swap(&expected, None);
        same_entry(&*prev, &expected)
    }
}

struct ReadOnly<V> {
    m: HashMap<Arc<str>, Slot<V>, RandomState>,
    /// True when `dirty` may contain keys absent from `m`.
    amended: AtomicBool,
}

impl<V> ReadOnly<V> {
    fn empty(hash_state: RandomState) -> Self {
        ReadOnly {
            m: HashMap::with_hasher(hash_state),
            amended: AtomicBool::new(false),
        }
    }

    fn amended(&self) -> bool {
        self.amended.load(Ordering::Acquire)
    }
}

struct Inner<V> {
    dirty: Option<HashMap<Arc<str>, Slot<V>, RandomState>>,
    misses: usize,
    hash_state: RandomState,
}

/// One shard's concurrent map. All operations are total; lost races
/// surface as `false` from the CAS variants.
pub(crate) struct ShardMap<V> {
    read: ArcSwap<ReadOnly<V>>,
    inner: Mutex<Inner<V>>,
    expunged: EntryRef<V>,
}

impl<V> ShardMap<V> {
    /// Creates an empty shard sharing `hash_state` so every map in
    /// the cache hashes keys identically.
    pub fn new(hash_state: RandomState) -> Self {
        ShardMap {
            read: ArcSwap::from_pointee(ReadOnly::empty(hash_state.clone())),
            inner: Mutex::new(Inner {
                dirty: None,
                misses: 0,
                hash_state,
            }),
            expunged: Arc::new(Entry::Expunged),
        }
    }

    /// Lock-free read in the common case; an amended miss falls
    /// through to `dirty` under the lock.
    pub fn load(&self, key: &str) -> Option<EntryRef<V>> {
        let read = self.read.load_full();
        let mut slot = read.m.get(key).cloned();
        if slot.is_none() && read.amended() {
            let mut inner = self.inner.lock();
            // The snapshot may have been promoted while waiting.
            let read = self.read.load_full();
            slot = read.m.get(key).cloned();
            if slot.is_none() && read.amended() {
                slot = inner.dirty.as_ref().and_then(|d| d.get(key).cloned());
                self.miss_locked(&mut inner);
            }
        }
        slot?.load(&self.expunged)
    }

    /// Replaces or inserts, returning `(previous, loaded)`.
    pub fn swap(&self, key: &Arc<str>, entry: EntryRef<V>) -> (Option<EntryRef<V>>, bool) {
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key.as_ref()) {
            if let Ok(prev) = slot.try_swap(&entry, &self.expunged) {
                let loaded = prev.is_some();
                return (prev, loaded);
            }
        }
        drop(read);

        let mut inner = self.inner.lock();
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key.as_ref()) {
            if slot.unexpunge_locked(&self.expunged) {
                // The slot was expunged, proving it is missing from
                // dirty; reinsert it before storing through it.
                if let Some(dirty) = inner.dirty.as_mut() {
                    dirty.insert(Arc::clone(key), slot.clone());
                }
            }
            let prev = slot.swap_locked(entry, &self.expunged);
            let loaded = prev.is_some();
            (prev, loaded)
        } else if let Some(slot) = inner.dirty.as_ref().and_then(|d| d.get(key.as_ref()).cloned()) {
            let prev = slot.swap_locked(entry, &self.expunged);
            let loaded = prev.is_some();
            (prev, loaded)
        } else {
            if !read.amended() {
                // First brand-new key since the last promotion: build
                // dirty from read, then publish the amended flag.
                self.dirty_locked(&mut inner, &read);
                read.amended.store(true, Ordering::Release);
            }
            if let Some(dirty) = inner.dirty.as_mut() {
                dirty.insert(Arc::clone(key), Slot::new_entry(entry));
            }
            (None, false)
        }
    }

    /// Unconditional put.
    pub fn store(&self, key: &Arc<str>, entry: EntryRef<V>) {
        let _ = self.swap(key, entry);
    }

    /// Returns the existing entry or stores the given one, with
    /// `loaded` true on the existing-entry path.
    pub fn load_or_store(&self, key: &Arc<str>, entry: EntryRef<V>) -> (EntryRef<V>, bool) {
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key.as_ref()) {
            if let Ok(result) = slot.try_load_or_store(&entry, &self.expunged) {
                return result;
            }
        }
        drop(read);

        let mut inner = self.inner.lock();
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key.as_ref()) {
            if slot.unexpunge_locked(&self.expunged) {
                if let Some(dirty) = inner.dirty.as_mut() {
                    dirty.insert(Arc::clone(key), slot.clone());
                }
            }
            match slot.try_load_or_store(&entry, &self.expunged) {
                Ok(result) => result,
                // Cannot re-expunge while the lock is held.
                Err(SlotExpunged) => (entry, false),
            }
        } else if let Some(slot) = inner.dirty.as_ref().and_then(|d| d.get(key.as_ref()).cloned()) {
            let result = match slot.try_load_or_store(&entry, &self.expunged) {
                Ok(result) => result,
                // Dirty slots are never expunged by construction.
                Err(SlotExpunged) => (entry, false),
            };
            self.miss_locked(&mut inner);
            result
        } else {
            if !read.amended() {
                self.dirty_locked(&mut inner, &read);
                read.amended.store(true, Ordering::Release);
            }
            if let Some(dirty) = inner.dirty.as_mut() {
                dirty.insert(Arc::clone(key), Slot::new_entry(Arc::clone(&entry)));
            }
            (entry, false)
        }
    }

    /// Atomic take: removes the key and returns its live entry.
    pub fn load_and_delete(&self, key: &str) -> Option<EntryRef<V>> {
        let read = self.read.load_full();
        let mut slot = read.m.get(key).cloned();
        if slot.is_none() && read.amended() {
            let mut inner = self.inner.lock();
            let read = self.read.load_full();
            slot = read.m.get(key).cloned();
            if slot.is_none() && read.amended() {
                // Dirty-only keys are removed outright; read keys are
                // tombstoned below so the snapshot stays coherent.
                slot = inner.dirty.as_mut().and_then(|d| d.remove(key));
                self.miss_locked(&mut inner);
            }
        }
        slot?.delete(&self.expunged)
    }

    /// Replaces the entry only when the current handle is `old`.
    pub fn compare_and_swap(&self, key: &str, old: &EntryRef<V>, new: EntryRef<V>) -> bool {
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key) {
            return slot.compare_and_swap_entry(old, &new, &self.expunged);
        }
        if !read.amended() {
            return false;
        }
        drop(read);

        let mut inner = self.inner.lock();
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key) {
            slot.compare_and_swap_entry(old, &new, &self.expunged)
        } else if let Some(slot) = inner.dirty.as_ref().and_then(|d| d.get(key).cloned()) {
            let swapped = slot.compare_and_swap_entry(old, &new, &self.expunged);
            self.miss_locked(&mut inner);
            swapped
        } else {
            false
        }
    }

    /// Deletes the key only when the current handle is `old`.
    pub fn compare_and_delete(&self, key: &str, old: &EntryRef<V>) -> bool {
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key) {
            return slot.compare_and_delete_entry(old, &self.expunged);
        }
        if !read.amended() {
            return false;
        }
        drop(read);

        let mut inner = self.inner.lock();
        let read = self.read.load_full();
        if let Some(slot) = read.m.get(key) {
            slot.compare_and_delete_entry(old, &self.expunged)
        } else if let Some(slot) = inner.dirty.as_ref().and_then(|d| d.get(key).cloned()) {
            let deleted = slot.compare_and_delete_entry(old, &self.expunged);
            self.miss_locked(&mut inner);
            deleted
        } else {
            false
        }
    }

    /// Visits live entries with best-effort snapshot semantics: a
    /// concurrent writer may cause an entry to be seen zero or one
    /// time. Returning false from `visit` stops the walk.
    pub fn range(&self, mut visit: impl FnMut(&Arc<str>, EntryRef<V>) -> bool) {
        let mut read = self.read.load_full();
        if read.amended() {
            // Promote wholesale so the walk sees one coherent map.
            let mut inner = self.inner.lock();
            let current = self.read.load_full();
            if current.amended() {
                let m = inner
                    .dirty
                    .take()
                    .unwrap_or_else(|| HashMap::with_hasher(inner.hash_state.clone()));
                let promoted = Arc::new(ReadOnly {
                    m,
                    amended: AtomicBool::new(false),
                });
                self.read.store(Arc::clone(&promoted));
                inner.misses = 0;
                read = promoted;
            } else {
                read = current;
            }
        }

        for (key, slot) in &read.m {
            let Some(entry) = slot.load(&self.expunged) else {
                continue;
            };
            if !visit(key, entry) {
                break;
            }
        }
    }

    /// Drops all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        self.read
            .store(Arc::new(ReadOnly::empty(inner.hash_state.clone())));
        inner.dirty = None;
        inner.misses = 0;
    }

    /// Best-effort byte estimate of this shard's owned storage. Key
    /// and payload heap data behind shared handles is attributed once.
    pub fn approx_size(&self) -> usize {
        let mut total = std::mem::size_of::<Self>();

        let read = self.read.load_full();
        total += read.m.capacity() * std::mem::size_of::<(Arc<str>, Slot<V>)>();
        for (key, slot) in &read.m {
            total += key.len();
            if slot.raw().is_some() {
                total += std::mem::size_of::<Entry<V>>();
            }
        }

        let inner = self.inner.lock();
        if let Some(dirty) = &inner.dirty {
            total += dirty.capacity() * std::mem::size_of::<(Arc<str>, Slot<V>)>();
        }
        total
    }

    fn miss_locked(&self, inner: &mut Inner<V>) {
        inner.misses += 1;
        let dirty_len = inner.dirty.as_ref().map_or(0, |d| d.len());
        if inner.misses < dirty_len {
            return;
        }
        if let Some(dirty) = inner.dirty.take() {
            self.read.store(Arc::new(ReadOnly {
                m: dirty,
                amended: AtomicBool::new(false),
            }));
        }
        inner.misses = 0;
    }

    /// Rebuilds `dirty` from the read snapshot, expunging tombstoned
    /// slots to prove they are absent from the new dirty map.
    fn dirty_locked(&self, inner: &mut Inner<V>, read: &ReadOnly<V>) {
        if inner.dirty.is_some() {
            return;
        }
        let mut dirty =
            HashMap::with_capacity_and_hasher(read.m.len(), inner.hash_state.clone());
        for (key, slot) in &read.m {
            if !slot.try_expunge_locked(&self.expunged) {
                dirty.insert(Arc::clone(key), slot.clone());
            }
        }
        inner.dirty = Some(dirty);
    }
}
