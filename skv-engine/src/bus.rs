//! # Expiration Bus
//!
//! Bounded channel carrying `(key, value)` pairs from eviction sites
//! to the reaper, which forwards them to the user hook. Publishing
//! never blocks: when the channel is full the notification is
//! dropped, keeping eviction and the reaper free-running. Delivery is
//! therefore at-most-once with no cross-shard ordering.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

/// How many notifications each shard may have in flight.
pub(crate) const BUS_SLOTS_PER_SHARD: usize = 10;

pub(crate) struct ExpirationBus<V> {
    tx: Sender<(Arc<str>, V)>,
    rx: Receiver<(Arc<str>, V)>,
}

impl<V> ExpirationBus<V> {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        ExpirationBus { tx, rx }
    }

    /// Non-blocking send; silently drops the pair when full.
    pub fn publish(&self, key: Arc<str>, value: V) {
        let _ = self.tx.try_send((key, value));
    }

    /// Takes the next pending notification, if any.
    pub fn try_next(&self) -> Option<(Arc<str>, V)> {
        self.rx.try_recv().ok()
    }
}
