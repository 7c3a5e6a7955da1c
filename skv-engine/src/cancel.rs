//! # Cancellation Handle
//!
//! Bulk operations (`range`, map views, `delete_expired`, snapshots)
//! and the reaper accept a shared flag that callers may raise to stop
//! work early. Cancelled operations return whatever they produced so
//! far together with a truthful completion indicator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag.
///
/// Cancellation is one-way: once raised the flag stays raised for the
/// lifetime of all clones.
#[derive(Clone, Debug, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    /// Creates a fresh, unraised handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag for every clone of this handle.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once any clone has called `cancel`.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
