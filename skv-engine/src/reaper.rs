//! # Reaper
//!
//! Background task that drives time forward: each tick it advances
//! the timing wheel, evicts the candidates that re-verify as expired,
//! and forwards bus notifications to the user hook. The task holds a
//! `Weak` cache handle and exits on its own once the cache is gone.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::trace;

use crate::cache::Cache;
use crate::cancel::Cancel;

/// Handle for a running reaper. `stop` signals cancellation and
/// joins the thread; latency is bounded by one sweep interval.
pub(crate) struct ReaperHandle {
    cancel: Cancel,
    join: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    pub fn stop(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub(crate) fn spawn<V>(cache: Weak<Cache<V>>, interval: Duration) -> ReaperHandle
where
    V: Clone + Send + Sync + 'static,
{
    let interval = if interval.is_zero() {
        Duration::from_millis(1)
    } else {
        interval
    };

    let cancel = Cancel::new();
    let task_cancel = cancel.clone();
    let join = thread::spawn(move || loop {
        thread::sleep(interval);
        if task_cancel.is_cancelled() {
            break;
        }
        let Some(cache) = cache.upgrade() else {
            break;
        };

        let swept = cache.sweep_wheel(&task_cancel);
        if swept > 0 {
            trace!(swept, "reaper evicted expired entries");
        }
        cache.drain_bus();
    });

    ReaperHandle {
        cancel,
        join: Some(join),
    }
}
