//! Synchronization counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the synchronizer
#[derive(Debug, Default)]
pub(crate) struct SyncCounters {
    pub timer_recomputations: AtomicU64,
    pub display_recomputations: AtomicU64,
    pub pushes: AtomicU64,
    pub skipped_duplicates: AtomicU64,
    pub rate_limited: AtomicU64,
    pub implicit_unregisters: AtomicU64,
    pub panels_closed: AtomicU64,
}

impl SyncCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, registrations: usize) -> SyncStats {
        SyncStats {
            registrations,
            timer_recomputations: self.timer_recomputations.load(Ordering::Relaxed),
            display_recomputations: self.display_recomputations.load(Ordering::Relaxed),
            pushes: self.pushes.load(Ordering::Relaxed),
            skipped_duplicates: self.skipped_duplicates.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            implicit_unregisters: self.implicit_unregisters.load(Ordering::Relaxed),
            panels_closed: self.panels_closed.load(Ordering::Relaxed),
        }
    }
}

/// Synchronization statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Open viewer registrations
    pub registrations: usize,
    /// Timer values computed (once per spawner per pass)
    pub timer_recomputations: u64,
    /// Non-timer display values computed on a cache miss
    pub display_recomputations: u64,
    pub pushes: u64,
    /// Viewers skipped because nothing changed
    pub skipped_duplicates: u64,
    /// Viewers deferred by the push cooldown
    pub rate_limited: u64,
    /// Viewers dropped after an unreachable push
    pub implicit_unregisters: u64,
    /// Panels force-closed by spawner removal
    pub panels_closed: u64,
}
