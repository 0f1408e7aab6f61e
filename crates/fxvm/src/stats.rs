use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`VmStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VmStatsSnapshot {
    pub bundles_loaded: u64,
    pub plays: u64,
    pub dispatches: u64,
    pub extern_calls: u64,
    pub unbound_extern_calls: u64,
    pub faults: u64,
}

/// Execution counters. Cheap to update from the interpreter loop.
#[derive(Debug, Default)]
pub struct VmStats {
    bundles_loaded: AtomicU64,
    plays: AtomicU64,
    dispatches: AtomicU64,
    extern_calls: AtomicU64,
    unbound_extern_calls: AtomicU64,
    faults: AtomicU64,
}

impl VmStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_bundles_loaded(&self) {
        self.bundles_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_plays(&self) {
        self.plays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_extern_calls(&self) {
        self.extern_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unbound_extern_calls(&self) {
        self.unbound_extern_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_faults(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VmStatsSnapshot {
        VmStatsSnapshot {
            bundles_loaded: self.bundles_loaded.load(Ordering::Relaxed),
            plays: self.plays.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            extern_calls: self.extern_calls.load(Ordering::Relaxed),
            unbound_extern_calls: self.unbound_extern_calls.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
