use std::sync::atomic::{AtomicU64, Ordering};

/// Per-table counters. Monotonic for the life of the table.
#[derive(Debug, Default)]
pub struct NeighStats {
    allocs: AtomicU64,
    destroys: AtomicU64,
    hash_grows: AtomicU64,
    res_failed: AtomicU64,
    lookups: AtomicU64,
    hits: AtomicU64,
    periodic_gc_runs: AtomicU64,
    forced_gc_runs: AtomicU64,
    unres_discards: AtomicU64,
}

/// Point-in-time copy of `NeighStats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub allocs: u64,
    pub destroys: u64,
    pub hash_grows: u64,
    pub res_failed: u64,
    pub lookups: u64,
    pub hits: u64,
    pub periodic_gc_runs: u64,
    pub forced_gc_runs: u64,
    pub unres_discards: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Counter {
    Allocs,
    Destroys,
    HashGrows,
    ResFailed,
    Lookups,
    Hits,
    PeriodicGcRuns,
    ForcedGcRuns,
    UnresDiscards,
}

impl NeighStats {
    pub(crate) fn inc(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Allocs => &self.allocs,
            Counter::Destroys => &self.destroys,
            Counter::HashGrows => &self.hash_grows,
            Counter::ResFailed => &self.res_failed,
            Counter::Lookups => &self.lookups,
            Counter::Hits => &self.hits,
            Counter::PeriodicGcRuns => &self.periodic_gc_runs,
            Counter::ForcedGcRuns => &self.forced_gc_runs,
            Counter::UnresDiscards => &self.unres_discards,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
            hash_grows: self.hash_grows.load(Ordering::Relaxed),
            res_failed: self.res_failed.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            periodic_gc_runs: self.periodic_gc_runs.load(Ordering::Relaxed),
            forced_gc_runs: self.forced_gc_runs.load(Ordering::Relaxed),
            unres_discards: self.unres_discards.load(Ordering::Relaxed),
        }
    }
}
