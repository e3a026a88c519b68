use crate::state::NudState;
use crossbeam::atomic::AtomicCell;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-protocol (and optionally per-device) tunables, fixed once a parameter set is built.
///
/// Defaults follow the classic IPv4 ARP table.
#[derive(Clone, Debug, PartialEq)]
pub struct Tunables {
    pub base_reachable_time: Duration,
    pub retrans_time: Duration,
    pub gc_staletime: Duration,
    pub delay_probe_time: Duration,
    pub anycast_delay: Duration,
    pub proxy_delay: Duration,
    /// Minimum age of a cached address before a non-override update may replace it.
    pub locktime: Duration,
    /// Packets held per unresolved entry.
    pub queue_len: usize,
    pub proxy_qlen: usize,
    pub ucast_probes: u32,
    pub mcast_probes: u32,
    pub app_probes: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            base_reachable_time: Duration::from_secs(30),
            retrans_time: Duration::from_secs(1),
            gc_staletime: Duration::from_secs(60),
            delay_probe_time: Duration::from_secs(5),
            anycast_delay: Duration::from_secs(1),
            proxy_delay: Duration::from_millis(800),
            locktime: Duration::from_secs(1),
            queue_len: 3,
            proxy_qlen: 64,
            ucast_probes: 3,
            mcast_probes: 3,
            app_probes: 0,
        }
    }
}

impl Tunables {
    pub fn new() -> Self {
        Tunables::default()
    }

    /// Changes base_reachable_time, default value is 30s. Must be non-zero.
    pub fn base_reachable_time(self, base_reachable_time: Duration) -> Self {
        assert_ne!(
            base_reachable_time,
            Duration::from_secs(0),
            "base_reachable_time must be non-zero"
        );
        Tunables {
            base_reachable_time,
            ..self
        }
    }

    /// Changes retrans_time, default value is 1s. Must be non-zero.
    pub fn retrans_time(self, retrans_time: Duration) -> Self {
        assert_ne!(
            retrans_time,
            Duration::from_secs(0),
            "retrans_time must be non-zero"
        );
        Tunables {
            retrans_time,
            ..self
        }
    }

    pub fn gc_staletime(self, gc_staletime: Duration) -> Self {
        Tunables {
            gc_staletime,
            ..self
        }
    }

    pub fn delay_probe_time(self, delay_probe_time: Duration) -> Self {
        Tunables {
            delay_probe_time,
            ..self
        }
    }

    pub fn locktime(self, locktime: Duration) -> Self {
        Tunables { locktime, ..self }
    }

    /// Changes queue_len, default value is 3.
    /// Valid range is 1..=1000
    pub fn queue_len(self, queue_len: usize) -> Self {
        assert!(
            queue_len <= 1000,
            "neighbour queue_len: {} > 1000",
            queue_len
        );
        assert_ne!(queue_len, 0, "queue_len must be non-zero");
        Tunables { queue_len, ..self }
    }

    pub fn probes(self, ucast_probes: u32, mcast_probes: u32, app_probes: u32) -> Self {
        Tunables {
            ucast_probes,
            mcast_probes,
            app_probes,
            ..self
        }
    }

    /// Changes the proxy answer window and the proxy queue bound.
    pub fn proxy(self, proxy_delay: Duration, proxy_qlen: usize) -> Self {
        Tunables {
            proxy_delay,
            proxy_qlen,
            ..self
        }
    }
}

/// A shared parameter set. The table owns a default set; devices may get their own clone via
/// `NeighTable::parms_alloc`. Entries hold an `Arc` to the set they were created against.
#[derive(Debug)]
pub struct NeighParms {
    dev_index: Option<u32>,
    tunables: Tunables,
    reachable_time: AtomicCell<Duration>,
    dead: AtomicBool,
}

impl NeighParms {
    pub(crate) fn new<R: Rng>(dev_index: Option<u32>, tunables: Tunables, rng: &mut R) -> Self {
        let reachable_time = random_reachable_time(tunables.base_reachable_time, rng);
        NeighParms {
            dev_index,
            tunables,
            reachable_time: AtomicCell::new(reachable_time),
            dead: AtomicBool::new(false),
        }
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Device this set is specific to, `None` for the table default.
    pub fn dev_index(&self) -> Option<u32> {
        self.dev_index
    }

    /// Randomised around `base_reachable_time`, re-drawn by the periodic sweep.
    pub fn reachable_time(&self) -> Duration {
        self.reachable_time.load()
    }

    pub(crate) fn reseed<R: Rng>(&self, rng: &mut R) {
        self.reachable_time
            .store(random_reachable_time(self.tunables.base_reachable_time, rng));
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    /// Probe budget before an entry in `state` is declared failed.
    pub fn max_probes(&self, state: NudState) -> u32 {
        let t = &self.tunables;
        match state {
            NudState::Probe => t.ucast_probes,
            _ => t.ucast_probes + t.app_probes + t.mcast_probes,
        }
    }
}

/// Uniformly distributed in `[base / 2, 3 * base / 2)`.
pub fn random_reachable_time<R: Rng>(base: Duration, rng: &mut R) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return base;
    }
    Duration::from_millis(base_ms / 2 + rng.gen_range(0, base_ms))
}

/// Table-wide garbage collection and scheduling knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct TableConfig {
    /// Reported and settable through management only; collection does not consult it.
    pub gc_thresh1: usize,
    /// Soft limit: forced collection when the last flush is older than `flush_interval`.
    pub gc_thresh2: usize,
    /// Hard limit: forced collection always, allocation fails if it stays reached.
    pub gc_thresh3: usize,
    pub flush_interval: Duration,
    pub reseed_interval: Duration,
    /// Lower bound on how soon an entry timer may re-fire.
    pub min_timer_delay: Duration,
    /// Fixed RNG seed, for reproducible salts and reachable times.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            gc_thresh1: 128,
            gc_thresh2: 512,
            gc_thresh3: 1024,
            flush_interval: Duration::from_secs(5),
            reseed_interval: Duration::from_secs(300),
            min_timer_delay: Duration::from_millis(500),
            seed: None,
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        TableConfig::default()
    }

    /// Changes the three collection thresholds. Requires thresh1 <= thresh2 <= thresh3 and a
    /// non-zero hard limit.
    pub fn gc_thresholds(self, gc_thresh1: usize, gc_thresh2: usize, gc_thresh3: usize) -> Self {
        assert!(
            gc_thresh1 <= gc_thresh2 && gc_thresh2 <= gc_thresh3,
            "gc thresholds out of order: {} {} {}",
            gc_thresh1,
            gc_thresh2,
            gc_thresh3
        );
        assert_ne!(gc_thresh3, 0, "gc_thresh3 must be non-zero");
        TableConfig {
            gc_thresh1,
            gc_thresh2,
            gc_thresh3,
            ..self
        }
    }

    pub fn min_timer_delay(self, min_timer_delay: Duration) -> Self {
        TableConfig {
            min_timer_delay,
            ..self
        }
    }

    pub fn seed(self, seed: u64) -> Self {
        TableConfig {
            seed: Some(seed),
            ..self
        }
    }
}
