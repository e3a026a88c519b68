use crossbeam::atomic::AtomicCell;
use std::time::{Duration, Instant};

/// Source of "now" for every timestamp the cache records. Tables take a `Clock` so the whole
/// reachability state machine can be driven by hand in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// It starts an hour ahead of the monotonic clock, so timestamps pushed into the past (new entries
/// are born "confirmed" two reachable times ago) are always representable.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: AtomicCell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            base: Instant::now(),
            offset: AtomicCell::new(Duration::from_secs(3600)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.offset.load();
        loop {
            match self.offset.compare_exchange(current, current + by) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.load()
    }
}

/// `now - by`, saturating at `now` when the monotonic clock cannot go back that far.
pub(crate) fn earlier(now: Instant, by: Duration) -> Instant {
    now.checked_sub(by).unwrap_or(now)
}
