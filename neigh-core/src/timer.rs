use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Identifies one arming of a timer. Re-arming always yields a fresh handle, so a handle that
/// was cancelled (or already fired) can never match a newer arming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    deadline: Instant,
    seq: u64,
}

impl TimerHandle {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

///
/// Deadline-ordered set of pending timers. Each pending timer owns a `T` (an `Arc` of the entry
/// it belongs to), which keeps the entry alive until the timer fires or is cancelled.
///
/// The queue lock is a leaf: nothing is called back while it is held.
///
#[derive(Debug)]
pub struct TimerQueue<T> {
    pending: Mutex<BTreeMap<TimerHandle, T>>,
    seq: AtomicU64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        TimerQueue {
            pending: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn arm(&self, deadline: Instant, value: T) -> TimerHandle {
        let handle = TimerHandle {
            deadline,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.pending.lock().unwrap().insert(handle, value);
        handle
    }

    /// Returns true if the timer was still pending.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        let removed = self.pending.lock().unwrap().remove(&handle);
        removed.is_some()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn take_due(&self, now: Instant) -> Vec<(TimerHandle, T)> {
        let mut pending = self.pending.lock().unwrap();
        let mut due = Vec::new();
        loop {
            let handle = match pending.keys().next() {
                Some(handle) if handle.deadline <= now => *handle,
                _ => break,
            };
            if let Some(value) = pending.remove(&handle) {
                due.push((handle, value));
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.lock().unwrap().keys().next().map(|h| h.deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every pending timer.
    pub fn clear(&self) -> Vec<T> {
        let pending = std::mem::replace(&mut *self.pending.lock().unwrap(), BTreeMap::new());
        pending.into_iter().map(|(_, value)| value).collect()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue::new()
    }
}
