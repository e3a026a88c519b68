use crate::error::{NeighError, Result};
use crate::neighbour::Neighbour;
use crate::state::NudState;
use crate::stats::Counter;
use crate::table::NeighTable;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

impl NeighTable {
    ///
    /// Admission control for `create`. Past the hard limit, or past the soft limit when the last
    /// flush is older than the flush interval, the whole table is collected first. Creation is
    /// refused if the hard limit is still reached afterwards.
    ///
    pub(crate) fn admit(&self, now: Instant) -> Result<()> {
        let t = &self.shared;
        let config = self.config();
        let entries = t.entries.load(Ordering::Acquire);
        let last_flush = t.gc.lock().unwrap().last_flush;

        if entries >= config.gc_thresh3
            || (entries >= config.gc_thresh2 && now > last_flush + config.flush_interval)
        {
            self.forced_gc();
            if t.entries.load(Ordering::Acquire) >= config.gc_thresh3 {
                warn!(table = self.id(), "neighbour table overflow");
                return Err(NeighError::ResourceExhausted);
            }
        }
        Ok(())
    }

    ///
    /// Synchronous full collection: unlinks every entry that only the table holds and that is
    /// not `Permanent`, regardless of age. Returns whether anything was freed.
    ///
    pub fn forced_gc(&self) -> bool {
        let t = &self.shared;
        t.stats.inc(Counter::ForcedGcRuns);

        let mut evicted: Vec<Arc<Neighbour>> = Vec::new();
        {
            let mut hash = t.hash.write().unwrap();
            for chain in hash.buckets.iter_mut() {
                let mut i = 0;
                while i < chain.len() {
                    let evict = {
                        let neigh = &chain[i];
                        let st = neigh.state.write().unwrap();
                        let evict =
                            Arc::strong_count(neigh) == 1 && st.nud != NudState::Permanent;
                        if evict {
                            neigh.set_dead(true);
                        }
                        evict
                    };
                    if evict {
                        evicted.push(chain.swap_remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            t.entries.fetch_sub(evicted.len(), Ordering::AcqRel);
            t.gc.lock().unwrap().last_flush = t.clock.now();
        }

        debug!(table = self.id(), evicted = evicted.len(), "forced neighbour collection");
        !evicted.is_empty()
    }

    ///
    /// The periodic sweep. Walks the table one chain at a time, releasing the table lock in
    /// between, and unlinks idle entries only the table holds: `Failed` ones, and ones unused for
    /// longer than their `gc_staletime`. `Permanent` entries and entries with a running timer
    /// are never touched.
    ///
    /// Every `reseed_interval` it also re-draws the reachable time of every parameter set.
    /// Reschedules itself `base_reachable_time / 2` later.
    ///
    pub fn periodic_work(&self) {
        let t = &self.shared;
        t.stats.inc(Counter::PeriodicGcRuns);
        let now = t.clock.now();
        let config = self.config();

        {
            let mut gc = t.gc.lock().unwrap();
            if now > gc.last_rand + config.reseed_interval {
                gc.last_rand = now;
                let all = t.parms.read().unwrap();
                let mut rng = t.rng.lock().unwrap();
                for parms in all.iter() {
                    parms.reseed(&mut *rng);
                }
            }
        }

        let mut evicted_total = 0;
        let mut i = 0;
        loop {
            let mut evicted: Vec<Arc<Neighbour>> = Vec::new();
            {
                let mut hash = t.hash.write().unwrap();
                if i >= hash.buckets.len() {
                    break;
                }
                let chain = &mut hash.buckets[i];
                let mut j = 0;
                while j < chain.len() {
                    let evict = {
                        let neigh = &chain[j];
                        let mut st = neigh.state.write().unwrap();
                        if st.nud == NudState::Permanent || st.nud.in_timer() {
                            false
                        } else {
                            if st.used < st.confirmed {
                                st.used = st.confirmed;
                            }
                            let stale = now > st.used + st.parms.tunables().gc_staletime;
                            let evict = Arc::strong_count(neigh) == 1
                                && (st.nud == NudState::Failed || stale);
                            if evict {
                                neigh.set_dead(true);
                            }
                            evict
                        }
                    };
                    if evict {
                        evicted.push(chain.swap_remove(j));
                    } else {
                        j += 1;
                    }
                }
                t.entries.fetch_sub(evicted.len(), Ordering::AcqRel);
            }
            evicted_total += evicted.len();
            i += 1;
        }

        let period = self.default_parms().tunables().base_reachable_time / 2;
        t.gc.lock().unwrap().next_periodic = now + period;
        debug!(table = self.id(), evicted = evicted_total, "periodic neighbour collection");
    }
}
