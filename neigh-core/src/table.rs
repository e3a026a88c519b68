use crate::addr::LinkAddr;
use crate::clock::Clock;
use crate::device::{Device, DeviceEvent};
use crate::error::{NeighError, Result};
use crate::neighbour::{NeighInfo, Neighbour};
use crate::params::{NeighParms, TableConfig, Tunables};
use crate::protocol::NeighProtocol;
use crate::proxy::ProxyTable;
use crate::state::{NudState, UpdateFlags};
use crate::stats::{Counter, NeighStats, StatsSnapshot};
use crate::timer::TimerQueue;
use crossbeam::crossbeam_channel::{self, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Buckets start at two and double whenever the table holds more entries than buckets.
const INITIAL_HASH_SIZE: usize = 2;

pub(crate) struct HashBuckets {
    pub(crate) buckets: Vec<Vec<Arc<Neighbour>>>,
    pub(crate) mask: u32,
    pub(crate) salt: u32,
}

pub(crate) struct GcState {
    pub(crate) last_flush: Instant,
    pub(crate) last_rand: Instant,
    pub(crate) next_periodic: Instant,
}

pub(crate) struct TableShared {
    pub(crate) protocol: Arc<dyn NeighProtocol>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: RwLock<TableConfig>,
    pub(crate) hash: RwLock<HashBuckets>,
    /// Entries linked into `hash`. Only changes under the `hash` write lock.
    pub(crate) entries: AtomicUsize,
    /// Default set first, then per-device sets.
    pub(crate) parms: RwLock<Vec<Arc<NeighParms>>>,
    pub(crate) rng: Mutex<StdRng>,
    pub(crate) stats: NeighStats,
    pub(crate) timers: TimerQueue<Arc<Neighbour>>,
    pub(crate) gc: Mutex<GcState>,
    pub(crate) proxy: ProxyTable,
    observers: Mutex<Vec<Sender<NeighInfo>>>,
}

impl TableShared {
    pub(crate) fn min_timer_delay(&self) -> Duration {
        self.config.read().unwrap().min_timer_delay
    }

    pub(crate) fn notify(&self, neigh: &Arc<Neighbour>) {
        let mut observers = self.observers.lock().unwrap();
        if observers.is_empty() {
            return;
        }
        let info = neigh.info();
        observers.retain(|observer| observer.send(info.clone()).is_ok());
    }

    fn bucket(&self, hash: &HashBuckets, key: &[u8], dev: &Device) -> usize {
        (self.protocol.hash(key, dev, hash.salt) & hash.mask) as usize
    }
}

///
/// A neighbour table: every entry one protocol resolved, indexed by (key, device).
///
/// `NeighTable` is a cheap handle; clones share the same table. Time only moves forward through
/// `poll`, which fires due entry timers, the periodic sweep and the proxy queue.
///
#[derive(Clone)]
pub struct NeighTable {
    pub(crate) shared: Arc<TableShared>,
}

/// A table handle that does not keep the table alive. Adapters hold one to reach back into the
/// table that owns them.
#[derive(Clone)]
pub struct WeakNeighTable {
    shared: Weak<TableShared>,
}

impl WeakNeighTable {
    pub fn upgrade(&self) -> Option<NeighTable> {
        self.shared.upgrade().map(|shared| NeighTable { shared })
    }
}

impl NeighTable {
    pub fn new(
        protocol: Arc<dyn NeighProtocol>,
        tunables: Tunables,
        config: TableConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let now = clock.now();
        let parms = Arc::new(NeighParms::new(None, tunables, &mut rng));
        let salt = rng.gen::<u32>();

        let shared = TableShared {
            clock,
            config: RwLock::new(config),
            hash: RwLock::new(HashBuckets {
                buckets: (0..INITIAL_HASH_SIZE).map(|_| Vec::new()).collect(),
                mask: (INITIAL_HASH_SIZE - 1) as u32,
                salt,
            }),
            entries: AtomicUsize::new(0),
            rng: Mutex::new(rng),
            stats: NeighStats::default(),
            timers: TimerQueue::new(),
            gc: Mutex::new(GcState {
                last_flush: now,
                last_rand: now + parms.reachable_time() * 20,
                next_periodic: now + parms.reachable_time(),
            }),
            proxy: ProxyTable::new(),
            observers: Mutex::new(Vec::new()),
            parms: RwLock::new(vec![parms]),
            protocol,
        };

        info!(
            table = shared.protocol.id(),
            family = shared.protocol.family(),
            "neighbour table created"
        );
        NeighTable {
            shared: Arc::new(shared),
        }
    }

    pub fn downgrade(&self) -> WeakNeighTable {
        WeakNeighTable {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn family(&self) -> u16 {
        self.shared.protocol.family()
    }

    pub fn id(&self) -> &'static str {
        self.shared.protocol.id()
    }

    pub fn protocol(&self) -> &Arc<dyn NeighProtocol> {
        &self.shared.protocol
    }

    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Entries currently linked.
    pub fn len(&self) -> usize {
        self.shared.entries.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_buckets(&self) -> usize {
        self.shared.hash.read().unwrap().buckets.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> TableConfig {
        self.shared.config.read().unwrap().clone()
    }

    pub fn set_config(&self, config: TableConfig) {
        *self.shared.config.write().unwrap() = config;
    }

    /// Returns a channel that receives a snapshot of every entry whose change observers should
    /// hear about.
    pub fn subscribe(&self) -> Receiver<NeighInfo> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.shared.observers.lock().unwrap().push(sender);
        receiver
    }

    pub fn default_parms(&self) -> Arc<NeighParms> {
        self.shared.parms.read().unwrap()[0].clone()
    }

    /// Replaces the default parameter set. Entries already created keep the set they hold.
    pub fn set_default_tunables(&self, tunables: Tunables) {
        let parms = {
            let mut rng = self.shared.rng.lock().unwrap();
            Arc::new(NeighParms::new(None, tunables, &mut *rng))
        };
        self.shared.parms.write().unwrap()[0] = parms;
    }

    /// Gives `dev` its own parameter set, cloned from the table default. Returns the existing
    /// set if the device already has one.
    pub fn parms_alloc(&self, dev: &Device) -> Arc<NeighParms> {
        let mut all = self.shared.parms.write().unwrap();
        if let Some(existing) = all.iter().find(|p| p.dev_index() == Some(dev.index())) {
            return existing.clone();
        }
        let tunables = all[0].tunables().clone();
        let parms = {
            let mut rng = self.shared.rng.lock().unwrap();
            Arc::new(NeighParms::new(Some(dev.index()), tunables, &mut *rng))
        };
        all.push(parms.clone());
        parms
    }

    /// Detaches a per-device set and marks it dead, so no new entry is created against it.
    /// Entries still holding it keep working. The table default cannot be released.
    pub fn parms_release(&self, parms: &Arc<NeighParms>) {
        if parms.dev_index().is_none() {
            warn!(table = self.id(), "refusing to release the default parameter set");
            return;
        }
        let mut all = self.shared.parms.write().unwrap();
        all.retain(|p| !Arc::ptr_eq(p, parms));
        parms.mark_dead();
    }

    /// The parameter set entries on `dev` get: its own if allocated, else the table default.
    pub fn parms_for(&self, dev: &Device) -> Arc<NeighParms> {
        let all = self.shared.parms.read().unwrap();
        all.iter()
            .find(|p| p.dev_index() == Some(dev.index()))
            .unwrap_or(&all[0])
            .clone()
    }

    /// Fails with `InvalidArgument` unless `key` has the adapter's key length.
    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        let key_len = self.shared.protocol.key_len();
        if key.len() != key_len {
            return Err(NeighError::InvalidArgument(format!(
                "key length {} != {}",
                key.len(),
                key_len
            )));
        }
        Ok(())
    }

    /// A key of the wrong length matches nothing.
    pub fn lookup(&self, key: &[u8], dev: &Device) -> Option<Arc<Neighbour>> {
        let t = &self.shared;
        t.stats.inc(Counter::Lookups);
        if key.len() != t.protocol.key_len() {
            return None;
        }

        let hash = t.hash.read().unwrap();
        let idx = t.bucket(&hash, key, dev);
        let found = hash.buckets[idx]
            .iter()
            .find(|n| n.key() == key && n.dev().index() == dev.index())
            .cloned();
        if found.is_some() {
            t.stats.inc(Counter::Hits);
        }
        found
    }

    ///
    /// Creates the entry for (key, dev), or returns the one that is already there.
    ///
    /// Fails with `ResourceExhausted` when the table is at its hard limit and forced collection
    /// frees nothing, and with `InvalidArgument` on a wrong key length or a released parameter
    /// set. When two callers race, the first to link wins and the other gets its entry.
    ///
    pub fn create(&self, key: &[u8], dev: &Arc<Device>) -> Result<Arc<Neighbour>> {
        let t = &self.shared;
        self.check_key(key)?;

        let now = t.clock.now();
        self.admit(now)?;

        let neigh = Neighbour::new(
            key.to_vec(),
            dev.clone(),
            Arc::downgrade(t),
            self.parms_for(dev),
            now,
        );
        t.stats.inc(Counter::Allocs);

        let mut setup = neigh.setup();
        t.protocol.construct(&mut setup)?;
        neigh.apply_setup(setup, now);
        let neigh = Arc::new(neigh);

        let mut hash = t.hash.write().unwrap();
        if neigh.parms().is_dead() {
            return Err(NeighError::InvalidArgument(
                "parameter set was released".to_string(),
            ));
        }

        let idx = t.bucket(&hash, key, dev);
        if let Some(existing) = hash.buckets[idx]
            .iter()
            .find(|n| n.key() == key && n.dev().index() == dev.index())
        {
            return Ok(existing.clone());
        }

        neigh.set_dead(false);
        hash.buckets[idx].push(neigh.clone());
        let entries = t.entries.fetch_add(1, Ordering::AcqRel) + 1;
        if entries > hash.buckets.len() {
            self.grow(&mut hash);
        }
        drop(hash);

        debug!(table = self.id(), key = ?key, dev = dev.name(), "neighbour created");
        Ok(neigh)
    }

    /// Looks up (key, dev), creating the entry when it is missing and `create` is set.
    pub fn lookup_or_create(
        &self,
        key: &[u8],
        dev: &Arc<Device>,
        create: bool,
    ) -> Result<Arc<Neighbour>> {
        match self.lookup(key, dev) {
            Some(neigh) => Ok(neigh),
            None if create => self.create(key, dev),
            None => Err(NeighError::NotFound),
        }
    }

    ///
    /// A solicitation from `key` arrived carrying `lladdr`: learn it as `Stale`.
    ///
    /// The entry is only created when there is an address to learn (or the device needs none).
    ///
    pub fn event_ns(
        &self,
        key: &[u8],
        lladdr: Option<&LinkAddr>,
        dev: &Arc<Device>,
    ) -> Option<Arc<Neighbour>> {
        let create = lladdr.is_some() || dev.addr_len() == 0;
        let neigh = self.lookup_or_create(key, dev, create).ok()?;
        if let Err(e) = neigh.update(lladdr, NudState::Stale, UpdateFlags::OVERRIDE) {
            debug!(table = self.id(), key = ?key, error = %e, "solicitation did not update neighbour");
        }
        Some(neigh)
    }

    /// Doubles the bucket array and rehashes every entry under a fresh salt.
    fn grow(&self, hash: &mut HashBuckets) {
        let t = &self.shared;
        let new_size = hash.buckets.len() * 2;
        let salt = t.rng.lock().unwrap().gen::<u32>();
        let mask = (new_size - 1) as u32;

        let mut buckets: Vec<Vec<Arc<Neighbour>>> = (0..new_size).map(|_| Vec::new()).collect();
        for chain in hash.buckets.drain(..) {
            for neigh in chain {
                let idx = (t.protocol.hash(neigh.key(), neigh.dev(), salt) & mask) as usize;
                buckets[idx].push(neigh);
            }
        }

        hash.buckets = buckets;
        hash.mask = mask;
        hash.salt = salt;
        t.stats.inc(Counter::HashGrows);
        debug!(table = self.id(), buckets = new_size, "neighbour hash grown");
    }

    /// Every linked entry, in bucket order.
    pub fn entries(&self) -> Vec<Arc<Neighbour>> {
        let hash = self.shared.hash.read().unwrap();
        hash.buckets.iter().flatten().cloned().collect()
    }

    ///
    /// Unlinks every entry on `dev` (every entry at all with `None`). Entries nobody else holds
    /// are simply retired; the rest are neutralized since their holders may still transmit
    /// through them.
    ///
    pub fn flush_dev(&self, dev: Option<&Device>) {
        self.flush(dev);
    }

    /// Returns how many unlinked entries were still held elsewhere.
    fn flush(&self, dev: Option<&Device>) -> usize {
        let t = &self.shared;
        let mut unlinked = Vec::new();
        let mut stray = 0;
        {
            let mut hash = t.hash.write().unwrap();
            for chain in hash.buckets.iter_mut() {
                let mut i = 0;
                while i < chain.len() {
                    let matches = dev.map_or(true, |d| chain[i].dev().index() == d.index());
                    if matches {
                        unlinked.push(chain.swap_remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            t.entries.fetch_sub(unlinked.len(), Ordering::AcqRel);

            for neigh in unlinked.iter() {
                neigh.retire(t);
                if Arc::strong_count(neigh) != 1 {
                    neigh.neutralize(t);
                    stray += 1;
                }
            }
        }
        debug!(table = self.id(), flushed = unlinked.len(), stray, "neighbours flushed");
        stray
    }

    /// The device changed its hardware address: forget everything resolved through it.
    pub fn changeaddr(&self, dev: &Device) {
        self.flush_dev(Some(dev));
    }

    /// The device went down: forget its entries, proxy entries and delayed proxy packets.
    pub fn ifdown(&self, dev: &Device) {
        self.flush_dev(Some(dev));
        self.pneigh_ifdown(Some(dev));
        self.proxy_purge(Some(dev));
    }

    pub fn device_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::ChangeAddr(dev) => self.changeaddr(dev),
            DeviceEvent::Down(dev) => self.ifdown(dev),
        }
    }

    ///
    /// Fires everything due: entry timers, the periodic sweep and the proxy queue. Returns the
    /// next deadline, if any, so a driver knows when to call again.
    ///
    pub fn poll(&self) -> Option<Instant> {
        let t = &self.shared;
        let now = t.clock.now();

        for (handle, neigh) in t.timers.take_due(now) {
            neigh.timer_fired(handle, t);
        }

        let periodic_due = now >= t.gc.lock().unwrap().next_periodic;
        if periodic_due {
            self.periodic_work();
        }

        if self.proxy_due(now) {
            self.proxy_process();
        }

        self.next_deadline()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let t = &self.shared;
        let periodic = t.gc.lock().unwrap().next_periodic;
        let mut next = periodic;
        if let Some(timer) = t.timers.next_deadline() {
            next = next.min(timer);
        }
        if let Some(proxy) = self.proxy_deadline() {
            next = next.min(proxy);
        }
        Some(next)
    }

    ///
    /// Tears the table down: stops the proxy queue, unlinks every entry and drops pending timers.
    /// Entries still held elsewhere are reported, since they outlive their table.
    ///
    pub fn clear(&self) {
        let t = &self.shared;
        self.proxy_purge(None);
        self.pneigh_ifdown(None);
        let leaked = self.flush(None);
        let timers = t.timers.clear();
        drop(timers);

        if leaked > 0 {
            warn!(table = self.id(), leaked, "neighbour table leaked entries");
        }
        info!(table = self.id(), "neighbour table cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::{eth_device, ipv4_key, test_table, RecordingProtocol};

    #[test]
    fn lookup_counts_hits() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);

        assert!(table.lookup(&ipv4_key(1), &dev).is_none());
        let created = table.create(&ipv4_key(1), &dev).unwrap();
        let found = table.lookup(&ipv4_key(1), &dev).unwrap();
        assert!(Arc::ptr_eq(&created, &found));

        let stats = table.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.allocs, 1);
    }

    #[test]
    fn key_length_is_checked() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        match table.create(&[1, 2, 3], &dev) {
            Err(NeighError::InvalidArgument(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(table.len(), 0);

        table.create(&ipv4_key(1), &dev).unwrap();
        assert!(table.lookup(&[1, 2, 3], &dev).is_none());
        assert!(table.lookup(&[192, 168, 1, 1, 0], &dev).is_none());
        assert!(table.check_key(&ipv4_key(1)).is_ok());
    }

    #[test]
    fn same_key_on_different_devices() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let eth0 = eth_device(1);
        let eth1 = eth_device(2);

        let a = table.create(&ipv4_key(9), &eth0).unwrap();
        let b = table.create(&ipv4_key(9), &eth1).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_create_returns_existing() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let first = table.create(&ipv4_key(3), &dev).unwrap();
        let second = table.create(&ipv4_key(3), &dev).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
        // The losing allocation was finalised right away.
        assert_eq!(table.stats().destroys, 1);
    }

    #[test]
    fn growth_keeps_every_entry_reachable() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let mut held = Vec::new();
        for i in 0..100 {
            held.push(table.create(&ipv4_key(i), &dev).unwrap());
        }

        assert_eq!(table.len(), 100);
        assert_eq!(table.hash_buckets(), 128);
        assert_eq!(table.stats().hash_grows, 6);
        for (i, neigh) in held.iter().enumerate() {
            let found = table.lookup(&ipv4_key(i as u32), &dev).unwrap();
            assert!(Arc::ptr_eq(neigh, &found));
        }
    }

    #[test]
    fn lookup_or_create_without_create() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        match table.lookup_or_create(&ipv4_key(1), &dev, false) {
            Err(NeighError::NotFound) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(table.lookup_or_create(&ipv4_key(1), &dev, true).is_ok());
    }

    #[test]
    fn released_parms_refuse_new_entries() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(4);
        let parms = table.parms_alloc(&dev);
        assert!(Arc::ptr_eq(&parms, &table.parms_alloc(&dev)));

        let neigh = table.create(&ipv4_key(1), &dev).unwrap();
        assert!(Arc::ptr_eq(&neigh.parms(), &parms));

        table.parms_release(&parms);
        assert!(parms.is_dead());
        // Falls back to the default set once the device set is gone.
        let other = table.create(&ipv4_key(2), &dev).unwrap();
        assert!(other.parms().dev_index().is_none());
    }

    #[test]
    fn flush_neutralizes_held_entries() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let eth0 = eth_device(1);
        let eth1 = eth_device(2);

        let held = table.create(&ipv4_key(1), &eth0).unwrap();
        held.update(
            Some(&LinkAddr::new(&[2, 0, 0, 0, 0, 9])),
            NudState::Reachable,
            UpdateFlags::OVERRIDE,
        )
        .unwrap();
        table.create(&ipv4_key(2), &eth0).unwrap();
        table.create(&ipv4_key(3), &eth1).unwrap();

        table.ifdown(&eth0);
        assert_eq!(table.len(), 1);
        assert!(held.is_dead());
        assert_eq!(held.nud_state(), NudState::NoArp);
        assert_eq!(held.output_name(), "blackhole");
        assert!(!held.has_timer());
        assert!(table.lookup(&ipv4_key(3), &eth1).is_some());
    }

    #[test]
    fn clear_empties_the_table() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        for i in 0..10 {
            table.create(&ipv4_key(i), &dev).unwrap();
        }
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.stats().destroys, 10);
    }
}
