use crate::device::Device;
use crate::error::{NeighError, Result};
use crate::packet::Packet;
use crate::params::NeighParms;
use crate::table::NeighTable;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Proxy entries live in a small fixed hash.
const PNEIGH_HASH_SIZE: usize = 16;

/// "Answer resolution requests for `key`", on one device or (with `dev_index` unset) on all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEntry {
    pub key: Vec<u8>,
    pub dev_index: Option<u32>,
}

impl ProxyEntry {
    fn matches(&self, key: &[u8], dev: Option<&Device>) -> bool {
        self.key == key
            && (self.dev_index.is_none() || self.dev_index == dev.map(|d| d.index()))
    }
}

struct ProxyQueue {
    packets: VecDeque<(Instant, Packet)>,
    timer: Option<Instant>,
}

pub(crate) struct ProxyTable {
    buckets: RwLock<Vec<Vec<ProxyEntry>>>,
    queue: Mutex<ProxyQueue>,
}

impl ProxyTable {
    pub(crate) fn new() -> Self {
        ProxyTable {
            buckets: RwLock::new((0..PNEIGH_HASH_SIZE).map(|_| Vec::new()).collect()),
            queue: Mutex::new(ProxyQueue {
                packets: VecDeque::new(),
                timer: None,
            }),
        }
    }
}

/// Folds the last four key bytes down to a bucket index.
fn pneigh_hash(key: &[u8]) -> usize {
    let tail = &key[key.len().saturating_sub(4)..];
    let mut word = [0u8; 4];
    word[4 - tail.len()..].copy_from_slice(tail);
    let mut hash = u32::from_ne_bytes(word);
    hash ^= hash >> 16;
    hash ^= hash >> 8;
    hash ^= hash >> 4;
    hash as usize & (PNEIGH_HASH_SIZE - 1)
}

impl NeighTable {
    pub fn pneigh_lookup(&self, key: &[u8], dev: Option<&Device>) -> Option<ProxyEntry> {
        let buckets = self.shared.proxy.buckets.read().unwrap();
        buckets[pneigh_hash(key)]
            .iter()
            .find(|entry| entry.matches(key, dev))
            .cloned()
    }

    /// Adds a proxy entry, or returns the one already covering (key, dev).
    pub fn pneigh_create(&self, key: &[u8], dev: Option<&Device>) -> Result<ProxyEntry> {
        self.check_key(key)?;
        if let Some(existing) = self.pneigh_lookup(key, dev) {
            return Ok(existing);
        }

        let entry = ProxyEntry {
            key: key.to_vec(),
            dev_index: dev.map(|d| d.index()),
        };
        self.shared.protocol.pconstruct(&entry)?;

        let mut buckets = self.shared.proxy.buckets.write().unwrap();
        let chain = &mut buckets[pneigh_hash(key)];
        if let Some(existing) = chain.iter().find(|e| e.matches(key, dev)) {
            return Ok(existing.clone());
        }
        chain.push(entry.clone());
        Ok(entry)
    }

    /// Removes the proxy entry for exactly (key, dev).
    pub fn pneigh_delete(&self, key: &[u8], dev: Option<&Device>) -> Result<()> {
        let dev_index = dev.map(|d| d.index());
        let removed = {
            let mut buckets = self.shared.proxy.buckets.write().unwrap();
            let chain = &mut buckets[pneigh_hash(key)];
            match chain
                .iter()
                .position(|e| e.key == key && e.dev_index == dev_index)
            {
                Some(pos) => chain.remove(pos),
                None => return Err(NeighError::NotFound),
            }
        };
        self.shared.protocol.pdestruct(&removed);
        Ok(())
    }

    pub fn pneigh_entries(&self) -> Vec<ProxyEntry> {
        let buckets = self.shared.proxy.buckets.read().unwrap();
        buckets.iter().flatten().cloned().collect()
    }

    /// Drops the proxy entries bound to `dev` (every entry with `None`).
    pub(crate) fn pneigh_ifdown(&self, dev: Option<&Device>) {
        let mut removed = Vec::new();
        {
            let mut buckets = self.shared.proxy.buckets.write().unwrap();
            for chain in buckets.iter_mut() {
                let mut i = 0;
                while i < chain.len() {
                    let matches = match dev {
                        Some(d) => chain[i].dev_index == Some(d.index()),
                        None => true,
                    };
                    if matches {
                        removed.push(chain.remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
        }
        for entry in removed.iter() {
            self.shared.protocol.pdestruct(entry);
        }
    }

    ///
    /// Holds a proxied solicitation back for a random share of `proxy_delay`, so that several
    /// proxies on one link do not answer in lockstep. The queue has a single timer, kept at the
    /// earliest pending deadline.
    ///
    pub fn pneigh_enqueue(&self, parms: &NeighParms, mut packet: Packet) {
        let t = &self.shared;
        let now = t.clock.now();
        let tunables = parms.tunables();
        let delay_ms = tunables.proxy_delay.as_millis() as u64;
        let sched_next = if delay_ms == 0 {
            now
        } else {
            now + Duration::from_millis(t.rng.lock().unwrap().gen_range(0, delay_ms))
        };

        let mut queue = t.proxy.queue.lock().unwrap();
        if queue.packets.len() > tunables.proxy_qlen {
            debug!(table = self.id(), "proxy queue full, dropping solicitation");
            return;
        }

        packet.locally_enqueued = true;
        queue.packets.push_back((sched_next, packet));
        queue.timer = match queue.timer {
            Some(armed) if armed < sched_next => Some(armed),
            _ => Some(sched_next),
        };
    }

    pub fn proxy_queue_len(&self) -> usize {
        self.shared.proxy.queue.lock().unwrap().packets.len()
    }

    pub(crate) fn proxy_deadline(&self) -> Option<Instant> {
        self.shared.proxy.queue.lock().unwrap().timer
    }

    pub(crate) fn proxy_due(&self, now: Instant) -> bool {
        self.proxy_deadline().map_or(false, |deadline| deadline <= now)
    }

    ///
    /// Proxy timer: hands every due packet back to the protocol (dropping those whose device is
    /// no longer running) and re-arms at the earliest deadline left.
    ///
    pub fn proxy_process(&self) {
        let t = &self.shared;
        let now = t.clock.now();

        let due: Vec<Packet> = {
            let mut queue = t.proxy.queue.lock().unwrap();
            let mut due = Vec::new();
            let mut remaining = VecDeque::new();
            let mut next: Option<Instant> = None;
            for (sched_next, packet) in queue.packets.drain(..) {
                if sched_next <= now {
                    due.push(packet);
                } else {
                    next = Some(next.map_or(sched_next, |n| n.min(sched_next)));
                    remaining.push_back((sched_next, packet));
                }
            }
            queue.packets = remaining;
            queue.timer = next;
            due
        };

        for packet in due {
            if packet.dev.is_running() {
                t.protocol.proxy_redo(packet);
            }
        }
    }

    /// Drops delayed solicitations received on `dev` (all of them with `None`).
    pub(crate) fn proxy_purge(&self, dev: Option<&Device>) {
        let purged: Vec<(Instant, Packet)> = {
            let mut queue = self.shared.proxy.queue.lock().unwrap();
            let (purged, kept): (VecDeque<_>, VecDeque<_>) = queue
                .packets
                .drain(..)
                .partition(|(_, p)| dev.map_or(true, |d| p.dev.index() == d.index()));
            queue.timer = kept.iter().map(|(sched, _)| *sched).min();
            queue.packets = kept;
            purged.into_iter().collect()
        };
        if !purged.is_empty() {
            debug!(table = self.id(), purged = purged.len(), "proxy queue purged");
        }
    }
}
