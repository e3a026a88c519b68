use crate::addr::LinkAddr;
use crate::clock::earlier;
use crate::device::Device;
use crate::error::{NeighError, Result};
use crate::output::{Output, OutputOps, Xmit, BLACKHOLE};
use crate::packet::Packet;
use crate::params::NeighParms;
use crate::protocol::NeighSetup;
use crate::state::{NeighFlags, NudState, UpdateFlags};
use crate::stats::Counter;
use crate::table::TableShared;
use crate::timer::TimerHandle;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What the caller of `Neighbour::event_send` should do with its packet.
#[derive(Debug)]
pub enum SendStatus {
    /// The entry is usable, transmit right away.
    SendNow(Option<Packet>),
    /// Resolution is in progress; the packet (if any) waits on the entry.
    Queued,
    /// Resolution is impossible; the packet was not kept.
    Dropped(Option<Packet>),
}

/// A link header built for one ether type, reused until the link address changes.
#[derive(Clone, Debug)]
pub(crate) struct HeaderCache {
    protocol: u16,
    header: Vec<u8>,
}

pub(crate) struct NeighState {
    pub(crate) nud: NudState,
    pub(crate) ha: LinkAddr,
    pub(crate) flags: NeighFlags,
    pub(crate) used: Instant,
    pub(crate) confirmed: Instant,
    pub(crate) updated: Instant,
    pub(crate) arp_queue: VecDeque<Packet>,
    pub(crate) output: &'static dyn Output,
    pub(crate) ops: OutputOps,
    pub(crate) hh: Option<HeaderCache>,
    pub(crate) parms: Arc<NeighParms>,
    pub(crate) timer: Option<TimerHandle>,
}

/// Read-only copy of an entry, for dumps and change notifications.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighInfo {
    pub key: Vec<u8>,
    pub dev_index: u32,
    pub state: NudState,
    pub ha: LinkAddr,
    pub flags: NeighFlags,
    pub probes: u32,
    pub queued: usize,
    pub used: Instant,
    pub confirmed: Instant,
    pub updated: Instant,
    /// Holders besides the table, timers included.
    pub refcnt: usize,
}

///
/// One cached mapping from a network-layer key on a device to a link-layer address.
///
/// Entries are shared through `Arc`: the table holds one reference while the entry is linked,
/// a pending timer holds another, and every caller of `lookup`/`create` holds its own. The entry
/// is finalised when the last reference goes away.
///
pub struct Neighbour {
    key: Vec<u8>,
    dev: Arc<Device>,
    table: Weak<TableShared>,
    dead: AtomicBool,
    probes: AtomicU32,
    pub(crate) state: RwLock<NeighState>,
}

impl Neighbour {
    pub(crate) fn new(
        key: Vec<u8>,
        dev: Arc<Device>,
        table: Weak<TableShared>,
        parms: Arc<NeighParms>,
        now: Instant,
    ) -> Self {
        Neighbour {
            key,
            dev,
            table,
            dead: AtomicBool::new(true),
            probes: AtomicU32::new(0),
            state: RwLock::new(NeighState {
                nud: NudState::None,
                ha: LinkAddr::empty(),
                flags: NeighFlags::empty(),
                used: now,
                confirmed: now,
                updated: now,
                arp_queue: VecDeque::new(),
                output: BLACKHOLE,
                ops: OutputOps::GENERIC,
                hh: None,
                parms,
                timer: None,
            }),
        }
    }

    pub(crate) fn setup(&self) -> NeighSetup {
        let st = self.state.read().unwrap();
        NeighSetup {
            key: &self.key,
            dev: &self.dev,
            parms: st.parms.clone(),
            nud_state: st.nud,
            ha: st.ha,
            ops: st.ops,
        }
    }

    /// Takes over what the adapter decided. New entries count as confirmed two base reachable
    /// times ago, so nothing trusts them before a real confirmation.
    pub(crate) fn apply_setup(&self, setup: NeighSetup, now: Instant) {
        let mut st = self.state.write().unwrap();
        st.nud = setup.nud_state;
        st.ha = setup.ha;
        st.ops = setup.ops;
        st.output = if setup.nud_state.is_valid() {
            setup.ops.fast
        } else {
            setup.ops.slow
        };
        st.confirmed = earlier(now, setup.parms.tunables().base_reachable_time * 2);
        st.parms = setup.parms;
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn dev(&self) -> &Arc<Device> {
        &self.dev
    }

    /// True once the entry is unlinked from its table (or before it was ever linked).
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn set_dead(&self, dead: bool) {
        self.dead.store(dead, Ordering::Release);
    }

    pub fn nud_state(&self) -> NudState {
        self.state.read().unwrap().nud
    }

    pub fn ha(&self) -> LinkAddr {
        self.state.read().unwrap().ha
    }

    pub fn flags(&self) -> NeighFlags {
        self.state.read().unwrap().flags
    }

    /// Probes sent in the current resolution round.
    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::Acquire)
    }

    pub fn parms(&self) -> Arc<NeighParms> {
        self.state.read().unwrap().parms.clone()
    }

    pub fn used(&self) -> Instant {
        self.state.read().unwrap().used
    }

    pub fn confirmed(&self) -> Instant {
        self.state.read().unwrap().confirmed
    }

    pub fn updated(&self) -> Instant {
        self.state.read().unwrap().updated
    }

    /// Packets waiting on resolution.
    pub fn queue_len(&self) -> usize {
        self.state.read().unwrap().arp_queue.len()
    }

    /// Name of the output path currently selected.
    pub fn output_name(&self) -> &'static str {
        self.state.read().unwrap().output.name()
    }

    pub fn has_timer(&self) -> bool {
        self.state.read().unwrap().timer.is_some()
    }

    pub fn info(self: &Arc<Self>) -> NeighInfo {
        let st = self.state.read().unwrap();
        NeighInfo {
            key: self.key.clone(),
            dev_index: self.dev.index(),
            state: st.nud,
            ha: st.ha,
            flags: st.flags,
            probes: self.probes(),
            queued: st.arp_queue.len(),
            used: st.used,
            confirmed: st.confirmed,
            updated: st.updated,
            refcnt: Arc::strong_count(self),
        }
    }

    fn shared(&self) -> Option<Arc<TableShared>> {
        self.table.upgrade()
    }

    /// Sends `packet` through whichever output the entry currently selects.
    pub fn output(self: &Arc<Self>, packet: Packet) -> Result<Xmit> {
        let output = self.state.read().unwrap().output;
        output.output(self, packet)
    }

    /// Addresses the packet with the cached link header (building it on first use) and hands it
    /// to the device.
    pub(crate) fn transmit(&self, mut packet: Packet) -> Result<Xmit> {
        let table = match self.shared() {
            Some(table) => table,
            None => return Err(NeighError::Unreachable(vec![packet])),
        };

        let (ha, cached) = {
            let st = self.state.read().unwrap();
            let cached = st
                .hh
                .as_ref()
                .filter(|hh| hh.protocol == packet.protocol)
                .map(|hh| hh.header.clone());
            (st.ha, cached)
        };

        let header = match cached {
            Some(header) => Some(header),
            None => {
                let header = table.protocol.link_header(&self.dev, &ha, packet.protocol);
                if let Some(header) = &header {
                    let mut st = self.state.write().unwrap();
                    if st.ha == ha && st.nud.is_valid() {
                        st.hh = Some(HeaderCache {
                            protocol: packet.protocol,
                            header: header.clone(),
                        });
                    }
                }
                header
            }
        };

        if let Some(header) = header {
            packet.push_header(&header);
        }
        table.protocol.queue_xmit(packet);
        Ok(Xmit::Sent)
    }

    pub(crate) fn xmit_raw(&self, packet: Packet) -> Result<Xmit> {
        match self.shared() {
            Some(table) => {
                table.protocol.queue_xmit(packet);
                Ok(Xmit::Sent)
            }
            None => Err(NeighError::Unreachable(vec![packet])),
        }
    }

    fn add_timer(self: &Arc<Self>, st: &mut NeighState, table: &TableShared, deadline: Instant) {
        if let Some(old) = st.timer.take() {
            warn!(key = ?self.key, "neighbour timer armed twice");
            table.timers.cancel(old);
        }
        st.timer = Some(table.timers.arm(deadline, self.clone()));
    }

    fn del_timer(&self, st: &mut NeighState, table: &TableShared) -> bool {
        match st.timer.take() {
            Some(handle) => table.timers.cancel(handle),
            None => false,
        }
    }

    fn connect(st: &mut NeighState) {
        st.output = st.ops.fast;
    }

    fn suspect(st: &mut NeighState) {
        st.output = st.ops.slow;
    }

    /// Reachability proof from an upper layer (an acknowledged segment, say). Only moves
    /// `confirmed`; the entry timer acts on it.
    pub fn confirm(&self) {
        if let Some(table) = self.shared() {
            self.state.write().unwrap().confirmed = table.clock.now();
        }
    }

    /// Reports every waiting packet as unreachable, releasing the entry lock around each report.
    fn invalidate<'a>(
        &'a self,
        mut st: RwLockWriteGuard<'a, NeighState>,
        table: &TableShared,
    ) -> RwLockWriteGuard<'a, NeighState> {
        table.stats.inc(Counter::ResFailed);
        debug!(key = ?self.key, dev = self.dev.name(), "neighbour resolution failed");

        while st.nud == NudState::Failed {
            let packet = match st.arp_queue.pop_front() {
                Some(packet) => packet,
                None => break,
            };
            drop(st);
            table.protocol.error_report(self, packet);
            st = self.state.write().unwrap();
        }
        st.arp_queue.clear();
        st
    }

    ///
    /// Runs the send-side of the state machine. Call before transmitting through an entry that is
    /// not known to be connected.
    ///
    /// - Connected, `Delay` and `Probe` entries send immediately.
    /// - `None`/`Failed` entries start resolving (`Incomplete`, first probe sent now) when the
    ///   parameter set allows multicast or application probes, otherwise they fail and the packet
    ///   is dropped.
    /// - `Stale` entries move to `Delay` and send immediately.
    /// - `Incomplete` entries keep the packet, dropping the oldest one when the queue is full.
    ///
    pub fn event_send(self: &Arc<Self>, packet: Option<Packet>) -> SendStatus {
        let table = match self.shared() {
            Some(table) => table,
            None => return SendStatus::Dropped(packet),
        };
        let now = table.clock.now();

        let mut st = self.state.write().unwrap();
        st.used = now;

        let state = st.nud;
        if state.is_connected() || state == NudState::Delay || state == NudState::Probe {
            return SendStatus::SendNow(packet);
        }

        let parms = st.parms.clone();
        let t = parms.tunables();
        let mut solicit = false;

        if state != NudState::Stale && state != NudState::Incomplete {
            if t.mcast_probes + t.app_probes > 0 {
                self.probes.store(t.ucast_probes, Ordering::Release);
                st.nud = NudState::Incomplete;
                st.updated = now;
                self.add_timer(&mut st, &table, now + t.retrans_time);
                solicit = true;
            } else {
                st.nud = NudState::Failed;
                st.updated = now;
                drop(st);
                table.notify(self);
                return SendStatus::Dropped(packet);
            }
        } else if state == NudState::Stale {
            debug!(key = ?self.key, "neighbour moving from STALE to DELAY");
            st.nud = NudState::Delay;
            st.updated = now;
            self.add_timer(&mut st, &table, now + t.delay_probe_time);
        }

        if st.nud == NudState::Incomplete {
            if let Some(packet) = packet {
                if st.arp_queue.len() >= t.queue_len {
                    st.arp_queue.pop_front();
                    table.stats.inc(Counter::UnresDiscards);
                }
                st.arp_queue.push_back(packet);
            }
            if solicit {
                let front = st.arp_queue.front().cloned();
                drop(st);
                table.protocol.solicit(self, front.as_ref());
                self.probes.fetch_add(1, Ordering::AcqRel);
            }
            return SendStatus::Queued;
        }

        SendStatus::SendNow(packet)
    }

    ///
    /// Moves the entry to `new`, optionally with a new link address. Returns whether observers
    /// should hear about the change.
    ///
    /// Rules, in order:
    /// - without `ADMIN`, `Permanent` and `NoArp` entries are left alone (`PermissionDenied`);
    /// - an invalid `new` state stops the timer and, when it fails a resolving entry, reports its
    ///   queued packets;
    /// - a valid entry keeps its address unless `OVERRIDE` is given; with `WEAK_OVERRIDE` a
    ///   connected entry is demoted to `Stale` instead, otherwise the update is refused
    ///   (`Conflicting`);
    /// - a `Stale` update carrying the cached address does not demote a connected entry (nor any
    ///   valid entry under `WEAK_OVERRIDE`);
    /// - an entry that becomes valid sends everything it queued.
    ///
    pub fn update(
        self: &Arc<Self>,
        lladdr: Option<&LinkAddr>,
        new: NudState,
        flags: UpdateFlags,
    ) -> Result<bool> {
        let table = self.shared().ok_or(NeighError::NotFound)?;
        let now = table.clock.now();

        let mut st = self.state.write().unwrap();
        let old = st.nud;

        if !flags.contains(UpdateFlags::ADMIN) && old.is_static() {
            return Err(NeighError::PermissionDenied);
        }

        if !new.is_valid() {
            self.del_timer(&mut st, &table);
            if old.is_connected() {
                Self::suspect(&mut st);
            }
            st.nud = new;
            let mut notify = old.is_valid();
            if (old == NudState::Incomplete || old == NudState::Probe) && new == NudState::Failed {
                st = self.invalidate(st, &table);
                notify = true;
            }
            drop(st);
            if notify {
                table.notify(self);
            }
            return Ok(notify);
        }

        // `changed` means a new address is about to replace the cached one.
        let (mut lladdr, mut changed) = if self.dev.addr_len() == 0 {
            (st.ha, false)
        } else if let Some(addr) = lladdr {
            if old.is_valid() && *addr == st.ha {
                (st.ha, false)
            } else {
                (*addr, true)
            }
        } else {
            if !old.is_valid() {
                return Err(NeighError::InvalidArgument(
                    "no link address for an unresolved neighbour".to_string(),
                ));
            }
            (st.ha, false)
        };

        if new.is_connected() {
            st.confirmed = now;
        }
        st.updated = now;

        let mut new = new;
        let mut update_isrouter = flags.contains(UpdateFlags::OVERRIDE_ISROUTER);
        if old.is_valid() {
            if changed && !flags.contains(UpdateFlags::OVERRIDE) {
                update_isrouter = false;
                if flags.contains(UpdateFlags::WEAK_OVERRIDE) && old.is_connected() {
                    lladdr = st.ha;
                    changed = false;
                    new = NudState::Stale;
                } else {
                    return Err(NeighError::Conflicting);
                }
            } else if !changed
                && new == NudState::Stale
                && (flags.contains(UpdateFlags::WEAK_OVERRIDE) || old.is_connected())
            {
                new = old;
            }
        }

        let parms = st.parms.clone();
        if new != old {
            self.del_timer(&mut st, &table);
            if new.in_timer() {
                let delay = if new == NudState::Reachable {
                    parms.reachable_time()
                } else {
                    Duration::from_secs(0)
                };
                self.add_timer(&mut st, &table, now + delay);
            }
            st.nud = new;
        }

        let mut notify = false;
        if changed {
            st.ha = lladdr;
            st.hh = None;
            if !new.is_connected() {
                st.confirmed = earlier(now, parms.tunables().base_reachable_time * 2);
            }
            notify = true;
        }

        if new != old {
            notify = true;
            if new.is_connected() {
                Self::connect(&mut st);
            } else {
                Self::suspect(&mut st);
            }
            debug!(key = ?self.key, from = %old, to = %new, "neighbour updated");

            if !old.is_valid() {
                while st.nud.is_valid() {
                    let packet = match st.arp_queue.pop_front() {
                        Some(packet) => packet,
                        None => break,
                    };
                    let output = st.output;
                    drop(st);
                    if let Err(e) = output.output(self, packet) {
                        debug!(key = ?self.key, error = %e, "queued packet not sent");
                    }
                    st = self.state.write().unwrap();
                }
                st.arp_queue.clear();
            }
        }

        if update_isrouter {
            st.flags
                .set(NeighFlags::ROUTER, flags.contains(UpdateFlags::ISROUTER));
        }
        drop(st);

        if notify {
            table.notify(self);
        }
        Ok(notify)
    }

    ///
    /// Timer callback. Advances the reachability state, fails entries that ran out of probes,
    /// re-arms itself while the entry stays in a timed state and sends the next probe.
    ///
    /// A handle that no longer matches the entry's armed timer is ignored.
    ///
    pub(crate) fn timer_fired(self: &Arc<Self>, handle: TimerHandle, table: &TableShared) {
        let now = table.clock.now();
        let mut st = self.state.write().unwrap();
        if st.timer != Some(handle) {
            return;
        }
        st.timer = None;

        let state = st.nud;
        if !state.in_timer() {
            warn!(key = ?self.key, state = %state, "neighbour timer fired outside a timed state");
            return;
        }

        let parms = st.parms.clone();
        let t = parms.tunables();
        let mut next = now + Duration::from_secs(1);
        let mut notify = false;

        match state {
            NudState::Reachable => {
                let reachable_until = st.confirmed + parms.reachable_time();
                if now <= reachable_until {
                    next = reachable_until;
                } else if now <= st.used + t.delay_probe_time {
                    debug!(key = ?self.key, "neighbour is delayed");
                    st.nud = NudState::Delay;
                    st.updated = now;
                    Self::suspect(&mut st);
                    next = now + t.delay_probe_time;
                } else {
                    debug!(key = ?self.key, "neighbour is suspected");
                    st.nud = NudState::Stale;
                    st.updated = now;
                    Self::suspect(&mut st);
                    notify = true;
                }
            }
            NudState::Delay => {
                if now <= st.confirmed + t.delay_probe_time {
                    debug!(key = ?self.key, "neighbour is now reachable");
                    st.nud = NudState::Reachable;
                    st.updated = now;
                    Self::connect(&mut st);
                    notify = true;
                    next = st.confirmed + parms.reachable_time();
                } else {
                    debug!(key = ?self.key, "neighbour is probed");
                    st.nud = NudState::Probe;
                    st.updated = now;
                    self.probes.store(0, Ordering::Release);
                    next = now + t.retrans_time;
                }
            }
            _ => {
                next = now + t.retrans_time;
            }
        }

        let resolving = st.nud == NudState::Incomplete || st.nud == NudState::Probe;
        if resolving && self.probes() >= parms.max_probes(st.nud) {
            st.nud = NudState::Failed;
            st.updated = now;
            notify = true;
            st = self.invalidate(st, table);
        }

        if st.nud.in_timer() {
            let earliest = now + table.min_timer_delay();
            if next < earliest {
                next = earliest;
            }
            self.add_timer(&mut st, table, next);
        }

        if st.nud == NudState::Incomplete || st.nud == NudState::Probe {
            let front = st.arp_queue.front().cloned();
            drop(st);
            table.protocol.solicit(self, front.as_ref());
            self.probes.fetch_add(1, Ordering::AcqRel);
        } else {
            drop(st);
        }

        if notify {
            table.notify(self);
        }
    }

    ///
    /// Leaves an entry that was unlinked while others still hold it in a harmless state: nothing
    /// queued, no timer, blackhole output, and `NoArp` (still valid) or `None`.
    ///
    pub(crate) fn neutralize(&self, table: &TableShared) {
        let mut st = self.state.write().unwrap();
        self.del_timer(&mut st, table);
        self.set_dead(true);
        st.arp_queue.clear();
        st.output = BLACKHOLE;
        st.nud = if st.nud.is_valid() {
            NudState::NoArp
        } else {
            NudState::None
        };
    }

    /// Unlink-time bookkeeping for an entry nobody else holds.
    pub(crate) fn retire(&self, table: &TableShared) {
        let mut st = self.state.write().unwrap();
        self.del_timer(&mut st, table);
        self.set_dead(true);
    }
}

impl Drop for Neighbour {
    fn drop(&mut self) {
        if !self.is_dead() {
            warn!(key = ?self.key, "destroying alive neighbour");
        }
        if let Ok(st) = self.state.get_mut() {
            st.arp_queue.clear();
            st.hh = None;
        }
        if let Some(table) = self.table.upgrade() {
            table.stats.inc(Counter::Destroys);
        }
        debug!(key = ?self.key, dev = self.dev.name(), "neighbour destroyed");
    }
}

impl fmt::Debug for Neighbour {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Neighbour")
            .field("key", &self.key)
            .field("dev", &self.dev.name())
            .field("dead", &self.is_dead())
            .finish()
    }
}
