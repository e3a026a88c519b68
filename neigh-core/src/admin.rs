use crate::addr::LinkAddr;
use crate::device::Device;
use crate::error::{NeighError, Result};
use crate::neighbour::NeighInfo;
use crate::params::{TableConfig, Tunables};
use crate::proxy::ProxyEntry;
use crate::state::{NudState, UpdateFlags};
use crate::stats::StatsSnapshot;
use crate::table::NeighTable;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Entry flags carried by management requests.
    pub struct NtfFlags: u8 {
        /// Kick resolution as if a packet was sent, instead of setting a state.
        const USE = 0x01;
        /// Operate on the proxy table.
        const PROXY = 0x08;
        const ROUTER = 0x80;
    }
}

bitflags! {
    /// How an add request treats an existing entry.
    pub struct AddMode: u32 {
        /// Create the entry if it is missing.
        const CREATE = 0x01;
        /// Fail if the entry exists.
        const EXCL = 0x02;
        /// Allow replacing the link address of an existing entry.
        const REPLACE = 0x04;
    }
}

/// An administrative add/update of one entry.
#[derive(Clone, Debug)]
pub struct NeighRequest {
    pub family: u16,
    pub dst: Vec<u8>,
    pub dev: Option<Arc<Device>>,
    pub lladdr: Option<LinkAddr>,
    pub state: NudState,
    pub flags: NtfFlags,
    pub mode: AddMode,
}

impl NeighRequest {
    pub fn new(family: u16, dst: &[u8], dev: Option<Arc<Device>>) -> Self {
        NeighRequest {
            family,
            dst: dst.to_vec(),
            dev,
            lladdr: None,
            state: NudState::Permanent,
            flags: NtfFlags::empty(),
            mode: AddMode::CREATE | AddMode::REPLACE,
        }
    }

    pub fn lladdr(self, lladdr: LinkAddr) -> Self {
        NeighRequest {
            lladdr: Some(lladdr),
            ..self
        }
    }

    pub fn state(self, state: NudState) -> Self {
        NeighRequest { state, ..self }
    }

    pub fn flags(self, flags: NtfFlags) -> Self {
        NeighRequest { flags, ..self }
    }

    pub fn mode(self, mode: AddMode) -> Self {
        NeighRequest { mode, ..self }
    }
}

/// Table-wide parameters and counters, as reported to management.
#[derive(Clone, Debug)]
pub struct TableParams {
    pub family: u16,
    pub id: &'static str,
    pub tunables: Tunables,
    pub config: TableConfig,
    pub entries: usize,
    pub hash_buckets: usize,
    pub proxy_queue_len: usize,
    pub stats: StatsSnapshot,
}

impl NeighTable {
    ///
    /// Administrative add or update. Returns whether observers should be notified.
    ///
    /// Proxy requests only touch the proxy table. Otherwise the request needs a device, and
    /// `mode` decides what happens to a missing (`CREATE`) or existing (`EXCL`, `REPLACE`) entry.
    ///
    pub fn neigh_add(&self, req: &NeighRequest) -> Result<bool> {
        if req.family != self.family() {
            return Err(NeighError::InvalidArgument(format!(
                "family {} sent to table {}",
                req.family,
                self.id()
            )));
        }
        self.check_key(&req.dst)?;
        // Only the device's address length is kept from the request.
        let lladdr = match (&req.dev, req.lladdr) {
            (Some(dev), Some(lladdr)) => {
                if lladdr.len() < dev.addr_len() {
                    return Err(NeighError::InvalidArgument(
                        "link address shorter than the device address".to_string(),
                    ));
                }
                Some(LinkAddr::new(&lladdr.as_bytes()[..dev.addr_len()]))
            }
            (_, lladdr) => lladdr,
        };

        if req.flags.contains(NtfFlags::PROXY) {
            self.pneigh_create(&req.dst, req.dev.as_deref())?;
            return Ok(true);
        }

        let dev = req.dev.as_ref().ok_or_else(|| {
            NeighError::InvalidArgument("neighbour entries need a device".to_string())
        })?;

        let mut flags = UpdateFlags::ADMIN | UpdateFlags::OVERRIDE;
        let neigh = match self.lookup(&req.dst, dev) {
            Some(neigh) => {
                if req.mode.contains(AddMode::EXCL) {
                    return Err(NeighError::Exists);
                }
                if !req.mode.contains(AddMode::REPLACE) {
                    flags.remove(UpdateFlags::OVERRIDE);
                }
                neigh
            }
            None => {
                if !req.mode.contains(AddMode::CREATE) {
                    return Err(NeighError::NotFound);
                }
                self.create(&req.dst, dev)?
            }
        };

        if req.flags.contains(NtfFlags::USE) {
            neigh.event_send(None);
            return Ok(false);
        }
        if req.flags.contains(NtfFlags::ROUTER) {
            flags |= UpdateFlags::OVERRIDE_ISROUTER | UpdateFlags::ISROUTER;
        }
        neigh.update(lladdr.as_ref(), req.state, flags)
    }

    ///
    /// Administrative delete. The entry is failed (its queued packets reported) and left for the
    /// collector; proxy entries are removed outright.
    ///
    pub fn neigh_delete(
        &self,
        dst: &[u8],
        dev: Option<&Arc<Device>>,
        flags: NtfFlags,
    ) -> Result<bool> {
        self.check_key(dst)?;
        if flags.contains(NtfFlags::PROXY) {
            self.pneigh_delete(dst, dev.map(|d| &**d))?;
            return Ok(true);
        }

        let dev = dev.ok_or_else(|| {
            NeighError::InvalidArgument("neighbour entries need a device".to_string())
        })?;
        let neigh = self.lookup(dst, dev).ok_or(NeighError::NotFound)?;
        neigh.update(
            None,
            NudState::Failed,
            UpdateFlags::OVERRIDE | UpdateFlags::ADMIN,
        )
    }

    pub fn dump(&self) -> Vec<NeighInfo> {
        self.entries().iter().map(|neigh| neigh.info()).collect()
    }

    pub fn dump_proxies(&self) -> Vec<ProxyEntry> {
        self.pneigh_entries()
    }

    pub fn table_params(&self) -> TableParams {
        TableParams {
            family: self.family(),
            id: self.id(),
            tunables: self.default_parms().tunables().clone(),
            config: self.config(),
            entries: self.len(),
            hash_buckets: self.hash_buckets(),
            proxy_queue_len: self.proxy_queue_len(),
            stats: self.stats(),
        }
    }

    /// New tunables only reach entries created afterwards.
    pub fn set_table_params(&self, tunables: Option<Tunables>, config: Option<TableConfig>) {
        if let Some(tunables) = tunables {
            self.set_default_tunables(tunables);
        }
        if let Some(config) = config {
            self.set_config(config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::{eth_device, ipv4_key, test_table, RecordingProtocol, TEST_FAMILY};
    use std::time::Duration;

    fn mac(last: u8) -> LinkAddr {
        LinkAddr::new(&[2, 0, 0, 0, 0, last])
    }

    #[test]
    fn add_permanent_entry() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(dev.clone())).lladdr(mac(7));

        assert_eq!(table.neigh_add(&req).unwrap(), true);
        let neigh = table.lookup(&ipv4_key(7), &dev).unwrap();
        assert_eq!(neigh.nud_state(), NudState::Permanent);
        assert_eq!(neigh.ha(), mac(7));

        let dump = table.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].state, NudState::Permanent);
    }

    #[test]
    fn exclusive_add_of_existing_entry() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(dev)).lladdr(mac(7));
        table.neigh_add(&req).unwrap();

        match table.neigh_add(&req.clone().mode(AddMode::CREATE | AddMode::EXCL)) {
            Err(NeighError::Exists) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn add_without_create_needs_existing_entry() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(eth_device(1)))
            .lladdr(mac(7))
            .mode(AddMode::REPLACE);
        match table.neigh_add(&req) {
            Err(NeighError::NotFound) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn add_without_replace_keeps_address() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(dev.clone()))
            .lladdr(mac(7))
            .state(NudState::Reachable);
        table.neigh_add(&req).unwrap();

        let again = req.clone().lladdr(mac(8)).mode(AddMode::CREATE);
        match table.neigh_add(&again) {
            Err(NeighError::Conflicting) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(table.lookup(&ipv4_key(7), &dev).unwrap().ha(), mac(7));
    }

    #[test]
    fn proxy_add_and_delete() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(9), None).flags(NtfFlags::PROXY);
        table.neigh_add(&req).unwrap();
        assert_eq!(table.dump_proxies().len(), 1);

        table.neigh_delete(&ipv4_key(9), None, NtfFlags::PROXY).unwrap();
        assert!(table.dump_proxies().is_empty());
        match table.neigh_delete(&ipv4_key(9), None, NtfFlags::PROXY) {
            Err(NeighError::NotFound) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn delete_fails_the_entry() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(dev.clone())).lladdr(mac(7));
        table.neigh_add(&req).unwrap();

        let notify = table
            .neigh_delete(&ipv4_key(7), Some(&dev), NtfFlags::empty())
            .unwrap();
        assert!(notify);
        let neigh = table.lookup(&ipv4_key(7), &dev).unwrap();
        assert_eq!(neigh.nud_state(), NudState::Failed);
        drop(neigh);

        table.periodic_work();
        assert!(table.is_empty());
    }

    #[test]
    fn use_flag_starts_resolution() {
        let (table, _clock, events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req =
            NeighRequest::new(TEST_FAMILY, &ipv4_key(3), Some(dev.clone())).flags(NtfFlags::USE);

        assert_eq!(table.neigh_add(&req).unwrap(), false);
        assert_eq!(
            table.lookup(&ipv4_key(3), &dev).unwrap().nud_state(),
            NudState::Incomplete
        );
        assert_eq!(events.try_iter().filter(|e| e.is_solicit()).count(), 1);
    }

    #[test]
    fn new_tunables_apply_to_new_entries_only() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let before = table.create(&ipv4_key(1), &dev).unwrap();

        table.set_table_params(
            Some(Tunables::new().retrans_time(Duration::from_millis(250))),
            None,
        );
        let after = table.create(&ipv4_key(2), &dev).unwrap();

        assert_eq!(before.parms().tunables().retrans_time, Duration::from_secs(1));
        assert_eq!(after.parms().tunables().retrans_time, Duration::from_millis(250));
        assert_eq!(
            table.table_params().tunables.retrans_time,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn wrong_family_is_rejected() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let req = NeighRequest::new(TEST_FAMILY + 1, &ipv4_key(1), Some(eth_device(1)));
        match table.neigh_add(&req) {
            Err(NeighError::InvalidArgument(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &[10, 0, 0], Some(dev.clone())).lladdr(mac(7));

        match table.neigh_add(&req) {
            Err(NeighError::InvalidArgument(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match table.neigh_delete(&[10, 0, 0], Some(&dev), NtfFlags::empty()) {
            Err(NeighError::InvalidArgument(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(table.lookup(&[10, 0, 0], &dev).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn long_link_address_is_cut_to_device_length() {
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(7), Some(dev.clone()))
            .lladdr(LinkAddr::new(&[2, 0, 0, 0, 0, 7, 0xee, 0xee]))
            .state(NudState::Reachable);
        table.neigh_add(&req).unwrap();

        let neigh = table.lookup(&ipv4_key(7), &dev).unwrap();
        assert_eq!(neigh.ha(), mac(7));
        // The same address reported again is not a change.
        neigh
            .update(Some(&mac(7)), NudState::Reachable, UpdateFlags::empty())
            .unwrap();
        assert_eq!(neigh.ha(), mac(7));
    }
}
