use crate::admin::{NeighRequest, NtfFlags, TableParams};
use crate::device::{Device, DeviceEvent};
use crate::error::{NeighError, Result};
use crate::neighbour::NeighInfo;
use crate::proxy::ProxyEntry;
use crate::table::NeighTable;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, warn};

///
/// Every neighbour table of one stack, keyed by address family. Device events and management
/// requests enter here and are dispatched to the right table.
///
#[derive(Default)]
pub struct NeighRegistry {
    tables: RwLock<Vec<NeighTable>>,
}

impl NeighRegistry {
    pub fn new() -> Self {
        NeighRegistry::default()
    }

    /// Registers a table. A second table for the same family shadows the first one.
    pub fn register(&self, table: NeighTable) {
        let mut tables = self.tables.write().unwrap();
        if tables.iter().any(|t| t.family() == table.family()) {
            warn!(
                family = table.family(),
                "registering multiple neighbour tables for one family"
            );
        }
        info!(table = table.id(), family = table.family(), "neighbour table registered");
        tables.insert(0, table);
    }

    /// Unregisters and clears the table serving `family`.
    pub fn unregister(&self, family: u16) -> Option<NeighTable> {
        let table = {
            let mut tables = self.tables.write().unwrap();
            let pos = tables.iter().position(|t| t.family() == family)?;
            tables.remove(pos)
        };
        table.clear();
        Some(table)
    }

    pub fn get(&self, family: u16) -> Option<NeighTable> {
        self.tables
            .read()
            .unwrap()
            .iter()
            .find(|t| t.family() == family)
            .cloned()
    }

    fn table(&self, family: u16) -> Result<NeighTable> {
        self.get(family)
            .ok_or(NeighError::AddressFamilyNotSupported(family))
    }

    pub fn tables(&self) -> Vec<NeighTable> {
        self.tables.read().unwrap().clone()
    }

    pub fn device_event(&self, event: &DeviceEvent) {
        for table in self.tables() {
            table.device_event(event);
        }
    }

    /// Polls every table, returning the earliest next deadline.
    pub fn poll(&self) -> Option<Instant> {
        self.tables().iter().filter_map(|table| table.poll()).min()
    }

    pub fn neigh_add(&self, req: &NeighRequest) -> Result<bool> {
        self.table(req.family)?.neigh_add(req)
    }

    pub fn neigh_delete(
        &self,
        family: u16,
        dst: &[u8],
        dev: Option<&Arc<Device>>,
        flags: NtfFlags,
    ) -> Result<bool> {
        self.table(family)?.neigh_delete(dst, dev, flags)
    }

    /// Entries of one family, or of every table with `None`.
    pub fn dump(&self, family: Option<u16>) -> Result<Vec<NeighInfo>> {
        match family {
            Some(family) => Ok(self.table(family)?.dump()),
            None => Ok(self.tables().iter().flat_map(|t| t.dump()).collect()),
        }
    }

    pub fn dump_proxies(&self, family: u16) -> Result<Vec<ProxyEntry>> {
        Ok(self.table(family)?.dump_proxies())
    }

    pub fn table_params(&self) -> Vec<TableParams> {
        self.tables().iter().map(|t| t.table_params()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::{eth_device, ipv4_key, test_table, RecordingProtocol, TEST_FAMILY};

    #[test]
    fn dispatches_by_family() {
        let registry = NeighRegistry::new();
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        registry.register(table.clone());

        let dev = eth_device(1);
        let req = NeighRequest::new(TEST_FAMILY, &ipv4_key(1), Some(dev.clone()))
            .lladdr(crate::addr::LinkAddr::new(&[2, 0, 0, 0, 0, 1]));
        registry.neigh_add(&req).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(registry.dump(Some(TEST_FAMILY)).unwrap().len(), 1);

        match registry.neigh_add(&NeighRequest::new(99, &ipv4_key(1), Some(dev))) {
            Err(NeighError::AddressFamilyNotSupported(99)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn device_events_reach_every_table() {
        let registry = NeighRegistry::new();
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        registry.register(table.clone());
        let dev = eth_device(1);
        table.create(&ipv4_key(1), &dev).unwrap();

        registry.device_event(&DeviceEvent::Down(dev));
        assert!(table.is_empty());
    }

    #[test]
    fn unregister_clears_the_table() {
        let registry = NeighRegistry::new();
        let (table, _clock, _events) = test_table(RecordingProtocol::new());
        registry.register(table.clone());
        table.create(&ipv4_key(1), &eth_device(1)).unwrap();

        let removed = registry.unregister(TEST_FAMILY).unwrap();
        assert!(removed.is_empty());
        assert!(registry.get(TEST_FAMILY).is_none());
        assert!(registry.unregister(TEST_FAMILY).is_none());
    }

    #[test]
    fn later_registration_shadows() {
        let registry = NeighRegistry::new();
        let (first, _c1, _e1) = test_table(RecordingProtocol::new());
        let (second, _c2, _e2) = test_table(RecordingProtocol::new());
        registry.register(first);
        registry.register(second.clone());
        second.create(&ipv4_key(1), &eth_device(1)).unwrap();
        assert_eq!(registry.get(TEST_FAMILY).unwrap().len(), 1);
        assert_eq!(registry.tables().len(), 2);
    }
}
