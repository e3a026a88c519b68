
pub use self::protocol::*;

use crate::addr::LinkAddr;
use crate::clock::ManualClock;
use crate::device::Device;
use crate::params::{TableConfig, Tunables};
use crate::table::NeighTable;
use crossbeam::crossbeam_channel::Receiver;
use std::sync::Arc;

/// A running Ethernet-like device with a 6-byte address derived from its index.
pub fn eth_device(index: u32) -> Arc<Device> {
    let idx = index.to_be_bytes();
    Arc::new(
        Device::new(index, &format!("eth{}", index))
            .hw_addr(LinkAddr::new(&[0x02, 0xaa, idx[0], idx[1], idx[2], idx[3]]))
            .broadcast(LinkAddr::new(&[0xff; 6])),
    )
}

/// The key for 10.0.0.0 + `host`.
pub fn ipv4_key(host: u32) -> Vec<u8> {
    (0x0a00_0000u32 | host).to_be_bytes().to_vec()
}

pub fn test_table(
    protocol: RecordingProtocol,
) -> (NeighTable, Arc<ManualClock>, Receiver<ProtoEvent>) {
    test_table_with(protocol, Tunables::new(), TableConfig::new().seed(42))
}

pub fn test_table_with(
    protocol: RecordingProtocol,
    tunables: Tunables,
    config: TableConfig,
) -> (NeighTable, Arc<ManualClock>, Receiver<ProtoEvent>) {
    let clock = Arc::new(ManualClock::new());
    let events = protocol.events();
    let table = NeighTable::new(Arc::new(protocol), tunables, config, clock.clone());
    (table, clock, events)
}
