#![allow(dead_code)]

use crossbeam::crossbeam_channel::{self, Receiver, Sender};
use neigh_core::{
    Device, LinkAddr, ManualClock, NeighProtocol, NeighSetup, NeighTable, Neighbour, Packet,
    Result, TableConfig, Tunables,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const FAMILY: u16 = 2;
pub const IPV4: u16 = 0x0800;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Solicit(Vec<u8>),
    Unreachable(Vec<u8>),
    Redo(Vec<u8>),
    Xmit(Vec<u8>),
}

/// Hands every adapter callback to a channel.
pub struct ChannelProtocol {
    events: Sender<Event>,
}

impl NeighProtocol for ChannelProtocol {
    fn family(&self) -> u16 {
        FAMILY
    }

    fn id(&self) -> &'static str {
        "channel_cache"
    }

    fn key_len(&self) -> usize {
        4
    }

    fn hash(&self, key: &[u8], dev: &Device, salt: u32) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(key);
        (u32::from_be_bytes(word) ^ dev.index()).wrapping_mul(0x9e37_79b9) ^ salt
    }

    fn construct(&self, _setup: &mut NeighSetup) -> Result<()> {
        Ok(())
    }

    fn solicit(&self, neigh: &Neighbour, _packet: Option<&Packet>) {
        let _ = self.events.send(Event::Solicit(neigh.key().to_vec()));
    }

    fn error_report(&self, _neigh: &Neighbour, packet: Packet) {
        let _ = self.events.send(Event::Unreachable(packet.data));
    }

    fn proxy_redo(&self, packet: Packet) {
        let _ = self.events.send(Event::Redo(packet.data));
    }

    fn link_header(&self, dev: &Device, dest: &LinkAddr, protocol: u16) -> Option<Vec<u8>> {
        let mut header = dest.as_bytes().to_vec();
        header.extend_from_slice(dev.addr().as_bytes());
        header.extend_from_slice(&protocol.to_be_bytes());
        Some(header)
    }

    fn queue_xmit(&self, packet: Packet) {
        let _ = self.events.send(Event::Xmit(packet.data));
    }
}

/// Sends `tracing` output through the test harness. Filter with `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn table(
    tunables: Tunables,
    config: TableConfig,
) -> (NeighTable, Arc<ManualClock>, Receiver<Event>) {
    init_logging();
    let (events, receiver) = crossbeam_channel::unbounded();
    let clock = Arc::new(ManualClock::new());
    let table = NeighTable::new(
        Arc::new(ChannelProtocol { events }),
        tunables,
        config.seed(17),
        clock.clone(),
    );
    (table, clock, receiver)
}

pub fn device(index: u32) -> Arc<Device> {
    Arc::new(
        Device::new(index, &format!("eth{}", index))
            .hw_addr(mac(0xa0 + index as u8))
            .broadcast(LinkAddr::new(&[0xff; 6])),
    )
}

pub fn mac(last: u8) -> LinkAddr {
    LinkAddr::new(&[0x02, 0, 0, 0, 0, last])
}

pub fn key(host: u8) -> Vec<u8> {
    vec![192, 168, 1, host]
}

pub fn packet(dev: &Arc<Device>, payload: &[u8]) -> Packet {
    Packet::new(payload.to_vec(), dev.clone(), IPV4)
}

/// The frame `link_header` produces for `payload` sent to `dest` from `dev`.
pub fn framed(dev: &Device, dest: &LinkAddr, payload: &[u8]) -> Vec<u8> {
    let mut frame = dest.as_bytes().to_vec();
    frame.extend_from_slice(dev.addr().as_bytes());
    frame.extend_from_slice(&IPV4.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn solicits(events: &Receiver<Event>) -> usize {
    events
        .try_iter()
        .filter(|e| match e {
            Event::Solicit(_) => true,
            _ => false,
        })
        .count()
}
