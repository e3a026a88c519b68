use crate::device::Device;
use std::sync::Arc;

/// How a received packet was addressed at the link layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
    /// Originated locally.
    Outgoing,
}

/// A buffer moving through the cache: either an outgoing network-layer packet waiting on
/// resolution, or a received solicitation waiting in the proxy queue.
#[derive(Clone, Debug)]
pub struct Packet {
    pub data: Vec<u8>,
    pub dev: Arc<Device>,
    /// Ether type of `data`.
    pub protocol: u16,
    pub pkt_type: PacketType,
    /// Set when the packet already sat in the proxy delay queue.
    pub locally_enqueued: bool,
}

impl Packet {
    pub fn new(data: Vec<u8>, dev: Arc<Device>, protocol: u16) -> Self {
        Packet {
            data,
            dev,
            protocol,
            pkt_type: PacketType::Outgoing,
            locally_enqueued: false,
        }
    }

    pub fn pkt_type(self, pkt_type: PacketType) -> Self {
        Packet { pkt_type, ..self }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Prepends a link header in front of the payload.
    pub fn push_header(&mut self, header: &[u8]) {
        let mut data = Vec::with_capacity(header.len() + self.data.len());
        data.extend_from_slice(header);
        data.append(&mut self.data);
        self.data = data;
    }
}
