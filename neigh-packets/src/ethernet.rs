use crate::*;
use std::borrow::Cow;

const DEST_OFFSET: usize = 0;
const SRC_OFFSET: usize = 6;
const ETHER_TYPE_OFFSET: usize = 12;

///
/// An Ethernet II frame in an owned buffer. The header starts `layer2_offset` bytes in, so a
/// frame can sit behind bytes that belong to someone else (a capture header, say).
///
/// ```text
/// 0           6           12          14
/// | dest MAC  | src MAC   | ether type | payload ...
/// ```
///
#[derive(Clone, Debug)]
pub struct EthernetFrame {
    pub data: PacketData,
    pub layer2_offset: usize,
    pub payload_offset: usize,
}

impl EthernetFrame {
    pub fn from_buffer(data: PacketData, layer2_offset: usize) -> Result<EthernetFrame> {
        if data.len() < layer2_offset + ETHERNET_HEADER_LEN {
            return Err(PacketError::FrameTooShort {
                minimum: ETHERNET_HEADER_LEN,
            });
        }
        Ok(EthernetFrame {
            data,
            layer2_offset,
            payload_offset: layer2_offset + ETHERNET_HEADER_LEN,
        })
    }

    /// A header-only frame, ready for `set_payload`.
    pub fn header(dest: MacAddr, src: MacAddr, ether_type: u16) -> EthernetFrame {
        let mut data = Vec::with_capacity(ETHERNET_HEADER_LEN);
        data.extend_from_slice(&dest.bytes);
        data.extend_from_slice(&src.bytes);
        data.extend_from_slice(&ether_type.to_be_bytes());
        EthernetFrame {
            data,
            layer2_offset: 0,
            payload_offset: ETHERNET_HEADER_LEN,
        }
    }

    fn mac_at(&self, offset: usize) -> MacAddr {
        let at = self.layer2_offset + offset;
        let mut bytes = [0u8; ETHERNET_ADDR_LEN];
        bytes.copy_from_slice(&self.data[at..at + ETHERNET_ADDR_LEN]);
        MacAddr::new(bytes)
    }

    fn put_mac(&mut self, offset: usize, mac: MacAddr) {
        let at = self.layer2_offset + offset;
        self.data[at..at + ETHERNET_ADDR_LEN].copy_from_slice(&mac.bytes);
    }

    pub fn dest_mac(&self) -> MacAddr {
        self.mac_at(DEST_OFFSET)
    }

    pub fn src_mac(&self) -> MacAddr {
        self.mac_at(SRC_OFFSET)
    }

    pub fn set_dest_mac(&mut self, mac: MacAddr) {
        self.put_mac(DEST_OFFSET, mac);
    }

    pub fn set_src_mac(&mut self, mac: MacAddr) {
        self.put_mac(SRC_OFFSET, mac);
    }

    pub fn ether_type(&self) -> u16 {
        let at = self.layer2_offset + ETHER_TYPE_OFFSET;
        u16::from_be_bytes([self.data[at], self.data[at + 1]])
    }

    pub fn set_ether_type(&mut self, ether_type: u16) {
        let at = self.layer2_offset + ETHER_TYPE_OFFSET;
        self.data[at..at + 2].copy_from_slice(&ether_type.to_be_bytes());
    }

    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    /// Replaces everything after the header.
    pub fn set_payload(&mut self, payload: &[u8]) {
        self.data.truncate(self.payload_offset);
        self.data.extend_from_slice(payload);
    }

    pub fn header_bytes(&self) -> &[u8] {
        &self.data[self.layer2_offset..self.payload_offset]
    }

    pub fn into_data(self) -> PacketData {
        self.data
    }
}

/// Bytes before the layer 2 header do not take part in the comparison.
impl PartialEq for EthernetFrame {
    fn eq(&self, other: &Self) -> bool {
        self.data[self.layer2_offset..] == other.data[other.layer2_offset..]
    }
}

impl Eq for EthernetFrame {}
