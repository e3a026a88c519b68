use crate::*;
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(code: u16) -> Option<ArpOp> {
        match code {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// `ar_hrd` value for Ethernet.
pub const ARP_HTYPE_ETHER: u16 = 1;

/// htype(2) ptype(2) hlen(1) plen(1) op(2)
const FIXED_LEN: usize = 8;

/// Variable-length part of the body, laid out sha, spa, tha, tpa.
#[derive(Clone, Copy)]
enum Addr {
    SenderHw,
    SenderProto,
    TargetHw,
    TargetProto,
}

///
/// An ARP body (RFC 826) carried in an Ethernet frame. Address fields are sized by the
/// frame's own `hlen`/`plen`, so non-Ethernet hardware lengths can still be inspected.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArpFrame {
    frame: EthernetFrame,
}

impl ArpFrame {
    ///
    /// Builds an Ethernet/IPv4 message. The Ethernet source is the sender hardware address,
    /// the Ethernet destination is `dest_mac`.
    ///
    pub fn ipv4(
        op: ArpOp,
        dest_mac: MacAddr,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        let mut body = Vec::with_capacity(FIXED_LEN + 2 * (ETHERNET_ADDR_LEN + 4));
        body.extend_from_slice(&ARP_HTYPE_ETHER.to_be_bytes());
        body.extend_from_slice(&IPV4_ETHER_TYPE.to_be_bytes());
        body.push(ETHERNET_ADDR_LEN as u8);
        body.push(4);
        body.extend_from_slice(&(op as u16).to_be_bytes());
        body.extend_from_slice(&sender_mac.bytes);
        body.extend_from_slice(&sender_ip.octets());
        body.extend_from_slice(&target_mac.bytes);
        body.extend_from_slice(&target_ip.octets());

        let mut frame = EthernetFrame::header(dest_mac, sender_mac, ARP_ETHER_TYPE);
        frame.set_payload(&body);
        ArpFrame { frame }
    }

    fn body(&self) -> &[u8] {
        &self.frame.data[self.frame.payload_offset..]
    }

    fn word(&self, at: usize) -> u16 {
        let body = self.body();
        u16::from_be_bytes([body[at], body[at + 1]])
    }

    fn span(&self, addr: Addr) -> Range<usize> {
        let hlen = usize::from(self.hardware_addr_len());
        let plen = usize::from(self.protocol_addr_len());
        let (start, len) = match addr {
            Addr::SenderHw => (FIXED_LEN, hlen),
            Addr::SenderProto => (FIXED_LEN + hlen, plen),
            Addr::TargetHw => (FIXED_LEN + hlen + plen, hlen),
            Addr::TargetProto => (FIXED_LEN + 2 * hlen + plen, plen),
        };
        start..start + len
    }

    fn addr(&self, addr: Addr) -> &[u8] {
        &self.body()[self.span(addr)]
    }

    pub fn hardware_type(&self) -> u16 {
        self.word(0)
    }

    pub fn protocol_type(&self) -> u16 {
        self.word(2)
    }

    pub fn hardware_addr_len(&self) -> u8 {
        self.body()[4]
    }

    pub fn protocol_addr_len(&self) -> u8 {
        self.body()[5]
    }

    pub fn opcode(&self) -> u16 {
        self.word(6)
    }

    pub fn sender_hardware_addr(&self) -> &[u8] {
        self.addr(Addr::SenderHw)
    }

    pub fn sender_protocol_addr(&self) -> &[u8] {
        self.addr(Addr::SenderProto)
    }

    pub fn target_hardware_addr(&self) -> &[u8] {
        self.addr(Addr::TargetHw)
    }

    pub fn target_protocol_addr(&self) -> &[u8] {
        self.addr(Addr::TargetProto)
    }

    /// `None` unless the protocol addresses are four bytes long.
    pub fn sender_ipv4(&self) -> Option<Ipv4Addr> {
        <[u8; 4]>::try_from(self.sender_protocol_addr())
            .ok()
            .map(Ipv4Addr::from)
    }

    pub fn target_ipv4(&self) -> Option<Ipv4Addr> {
        <[u8; 4]>::try_from(self.target_protocol_addr())
            .ok()
            .map(Ipv4Addr::from)
    }

    pub fn ethernet(&self) -> &EthernetFrame {
        &self.frame
    }

    pub fn frame(self) -> EthernetFrame {
        self.frame
    }
}

impl TryFrom<EthernetFrame> for ArpFrame {
    type Error = PacketError;

    /// Accepts frames with the ARP ether type whose body holds every address its length
    /// fields announce. Ethernet padding after the body is ignored.
    fn try_from(frame: EthernetFrame) -> Result<Self> {
        let found = frame.ether_type();
        if found != ARP_ETHER_TYPE {
            return Err(PacketError::WrongEtherType {
                expected: ARP_ETHER_TYPE,
                found,
            });
        }

        let body_len = frame.data.len() - frame.payload_offset;
        if body_len < FIXED_LEN {
            return Err(PacketError::PayloadTooShort);
        }
        let arp = ArpFrame { frame };
        if arp.span(Addr::TargetProto).end > body_len {
            return Err(PacketError::AddrLenMismatch);
        }
        Ok(arp)
    }
}
