use std::fmt;

pub type PacketData = Vec<u8>;

pub const IPV4_ETHER_TYPE: u16 = 0x0800;
pub const ARP_ETHER_TYPE: u16 = 0x0806;

pub const ETHERNET_ADDR_LEN: usize = 6;
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Ethernet II hardware address. Most significant byte is 0th.
#[derive(Eq, Clone, Copy, Hash, PartialEq, Default)]
pub struct MacAddr {
    pub bytes: [u8; ETHERNET_ADDR_LEN],
}

impl MacAddr {
    pub fn new(bytes: [u8; ETHERNET_ADDR_LEN]) -> MacAddr {
        MacAddr { bytes }
    }

    pub fn broadcast() -> MacAddr {
        MacAddr::new([0xff; ETHERNET_ADDR_LEN])
    }

    pub fn is_broadcast(&self) -> bool {
        self.bytes == [0xff; ETHERNET_ADDR_LEN]
    }

    /// Group bit set, broadcast included.
    pub fn is_multicast(&self) -> bool {
        self.bytes[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0; ETHERNET_ADDR_LEN]
    }

    /// Maps an IPv4 multicast group onto the 01:00:5e block (RFC 1112), keeping the low 23 bits
    /// of the group address.
    pub fn from_ipv4_multicast(group: [u8; 4]) -> MacAddr {
        MacAddr::new([0x01, 0x00, 0x5e, group[1] & 0x7f, group[2], group[3]])
    }
}

impl From<[u8; ETHERNET_ADDR_LEN]> for MacAddr {
    fn from(bytes: [u8; ETHERNET_ADDR_LEN]) -> Self {
        MacAddr::new(bytes)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}
