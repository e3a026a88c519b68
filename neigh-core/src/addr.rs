use neigh_packets::MacAddr;
use std::fmt;

/// Largest link-layer address any device may carry.
pub const MAX_ADDR_LEN: usize = 32;

/// A link-layer address of up to `MAX_ADDR_LEN` bytes, stored inline so it can be copied
/// around (and swapped atomically) without allocating.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddr {
    bytes: [u8; MAX_ADDR_LEN],
    len: usize,
}

impl LinkAddr {
    pub fn new(bytes: &[u8]) -> Self {
        assert!(
            bytes.len() <= MAX_ADDR_LEN,
            "link address length {} > {}",
            bytes.len(),
            MAX_ADDR_LEN
        );
        let mut addr = LinkAddr::empty();
        addr.bytes[..bytes.len()].copy_from_slice(bytes);
        addr.len = bytes.len();
        addr
    }

    pub fn empty() -> Self {
        LinkAddr {
            bytes: [0; MAX_ADDR_LEN],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Interprets the address as an Ethernet address, if it has the right length.
    pub fn to_mac(&self) -> Option<MacAddr> {
        if self.len != 6 {
            return None;
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(self.as_bytes());
        Some(MacAddr::new(bytes))
    }
}

impl Default for LinkAddr {
    fn default() -> Self {
        LinkAddr::empty()
    }
}

impl From<MacAddr> for LinkAddr {
    fn from(mac: MacAddr) -> Self {
        LinkAddr::new(&mac.bytes)
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LinkAddr({})", self)
    }
}
