use std::collections::HashSet;
use std::net::Ipv4Addr;

/// One IPv4 address configured on a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub dev_index: u32,
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl InterfaceAddr {
    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - u32::from(self.prefix_len))
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(self.addr) & mask == u32::from(ip) & mask
    }

    /// Directed broadcast of the subnet. Point-to-point sized prefixes have none.
    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        if self.prefix_len >= 31 {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.addr) | !self.mask()))
    }
}

/// How an address looks from this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrType {
    Local,
    Broadcast,
    Multicast,
    Unicast,
}

/// Which source address goes into a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpAnnounce {
    /// The source of the packet that triggered resolution, when it is local.
    Any,
    /// As `Any`, but only when that source shares a subnet with the target.
    SameSubnet,
    /// Always the best address of the device.
    Primary,
}

impl Default for ArpAnnounce {
    fn default() -> Self {
        ArpAnnounce::Any
    }
}

///
/// The slice of IPv4 configuration ARP consults: addresses per device, proxy ARP and
/// forwarding switches. Connected subnets double as the routing table.
///
#[derive(Clone, Debug, Default)]
pub struct ArpConfig {
    addrs: Vec<InterfaceAddr>,
    proxy_arp: HashSet<u32>,
    pub forwarding: bool,
    /// Create entries from unsolicited replies.
    pub arp_accept: bool,
    pub announce: ArpAnnounce,
}

impl ArpConfig {
    pub fn new() -> Self {
        ArpConfig::default()
    }

    pub fn addr(mut self, dev_index: u32, addr: Ipv4Addr, prefix_len: u8) -> Self {
        assert!(prefix_len <= 32, "prefix length {} > 32", prefix_len);
        self.addrs.push(InterfaceAddr {
            dev_index,
            addr,
            prefix_len,
        });
        self
    }

    pub fn proxy_arp(mut self, dev_index: u32) -> Self {
        self.proxy_arp.insert(dev_index);
        self
    }

    pub fn forwarding(self, forwarding: bool) -> Self {
        ArpConfig { forwarding, ..self }
    }

    pub fn arp_accept(self, arp_accept: bool) -> Self {
        ArpConfig { arp_accept, ..self }
    }

    pub fn announce(self, announce: ArpAnnounce) -> Self {
        ArpConfig { announce, ..self }
    }

    pub fn addrs(&self) -> &[InterfaceAddr] {
        &self.addrs
    }

    /// Whether the device carries IPv4 at all.
    pub fn has_device(&self, dev_index: u32) -> bool {
        self.addrs.iter().any(|a| a.dev_index == dev_index)
    }

    pub fn proxy_arp_on(&self, dev_index: u32) -> bool {
        self.proxy_arp.contains(&dev_index)
    }

    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        self.addrs.iter().any(|a| a.addr == ip)
    }

    pub fn addr_type(&self, ip: Ipv4Addr) -> AddrType {
        if self.is_local(ip) {
            AddrType::Local
        } else if ip.is_broadcast()
            || ip.is_unspecified()
            || self.addrs.iter().any(|a| a.broadcast() == Some(ip))
        {
            AddrType::Broadcast
        } else if ip.is_multicast() {
            AddrType::Multicast
        } else {
            AddrType::Unicast
        }
    }

    /// Device of the most specific connected subnet holding `ip`.
    pub fn route_dev(&self, ip: Ipv4Addr) -> Option<u32> {
        self.addrs
            .iter()
            .filter(|a| a.contains(ip))
            .max_by_key(|a| a.prefix_len)
            .map(|a| a.dev_index)
    }

    /// Both addresses sit in one subnet of the device.
    pub fn on_link(&self, dev_index: u32, a: Ipv4Addr, b: Ipv4Addr) -> bool {
        self.addrs
            .iter()
            .any(|ifa| ifa.dev_index == dev_index && ifa.contains(a) && ifa.contains(b))
    }

    /// Source address for talking to `target` out of the device: one in the target's subnet,
    /// else the device's first, else any local address.
    pub fn select_addr(&self, dev_index: u32, target: Ipv4Addr) -> Option<Ipv4Addr> {
        self.addrs
            .iter()
            .find(|a| a.dev_index == dev_index && a.contains(target))
            .or_else(|| self.addrs.iter().find(|a| a.dev_index == dev_index))
            .or_else(|| self.addrs.first())
            .map(|a| a.addr)
    }
}
