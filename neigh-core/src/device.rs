use crate::addr::LinkAddr;
use bitflags::bitflags;
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

bitflags! {
    /// Link properties that change how neighbours on a device are resolved.
    pub struct DeviceFlags: u32 {
        /// Device does not use address resolution.
        const NOARP = 0x01;
        const LOOPBACK = 0x02;
        const POINTOPOINT = 0x04;
        /// Device takes frames without a link header.
        const HEADERLESS = 0x08;
    }
}

/// A network interface as seen by the cache. Identity is the interface index.
#[derive(Debug)]
pub struct Device {
    index: u32,
    name: String,
    addr: AtomicCell<LinkAddr>,
    broadcast: LinkAddr,
    flags: DeviceFlags,
    running: AtomicBool,
}

impl Device {
    pub fn new(index: u32, name: &str) -> Self {
        Device {
            index,
            name: name.to_string(),
            addr: AtomicCell::new(LinkAddr::empty()),
            broadcast: LinkAddr::empty(),
            flags: DeviceFlags::empty(),
            running: AtomicBool::new(true),
        }
    }

    pub fn hw_addr(self, addr: LinkAddr) -> Self {
        self.addr.store(addr);
        self
    }

    /// Broadcast address, must match the length of the hardware address.
    pub fn broadcast(self, broadcast: LinkAddr) -> Self {
        assert_eq!(
            broadcast.len(),
            self.addr.load().len(),
            "broadcast and hardware address lengths differ"
        );
        Device { broadcast, ..self }
    }

    pub fn flags(self, flags: DeviceFlags) -> Self {
        Device { flags, ..self }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> LinkAddr {
        self.addr.load()
    }

    pub fn addr_len(&self) -> usize {
        self.addr.load().len()
    }

    pub fn broadcast_addr(&self) -> LinkAddr {
        self.broadcast
    }

    pub fn device_flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Replaces the hardware address. Callers follow up with `DeviceEvent::ChangeAddr` so the
    /// cache forgets what it resolved through the old address.
    pub fn set_addr(&self, addr: LinkAddr) {
        self.addr.store(addr);
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Device {}

/// Device lifecycle notifications fanned out to every registered table.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    ChangeAddr(Arc<Device>),
    Down(Arc<Device>),
}

impl DeviceEvent {
    pub fn device(&self) -> &Arc<Device> {
        match self {
            DeviceEvent::ChangeAddr(dev) | DeviceEvent::Down(dev) => dev,
        }
    }
}
