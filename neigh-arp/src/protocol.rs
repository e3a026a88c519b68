use crate::config::{AddrType, ArpAnnounce, ArpConfig};
use crate::jhash::jhash_2words;
use crossbeam::crossbeam_channel::Sender;
use neigh_core::output::OutputOps;
use neigh_core::{
    Clock, Device, DeviceFlags, LinkAddr, NeighError, NeighProtocol, NeighSetup, NeighTable,
    Neighbour, NudState, Packet, TableConfig, Tunables, WeakNeighTable,
};
use neigh_packets::{
    ArpFrame, ArpOp, EthernetFrame, MacAddr, ARP_ETHER_TYPE, ETHERNET_ADDR_LEN,
};
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub const AF_INET: u16 = 2;

pub(crate) fn key_addr(key: &[u8]) -> Ipv4Addr {
    let mut octets = [0u8; 4];
    let len = key.len().min(4);
    octets[..len].copy_from_slice(&key[..len]);
    Ipv4Addr::from(octets)
}

/// Source address of an IPv4 packet, if `data` starts with one.
fn ipv4_source(data: &[u8]) -> Option<Ipv4Addr> {
    if data.len() < 20 || data[0] >> 4 != 4 {
        return None;
    }
    Some(key_addr(&data[12..16]))
}

///
/// ARP: resolves IPv4 addresses to Ethernet addresses through a neighbour table.
///
/// Frames leave through `egress`; packets that could not be resolved are handed to
/// `link_failures` so the routing layer can react.
///
pub struct ArpProtocol {
    config: RwLock<ArpConfig>,
    egress: Sender<Packet>,
    link_failures: Sender<Packet>,
    table: RwLock<Option<WeakNeighTable>>,
}

impl ArpProtocol {
    pub fn new(
        config: ArpConfig,
        egress: Sender<Packet>,
        link_failures: Sender<Packet>,
    ) -> Arc<Self> {
        Arc::new(ArpProtocol {
            config: RwLock::new(config),
            egress,
            link_failures,
            table: RwLock::new(None),
        })
    }

    /// Creates the `arp_cache` table served by this adapter.
    pub fn attach(
        self: &Arc<Self>,
        tunables: Tunables,
        table_config: TableConfig,
        clock: Arc<dyn Clock>,
    ) -> NeighTable {
        let table = NeighTable::new(self.clone(), tunables, table_config, clock);
        let mut attached = self.table.write().unwrap();
        if attached.as_ref().and_then(|weak| weak.upgrade()).is_some() {
            warn!("ARP adapter attached to a second table");
        }
        *attached = Some(table.downgrade());
        table
    }

    pub fn table(&self) -> Option<NeighTable> {
        self.table.read().unwrap().as_ref()?.upgrade()
    }

    pub fn config(&self) -> ArpConfig {
        self.config.read().unwrap().clone()
    }

    pub fn set_config(&self, config: ArpConfig) {
        *self.config.write().unwrap() = config;
    }

    ///
    /// Builds and transmits one Ethernet ARP message. `dest_hw` defaults to the device broadcast
    /// address and `target_hw` to all zeroes. Devices that do not use ARP send nothing.
    ///
    pub(crate) fn send(
        &self,
        op: ArpOp,
        dest_ip: Ipv4Addr,
        dev: &Arc<Device>,
        src_ip: Ipv4Addr,
        dest_hw: Option<MacAddr>,
        target_hw: Option<MacAddr>,
    ) {
        if dev.device_flags().contains(DeviceFlags::NOARP) {
            return;
        }
        let src_hw = match dev.addr().to_mac() {
            Some(mac) => mac,
            None => {
                debug!(dev = dev.name(), "no Ethernet address, not sending ARP");
                return;
            }
        };
        let dest_hw = dest_hw
            .or_else(|| dev.broadcast_addr().to_mac())
            .unwrap_or_else(MacAddr::broadcast);
        let target_hw = target_hw.unwrap_or_default();

        let frame = ArpFrame::ipv4(op, dest_hw, src_hw, src_ip, target_hw, dest_ip);
        debug!(
            dev = dev.name(),
            op = ?op,
            target = %dest_ip,
            source = %src_ip,
            "sending ARP"
        );
        let packet = Packet::new(frame.frame().into_data(), dev.clone(), ARP_ETHER_TYPE);
        if self.egress.send(packet).is_err() {
            debug!(dev = dev.name(), "egress closed, ARP frame dropped");
        }
    }
}

impl NeighProtocol for ArpProtocol {
    fn family(&self) -> u16 {
        AF_INET
    }

    fn id(&self) -> &'static str {
        "arp_cache"
    }

    fn key_len(&self) -> usize {
        4
    }

    fn hash(&self, key: &[u8], dev: &Device, salt: u32) -> u32 {
        let mut word = [0u8; 4];
        let len = key.len().min(4);
        word[..len].copy_from_slice(&key[..len]);
        jhash_2words(u32::from_ne_bytes(word), dev.index(), salt)
    }

    ///
    /// Devices without a link header get direct output and never resolve. Multicast targets map
    /// to their group address; loopback and no-ARP devices use their own address; broadcast
    /// targets and point-to-point links use the broadcast address. Everything else starts
    /// unresolved.
    ///
    fn construct(&self, setup: &mut NeighSetup) -> neigh_core::Result<()> {
        let dev = setup.dev;
        let addr = key_addr(setup.key);
        let addr_type = {
            let config = self.config.read().unwrap();
            if !config.has_device(dev.index()) {
                return Err(NeighError::InvalidArgument(format!(
                    "{} has no IPv4 configuration",
                    dev.name()
                )));
            }
            config.addr_type(addr)
        };

        if dev.device_flags().contains(DeviceFlags::HEADERLESS) {
            setup.nud_state = NudState::NoArp;
            setup.ops = OutputOps::DIRECT;
            return Ok(());
        }

        let flags = dev.device_flags();
        if addr_type == AddrType::Multicast {
            setup.nud_state = NudState::NoArp;
            setup.ha = if dev.addr_len() == ETHERNET_ADDR_LEN {
                LinkAddr::from(MacAddr::from_ipv4_multicast(addr.octets()))
            } else {
                dev.broadcast_addr()
            };
        } else if flags.intersects(DeviceFlags::NOARP | DeviceFlags::LOOPBACK) {
            setup.nud_state = NudState::NoArp;
            setup.ha = dev.addr();
        } else if addr_type == AddrType::Broadcast || flags.contains(DeviceFlags::POINTOPOINT) {
            setup.nud_state = NudState::NoArp;
            setup.ha = dev.broadcast_addr();
        }
        setup.ops = OutputOps::GENERIC;
        Ok(())
    }

    ///
    /// Sends one request for the entry. The first `ucast_probes` probes of a round go unicast to
    /// the cached address, the next `app_probes` are left to a user-space resolver (none here),
    /// the rest are broadcast.
    ///
    fn solicit(&self, neigh: &Neighbour, packet: Option<&Packet>) {
        let dev = neigh.dev();
        let target = key_addr(neigh.key());

        let saddr = {
            let config = self.config.read().unwrap();
            if !config.has_device(dev.index()) {
                return;
            }
            let source = packet.and_then(|p| ipv4_source(&p.data));
            let preferred = match config.announce {
                ArpAnnounce::Any => source.filter(|s| config.is_local(*s)),
                ArpAnnounce::SameSubnet => source
                    .filter(|s| config.is_local(*s) && config.on_link(dev.index(), target, *s)),
                ArpAnnounce::Primary => None,
            };
            preferred
                .or_else(|| config.select_addr(dev.index(), target))
                .unwrap_or(Ipv4Addr::UNSPECIFIED)
        };

        let parms = neigh.parms();
        let tunables = parms.tunables();
        let probes = neigh.probes();
        let dest_hw = if probes < tunables.ucast_probes {
            if !neigh.nud_state().is_valid() {
                debug!(target = %target, "trying to unicast probe an unresolved neighbour");
            }
            neigh.ha().to_mac()
        } else if probes < tunables.ucast_probes + tunables.app_probes {
            debug!(target = %target, "no application resolver, probe skipped");
            return;
        } else {
            None
        };

        self.send(ArpOp::Request, target, dev, saddr, dest_hw, None);
    }

    fn error_report(&self, neigh: &Neighbour, packet: Packet) {
        debug!(target = %key_addr(neigh.key()), "link failure");
        if self.link_failures.send(packet).is_err() {
            debug!("link failure sink closed");
        }
    }

    /// A delayed proxy request is due: run it through the receive path again.
    fn proxy_redo(&self, packet: Packet) {
        let table = match self.table() {
            Some(table) => table,
            None => return,
        };
        if let Err(e) = self.process(&table, packet) {
            debug!(error = %e, "proxied request not answered");
        }
    }

    fn link_header(&self, dev: &Device, dest: &LinkAddr, protocol: u16) -> Option<Vec<u8>> {
        if dev.device_flags().contains(DeviceFlags::HEADERLESS) {
            return None;
        }
        let header = EthernetFrame::header(dest.to_mac()?, dev.addr().to_mac()?, protocol);
        Some(header.header_bytes().to_vec())
    }

    fn queue_xmit(&self, packet: Packet) {
        if self.egress.send(packet).is_err() {
            debug!("egress closed, packet dropped");
        }
    }
}
