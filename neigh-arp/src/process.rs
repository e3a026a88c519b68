use crate::config::AddrType;
use crate::error::{ArpError, Result};
use crate::protocol::ArpProtocol;
use neigh_core::{DeviceFlags, LinkAddr, NeighTable, NudState, Packet, PacketType, UpdateFlags};
use neigh_packets::{ArpFrame, ArpOp, EthernetFrame, IPV4_ETHER_TYPE};
use std::convert::TryFrom;
use std::time::Duration;
use tracing::debug;

const ARPHRD_ETHER: u16 = 1;
const ARPHRD_IEEE802: u16 = 6;

impl ArpProtocol {
    ///
    /// Entry point for a received ARP frame (`packet.data` is the whole Ethernet frame). Drops
    /// frames whose address lengths do not fit the device, frames seen on no-ARP devices and
    /// frames addressed to other hosts.
    ///
    pub fn rcv(&self, packet: Packet) -> Result<()> {
        let table = self.table().ok_or(ArpError::Detached)?;
        let dev = &packet.dev;
        if dev.device_flags().contains(DeviceFlags::NOARP) {
            return Err(ArpError::Dropped("device does not use ARP"));
        }
        if packet.pkt_type == PacketType::OtherHost {
            return Err(ArpError::Dropped("frame for another host"));
        }
        self.process(&table, packet)
    }

    ///
    /// Receive processing. Answers requests for local addresses (learning the requester),
    /// answers requests covered by proxy ARP (after a random delay unless the request already
    /// waited or was unicast to us), and feeds senders we already know about, or any
    /// unsolicited replier when `arp_accept` is set, into the cache.
    ///
    pub(crate) fn process(&self, table: &NeighTable, packet: Packet) -> Result<()> {
        let dev = packet.dev.clone();
        let arp = ArpFrame::try_from(EthernetFrame::from_buffer(packet.data.clone(), 0)?)?;

        if usize::from(arp.hardware_addr_len()) != dev.addr_len() || arp.protocol_addr_len() != 4 {
            return Err(ArpError::Dropped("address lengths do not match the device"));
        }
        let hardware_type = arp.hardware_type();
        if (hardware_type != ARPHRD_ETHER && hardware_type != ARPHRD_IEEE802)
            || arp.protocol_type() != IPV4_ETHER_TYPE
        {
            return Err(ArpError::Dropped("not Ethernet/IPv4"));
        }
        let op = ArpOp::from_u16(arp.opcode()).ok_or(ArpError::Dropped("unknown opcode"))?;

        let sha = LinkAddr::new(arp.sender_hardware_addr());
        let sip = arp.sender_ipv4().ok_or(ArpError::Dropped("bad sender address"))?;
        let tip = arp.target_ipv4().ok_or(ArpError::Dropped("bad target address"))?;

        if tip.is_loopback() || tip.is_multicast() {
            return Err(ArpError::Dropped("request for loopback or multicast address"));
        }

        let config = self.config();

        // Duplicate address detection: answer probes for our addresses, learn nothing.
        if sip.is_unspecified() {
            if op == ArpOp::Request && config.addr_type(tip) == AddrType::Local {
                self.send(ArpOp::Reply, sip, &dev, tip, sha.to_mac(), sha.to_mac());
            }
            return Ok(());
        }

        if op == ArpOp::Request {
            if config.addr_type(tip) == AddrType::Local {
                if table.event_ns(&sip.octets(), Some(&sha), &dev).is_some() {
                    self.send(ArpOp::Reply, sip, &dev, tip, sha.to_mac(), sha.to_mac());
                }
                return Ok(());
            }

            if config.forwarding {
                let routed_elsewhere = config.addr_type(tip) == AddrType::Unicast
                    && config
                        .route_dev(tip)
                        .map_or(false, |out| out != dev.index());
                if routed_elsewhere
                    && (config.proxy_arp_on(dev.index())
                        || table.pneigh_lookup(&tip.octets(), Some(&*dev)).is_some())
                {
                    table.event_ns(&sip.octets(), Some(&sha), &dev);

                    let parms = table.parms_for(&dev);
                    if packet.locally_enqueued
                        || packet.pkt_type == PacketType::Host
                        || parms.tunables().proxy_delay == Duration::from_secs(0)
                    {
                        self.send(ArpOp::Reply, sip, &dev, tip, sha.to_mac(), sha.to_mac());
                    } else {
                        debug!(target = %tip, dev = dev.name(), "delaying proxy reply");
                        table.pneigh_enqueue(&parms, packet);
                    }
                    return Ok(());
                }
            }
        }

        let key = sip.octets();
        let mut neigh = table.lookup(&key, &dev);
        if neigh.is_none()
            && config.arp_accept
            && op == ArpOp::Reply
            && config.addr_type(sip) == AddrType::Unicast
        {
            neigh = table.lookup_or_create(&key, &dev, true).ok();
        }

        if let Some(neigh) = neigh {
            // Back-to-back replies from several proxies: the first one wins for `locktime`.
            let locktime = neigh.parms().tunables().locktime;
            let override_ok = table.now() > neigh.updated() + locktime;

            // Broadcast replies and requests do not prove reachability.
            let state = if op != ArpOp::Reply || packet.pkt_type != PacketType::Host {
                NudState::Stale
            } else {
                NudState::Reachable
            };
            let flags = if override_ok {
                UpdateFlags::OVERRIDE
            } else {
                UpdateFlags::empty()
            };
            if let Err(e) = neigh.update(Some(&sha), state, flags) {
                debug!(sender = %sip, error = %e, "ARP update ignored");
            }
        }
        Ok(())
    }
}
