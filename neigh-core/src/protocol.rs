use crate::addr::LinkAddr;
use crate::device::Device;
use crate::error::Result;
use crate::neighbour::Neighbour;
use crate::output::OutputOps;
use crate::packet::Packet;
use crate::params::NeighParms;
use crate::proxy::ProxyEntry;
use crate::state::NudState;
use std::sync::Arc;

/// What an adapter may decide about an entry before it is linked into the table.
///
/// The core fills in the defaults: state `None`, an empty link address, the generic
/// resolve/connected output pair and the parameter set of the entry's device.
pub struct NeighSetup<'a> {
    pub key: &'a [u8],
    pub dev: &'a Arc<Device>,
    pub parms: Arc<NeighParms>,
    pub nud_state: NudState,
    pub ha: LinkAddr,
    pub ops: OutputOps,
}

///
/// The protocol-specific half of a neighbour table: ARP for IPv4, ND for IPv6, or anything else
/// that maps a network-layer key to a link-layer address.
///
/// Only `hash` is called with the table lock held. Every other callback runs with both the table
/// and the entry lock released, so implementations are free to call back into the table.
///
pub trait NeighProtocol: Send + Sync {
    /// Address family served, used as the registry key.
    fn family(&self) -> u16;

    /// Short name, for logs.
    fn id(&self) -> &'static str;

    /// Length in bytes of every key in the table.
    fn key_len(&self) -> usize;

    /// Bucket hash for (key, device). Must mix in `salt` so a resize reshuffles chains.
    fn hash(&self, key: &[u8], dev: &Device, salt: u32) -> u32;

    /// Sets up a freshly allocated entry. An error aborts the creation.
    fn construct(&self, setup: &mut NeighSetup) -> Result<()>;

    /// Sends one resolution probe. `packet` is the oldest packet waiting on the entry, if any.
    fn solicit(&self, neigh: &Neighbour, packet: Option<&Packet>);

    /// Called once for each packet that was waiting on an entry that failed to resolve.
    fn error_report(&self, neigh: &Neighbour, packet: Packet);

    /// Re-processes a solicitation that sat in the proxy delay queue.
    fn proxy_redo(&self, packet: Packet);

    /// Link header for a frame of `protocol` addressed to `dest`, `None` when the device takes
    /// no header.
    fn link_header(&self, dev: &Device, dest: &LinkAddr, protocol: u16) -> Option<Vec<u8>>;

    /// Hands a fully addressed packet to the device.
    fn queue_xmit(&self, packet: Packet);

    /// Validates a new proxy entry.
    fn pconstruct(&self, _entry: &ProxyEntry) -> Result<()> {
        Ok(())
    }

    fn pdestruct(&self, _entry: &ProxyEntry) {}
}
