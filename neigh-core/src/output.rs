use crate::error::{NeighError, Result};
use crate::neighbour::{Neighbour, SendStatus};
use crate::packet::Packet;
use std::fmt::Debug;
use std::sync::Arc;

/// Outcome of handing a packet to an entry's output path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Xmit {
    /// Given to the device.
    Sent,
    /// Waiting on resolution.
    Queued,
    /// Discarded because resolution already failed.
    Dropped,
}

///
/// One way of pushing a packet towards a neighbour. Every entry points at exactly one `Output`
/// at a time and moves between them as it gains and loses reachability.
///
pub trait Output: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn output(&self, neigh: &Arc<Neighbour>, packet: Packet) -> Result<Xmit>;
}

/// Output of entries that are not (or no longer) in a table. The packet is handed back.
#[derive(Debug)]
pub struct Blackhole;

impl Output for Blackhole {
    fn name(&self) -> &'static str {
        "blackhole"
    }

    fn output(&self, _neigh: &Arc<Neighbour>, packet: Packet) -> Result<Xmit> {
        Err(NeighError::Unreachable(vec![packet]))
    }
}

/// Slow path: runs the state machine first, and only transmits once the entry allows it.
#[derive(Debug)]
pub struct Resolve;

impl Output for Resolve {
    fn name(&self) -> &'static str {
        "resolve"
    }

    fn output(&self, neigh: &Arc<Neighbour>, packet: Packet) -> Result<Xmit> {
        match neigh.event_send(Some(packet)) {
            SendStatus::SendNow(Some(packet)) => neigh.transmit(packet),
            SendStatus::SendNow(None) => Ok(Xmit::Sent),
            SendStatus::Queued => Ok(Xmit::Queued),
            SendStatus::Dropped(_) => Ok(Xmit::Dropped),
        }
    }
}

/// Fast path for confirmed entries: address and transmit.
#[derive(Debug)]
pub struct Connected;

impl Output for Connected {
    fn name(&self) -> &'static str {
        "connected"
    }

    fn output(&self, neigh: &Arc<Neighbour>, packet: Packet) -> Result<Xmit> {
        neigh.transmit(packet)
    }
}

/// Straight to the device, for links that need no resolution and no header.
#[derive(Debug)]
pub struct Direct;

impl Output for Direct {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn output(&self, neigh: &Arc<Neighbour>, packet: Packet) -> Result<Xmit> {
        neigh.xmit_raw(packet)
    }
}

/// The pair of outputs an entry switches between: `slow` while its reachability is in doubt,
/// `fast` once it is confirmed.
#[derive(Clone, Copy, Debug)]
pub struct OutputOps {
    pub slow: &'static dyn Output,
    pub fast: &'static dyn Output,
}

impl OutputOps {
    pub const GENERIC: OutputOps = OutputOps {
        slow: &Resolve,
        fast: &Connected,
    };

    pub const DIRECT: OutputOps = OutputOps {
        slow: &Direct,
        fast: &Direct,
    };
}

pub(crate) const BLACKHOLE: &dyn Output = &Blackhole;
