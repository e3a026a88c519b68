use neigh_core::NeighError;
use neigh_packets::PacketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArpError {
    #[error("malformed frame: {0}")]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Neigh(#[from] NeighError),

    /// The frame is well formed but not for us to act on.
    #[error("frame dropped: {0}")]
    Dropped(&'static str),

    /// The adapter's table is gone.
    #[error("no neighbour table attached")]
    Detached,
}

pub type Result<T> = std::result::Result<T, ArpError>;
