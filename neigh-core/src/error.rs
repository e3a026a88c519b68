use crate::packet::Packet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NeighError {
    /// The table is over its hard entry limit and nothing could be collected.
    #[error("neighbour table overflow")]
    ResourceExhausted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no such neighbour")]
    NotFound,

    /// Non-administrative change to a permanent or no-arp entry.
    #[error("operation not permitted on static entry")]
    PermissionDenied,

    /// Resolution failed; the packets are handed back to the caller.
    #[error("neighbour unreachable ({} packets)", .0.len())]
    Unreachable(Vec<Packet>),

    /// A different link address was reported for a valid entry without override.
    #[error("conflicting link address")]
    Conflicting,

    #[error("neighbour already exists")]
    Exists,

    #[error("no table registered for address family {0}")]
    AddressFamilyNotSupported(u16),
}

pub type Result<T> = std::result::Result<T, NeighError>;
