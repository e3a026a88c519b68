extern crate crossbeam;

/// IPv4 configuration ARP consults: addresses, proxy ARP, forwarding.
pub mod config;

pub mod error;

/// Jenkins hash used to spread entries over the table buckets.
pub mod jhash;

/// Receive path.
mod process;

/// The adapter itself: entry construction, solicitation, link headers.
pub mod protocol;

pub use self::config::{AddrType, ArpAnnounce, ArpConfig, InterfaceAddr};
pub use self::error::{ArpError, Result};
pub use self::protocol::{ArpProtocol, AF_INET};
