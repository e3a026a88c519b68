extern crate crossbeam;
extern crate tokio;

/// Link-layer addresses of arbitrary length, up to `MAX_ADDR_LEN` bytes.
pub mod addr;

/// Management surface: administrative add and delete, dumps, and table parameters. This is what
/// a netlink-like control plane would sit on top of.
pub mod admin;

/// Time sources. Tables never read the system time directly, so tests can step a `ManualClock`
/// through resolution timeouts.
pub mod clock;

/// Async driver that polls a registry of tables on a Tokio interval.
pub mod daemon;

/// Devices as the cache sees them, and the events that flush their entries.
pub mod device;

pub mod error;

/// Entry collection: forced collection at admission and the periodic sweep.
mod gc;

/// The neighbour entry and its reachability state machine. Sending through an entry, confirming
/// it and its timers all end up here.
pub mod neighbour;

/// Output paths an entry switches between as it gains and loses reachability.
pub mod output;

pub mod packet;

/// Tunables shared by entries, per table or per device, and table-wide configuration.
pub mod params;

/// The contract a protocol adapter (ARP, ND) fulfils to plug into a table.
pub mod protocol;

/// Proxy entries and the delayed proxy queue.
pub mod proxy;

/// Every table of one stack, by address family.
pub mod registry;

pub mod state;

pub mod stats;

/// The table: lookup, creation, growth, flushing and polling.
pub mod table;

pub mod timer;

/// Utility module
mod utils;

pub use self::addr::{LinkAddr, MAX_ADDR_LEN};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::device::{Device, DeviceEvent, DeviceFlags};
pub use self::error::{NeighError, Result};
pub use self::neighbour::{NeighInfo, Neighbour, SendStatus};
pub use self::packet::{Packet, PacketType};
pub use self::params::{NeighParms, TableConfig, Tunables};
pub use self::protocol::{NeighProtocol, NeighSetup};
pub use self::registry::NeighRegistry;
pub use self::state::{NeighFlags, NudState, UpdateFlags};
pub use self::table::{NeighTable, WeakNeighTable};
