mod types;
pub use self::types::*;

mod error;
pub use self::error::*;

mod ethernet;
pub use self::ethernet::*;

mod arp;
pub use self::arp::*;
