use bitflags::bitflags;
use std::fmt;

/// Reachability of a neighbour (NUD: neighbour unreachability detection).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NudState {
    None,
    Incomplete,
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    /// Resolution is not needed; the address is fixed by the device.
    NoArp,
    /// Set by an administrator, never aged.
    Permanent,
}

impl NudState {
    /// States that keep a timer armed.
    pub fn in_timer(self) -> bool {
        match self {
            NudState::Incomplete | NudState::Reachable | NudState::Delay | NudState::Probe => true,
            _ => false,
        }
    }

    /// States with a usable link address.
    pub fn is_valid(self) -> bool {
        match self {
            NudState::Permanent
            | NudState::NoArp
            | NudState::Reachable
            | NudState::Probe
            | NudState::Stale
            | NudState::Delay => true,
            _ => false,
        }
    }

    /// States where packets go out on the fast path.
    pub fn is_connected(self) -> bool {
        match self {
            NudState::Permanent | NudState::NoArp | NudState::Reachable => true,
            _ => false,
        }
    }

    /// Timers never touch these; only administrative updates do.
    pub fn is_static(self) -> bool {
        match self {
            NudState::Permanent | NudState::NoArp => true,
            _ => false,
        }
    }
}

impl fmt::Display for NudState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NudState::None => "NONE",
            NudState::Incomplete => "INCOMPLETE",
            NudState::Reachable => "REACHABLE",
            NudState::Stale => "STALE",
            NudState::Delay => "DELAY",
            NudState::Probe => "PROBE",
            NudState::Failed => "FAILED",
            NudState::NoArp => "NOARP",
            NudState::Permanent => "PERMANENT",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// How `Neighbour::update` may treat the entry it changes.
    pub struct UpdateFlags: u32 {
        /// Replace a differing link address.
        const OVERRIDE = 0x01;
        /// A differing address on a connected entry only demotes it to STALE.
        const WEAK_OVERRIDE = 0x02;
        /// Apply the router bit carried by `ISROUTER`.
        const OVERRIDE_ISROUTER = 0x04;
        const ISROUTER = 0x08;
        /// Administrative change, allowed to touch PERMANENT and NOARP entries.
        const ADMIN = 0x10;
    }
}

bitflags! {
    /// Flags carried on the entry itself.
    pub struct NeighFlags: u8 {
        const ROUTER = 0x80;
    }
}
