//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which lens a Link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// A device seen during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// The advertised name, "Unknown" when the device did not advertise one
    pub name: String,
    /// The address of the device (MAC address on most platforms, the platform id otherwise)
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Returns true if the advertised name carries the given side marker
    pub fn has_marker(&self, marker: &str) -> bool {
        self.name.contains(marker)
    }
}

/// Snapshot of one Link's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub present: bool,
    pub connected: bool,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Snapshot of both sides. Derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub left: LinkStatus,
    pub right: LinkStatus,
}

impl ConnectionStatus {
    pub fn side(&self, side: Side) -> &LinkStatus {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Connection lifecycle events published by Links and the reconnect supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Connected { side: Side },
    Disconnected { side: Side },
    Reconnecting { side: Side, attempt: u32 },
    Reconnected { side: Side },
    ReconnectFailed { side: Side, attempts: u32 },
}

/// Result of waiting for the next inbound packet after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    Unexpected(Vec<u8>),
    TimedOut,
}
