//! Bluetooth functionality for the glasses bridge
//! This module handles all bluetooth operations including scanning,
//! connecting, keeping both lenses alive and reconnecting them.

mod bluest_transport;
pub mod constants;
pub mod heartbeat;
pub mod link;
pub mod manager;
#[cfg(test)]
pub(crate) mod mock;
pub mod notification;
pub mod reconnect;
mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::BluestTransport;
pub use link::{Link, ResolvedCharacteristics};
pub use manager::GlassesManager;
pub use notification::{DiagnosticsHandler, NotificationHandler};
pub use reconnect::{ReconnectPolicy, ReconnectSupervisor};
pub use scanner::{extract_mac_address, BluestBackend};
pub use transport::{BleBackend, GattService, GlassTransport};
pub use types::{AckOutcome, ConnectionStatus, DiscoveredDevice, LinkStatus, SessionEvent, Side};
