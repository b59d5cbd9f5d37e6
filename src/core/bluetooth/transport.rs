//! The seam between session management and the radio stack.
//!
//! A [`GlassTransport`] is one physical device's GATT client; a [`BleBackend`]
//! finds devices and hands out transports for them. The production
//! implementations live in `bluest_transport` and `scanner`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::types::DiscoveredDevice;

/// A GATT service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

impl GattService {
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics.contains(&uuid)
    }
}

/// GATT client for one device
#[async_trait::async_trait]
pub trait GlassTransport: Send + Sync {
    /// Open the physical connection
    async fn connect(&self) -> Result<()>;

    /// Close the physical connection
    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// Discover services and their characteristics
    async fn discover_services(&self) -> Result<Vec<GattService>>;

    /// Write with response; returns once the device confirmed the write
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Enable notifications; packets arrive on the returned channel in order
    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>>;

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// One message per disconnect the transport observes
    async fn disconnect_events(&self) -> Result<mpsc::Receiver<()>>;
}

/// Device discovery and transport construction
#[async_trait::async_trait]
pub trait BleBackend: Send + Sync {
    /// Scan for `timeout` and return every device seen
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>>;

    /// Build a transport for a device. Does not connect.
    fn transport_for(&self, device: &DiscoveredDevice) -> Arc<dyn GlassTransport>;
}
