//! Glasses manager for the bridge
//! Owns the left and right Links and provides the aggregate connect,
//! disconnect and status operations over them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{error, info, warn};
use tokio::sync::{broadcast, Mutex};

use crate::config::glasses_config::{ConnectPolicy, GlassesConfig};
use crate::core::bluetooth::constants::EVENT_CHANNEL_DEPTH;
use crate::core::bluetooth::link::{Link, Supervision};
use crate::core::bluetooth::notification::{DiagnosticsHandler, NotificationHandler};
use crate::core::bluetooth::reconnect::ReconnectSupervisor;
use crate::core::bluetooth::transport::BleBackend;
use crate::core::bluetooth::types::{ConnectionStatus, DiscoveredDevice, LinkStatus, SessionEvent, Side};
use crate::error::{GlassesError, Result};

/// Coordinates the two lenses of one pair of glasses
pub struct GlassesManager {
    backend: Arc<dyn BleBackend>,
    config: GlassesConfig,
    left: Mutex<Option<Arc<Link>>>,
    right: Mutex<Option<Arc<Link>>>,
    /// Runs reconnection after unsolicited drops
    supervisor: ReconnectSupervisor,
    events: broadcast::Sender<SessionEvent>,
    notification_handler: Mutex<Arc<dyn NotificationHandler>>,
}

impl GlassesManager {
    /// Creates a manager. Sides with a configured address get a Link right
    /// away; they are connected by the next `scan_and_connect`.
    pub async fn new(backend: Arc<dyn BleBackend>, config: GlassesConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);
        let supervisor = ReconnectSupervisor::spawn(config.reconnect.clone(), events.clone());

        let manager = Self {
            backend,
            config,
            left: Mutex::new(None),
            right: Mutex::new(None),
            supervisor,
            events,
            notification_handler: Mutex::new(Arc::new(DiagnosticsHandler)),
        };

        for side in Side::BOTH {
            if let Some(address) = manager.config.address(side) {
                let device = DiscoveredDevice::new(manager.config.name(side), address);
                let link = manager.build_link(&device, side).await;
                info!("Using configured {} glass {} ({})", side, link.name(), link.address());
                *manager.slot(side).lock().await = Some(link);
            }
        }

        Ok(manager)
    }

    pub fn config(&self) -> &GlassesConfig {
        &self.config
    }

    fn slot(&self, side: Side) -> &Mutex<Option<Arc<Link>>> {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    async fn build_link(&self, device: &DiscoveredDevice, side: Side) -> Arc<Link> {
        let transport = self.backend.transport_for(device);
        let link = Arc::new(
            Link::new(device.name.clone(), device.address.clone(), side, transport)
                .with_heartbeat_interval(self.config.heartbeat_interval()),
        );
        link.attach_supervision(Supervision {
            reconnect_tx: self.supervisor.requester(),
            events: self.events.clone(),
        });
        let handler = self.notification_handler.lock().await.clone();
        link.set_notification_handler(handler).await;
        link
    }

    /// Replace the inbound handler for both sides, connected or not
    pub async fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.notification_handler.lock().await = handler.clone();
        for side in Side::BOTH {
            if let Some(link) = self.link(side).await {
                link.set_notification_handler(handler.clone()).await;
            }
        }
    }

    pub async fn link(&self, side: Side) -> Option<Arc<Link>> {
        self.slot(side).lock().await.clone()
    }

    async fn holds_address(&self, address: &str) -> bool {
        for side in Side::BOTH {
            if self.link(side).await.is_some_and(|l| l.address() == address) {
                return true;
            }
        }
        false
    }

    /// Both Links, or the first missing side
    pub async fn links(&self) -> Result<(Arc<Link>, Arc<Link>)> {
        let left = self.link(Side::Left).await.ok_or(GlassesError::MissingLink(Side::Left))?;
        let right = self.link(Side::Right).await.ok_or(GlassesError::MissingLink(Side::Right))?;
        Ok((left, right))
    }

    /// Discover devices, assign sides by name marker and connect every Link concurrently.
    ///
    /// Returns false when no connect was launched. Otherwise the configured
    /// [`ConnectPolicy`] decides whether one failed side fails the whole call.
    pub async fn scan_and_connect(&self, timeout: Duration) -> bool {
        info!("Scanning for glasses...");
        match self.backend.discover(timeout).await {
            Ok(devices) => {
                for device in &devices {
                    if self.holds_address(&device.address).await {
                        continue;
                    }
                    // a name with both markers falls through to the free side
                    for side in Side::BOTH {
                        if !device.has_marker(self.config.marker(side)) {
                            continue;
                        }
                        let mut slot = self.slot(side).lock().await;
                        if slot.is_none() {
                            info!("Found {} glass: {} ({})", side, device.name, device.address);
                            *slot = Some(self.build_link(device, side).await);
                            break;
                        }
                    }
                }
            }
            Err(e) => error!("Bluetooth scan failed: {}", e),
        }

        let mut links = Vec::new();
        for side in Side::BOTH {
            if let Some(link) = self.link(side).await {
                links.push(link);
            }
        }

        if links.is_empty() {
            warn!("No glasses found or configured");
            return false;
        }

        let results = join_all(links.iter().map(|link| link.connect())).await;

        let mut succeeded = 0;
        for (link, result) in links.iter().zip(&results) {
            match result {
                Ok(()) => succeeded += 1,
                Err(e) => error!("Failed to connect {} glass {}: {}", link.side(), link.name(), e),
            }
        }

        match self.config.connect_policy {
            ConnectPolicy::RequireAll => succeeded == results.len(),
            ConnectPolicy::AnySide => succeeded > 0,
        }
    }

    /// Attach the device at `address` to `side` and connect it.
    ///
    /// A Link already on that side for a different address is disconnected
    /// and replaced.
    pub async fn connect_side(&self, side: Side, address: &str, name: &str) -> Result<()> {
        let link = {
            let mut slot = self.slot(side).lock().await;
            match slot.clone() {
                Some(existing) if existing.address() == address => existing,
                existing => {
                    if let Some(old) = existing {
                        info!("Replacing {} glass {}", side, old.name());
                        self.supervisor.cancel(side).await;
                        old.disconnect().await;
                    }
                    let link = self.build_link(&DiscoveredDevice::new(name, address), side).await;
                    *slot = Some(link.clone());
                    link
                }
            }
        };

        link.connect().await?;
        Ok(())
    }

    /// Disconnect every connected Link concurrently and stop pending reconnects
    pub async fn disconnect_all(&self) {
        self.supervisor.cancel_all().await;

        let mut links = Vec::new();
        for side in Side::BOTH {
            if let Some(link) = self.link(side).await.filter(|l| l.is_connected()) {
                links.push(link);
            }
        }
        if links.is_empty() {
            info!("No glasses connected");
            return;
        }

        join_all(links.iter().map(|link| link.disconnect())).await;
        info!("Disconnected from glasses");
    }

    /// Disconnect and stop the reconnect supervisor
    pub async fn shutdown(&self) {
        self.disconnect_all().await;
        self.supervisor.shutdown().await;
    }

    pub async fn status(&self) -> ConnectionStatus {
        let side_status = |link: Option<Arc<Link>>| link.map(|l| l.status()).unwrap_or_default();
        ConnectionStatus {
            left: side_status(self.link(Side::Left).await),
            right: side_status(self.link(Side::Right).await),
        }
    }

    /// True if at least one side is connected
    pub async fn is_connected(&self) -> bool {
        let status = self.status().await;
        status.left.connected || status.right.connected
    }

    pub async fn is_fully_connected(&self) -> bool {
        let status = self.status().await;
        status.left.connected && status.right.connected
    }

    /// True while the supervisor is retrying `side`
    pub async fn is_reconnecting(&self, side: Side) -> bool {
        self.supervisor.is_reconnecting(side).await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Send the same bytes to both sides concurrently. True only if both writes succeed.
    pub async fn send_to_both(&self, data: &[u8]) -> Result<bool> {
        let (left, right) = self.links().await?;
        let (left_ok, right_ok) = tokio::join!(left.send(data), right.send(data));
        Ok(left_ok && right_ok)
    }

    pub async fn side_status(&self, side: Side) -> LinkStatus {
        self.status().await.side(side).clone()
    }
}
