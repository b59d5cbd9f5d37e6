//! One BLE session to one lens.
//!
//! A [`Link`] owns the lifecycle of a single device: connect and resolve the
//! UART characteristics, serialize writes, pump notifications into a handler,
//! keep the connection alive and notice when the device drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    ACK_QUEUE_DEPTH, DEFAULT_HEARTBEAT_SECS, UART_RX_CHAR_UUID, UART_SERVICE_UUID, UART_TX_CHAR_UUID,
};
use crate::core::bluetooth::heartbeat::HeartbeatKeeper;
use crate::core::bluetooth::notification::{
    process_notifications, NotificationHandler, SharedHandler,
};
use crate::core::bluetooth::transport::GlassTransport;
use crate::core::bluetooth::types::{AckOutcome, LinkStatus, SessionEvent, Side};
use crate::core::protocol::parser::{is_acknowledgment, to_hex};
use crate::error::ConnectionError;

/// UART characteristics resolved during connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCharacteristics {
    pub write: Uuid,
    pub notify: Uuid,
}

/// Hooks a coordinator installs to observe and revive the link
#[derive(Clone)]
pub(crate) struct Supervision {
    pub reconnect_tx: mpsc::UnboundedSender<Arc<Link>>,
    pub events: broadcast::Sender<SessionEvent>,
}

pub struct Link {
    name: String,
    address: String,
    side: Side,
    transport: Arc<dyn GlassTransport>,
    heartbeat_interval: Duration,

    /// Held for the duration of every write
    write_lock: Mutex<()>,
    /// Serializes connect and teardown
    lifecycle: Mutex<()>,

    connected: AtomicBool,
    subscribed: AtomicBool,
    /// Set by an explicit disconnect; stops automatic reconnection
    stay_disconnected: AtomicBool,

    characteristics: Mutex<Option<ResolvedCharacteristics>>,
    notification_handler: SharedHandler,
    heartbeat: Mutex<Option<HeartbeatKeeper>>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
    disconnect_watch: Mutex<Option<JoinHandle<()>>>,

    ack_tx: mpsc::Sender<Vec<u8>>,
    ack_rx: Mutex<mpsc::Receiver<Vec<u8>>>,

    supervision: OnceLock<Supervision>,
}

impl Link {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        side: Side,
        transport: Arc<dyn GlassTransport>,
    ) -> Self {
        let (ack_tx, ack_rx) = mpsc::channel(ACK_QUEUE_DEPTH);
        Self {
            name: name.into(),
            address: address.into(),
            side,
            transport,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            write_lock: Mutex::new(()),
            lifecycle: Mutex::new(()),
            connected: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            stay_disconnected: AtomicBool::new(false),
            characteristics: Mutex::new(None),
            notification_handler: Arc::new(RwLock::new(None)),
            heartbeat: Mutex::new(None),
            notification_task: Mutex::new(None),
            disconnect_watch: Mutex::new(None),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
            supervision: OnceLock::new(),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            present: true,
            connected: self.is_connected(),
            name: Some(self.name.clone()),
            address: Some(self.address.clone()),
        }
    }

    pub async fn characteristics(&self) -> Option<ResolvedCharacteristics> {
        *self.characteristics.lock().await
    }

    /// Install the inbound handler. Packets arriving after the call go to it,
    /// whether or not the link is connected.
    pub async fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.notification_handler.write().await = Some(handler);
    }

    pub(crate) fn attach_supervision(&self, supervision: Supervision) {
        if self.supervision.set(supervision).is_err() {
            debug!("{} is already supervised", self.name);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(supervision) = self.supervision.get() {
            // no receivers is fine
            let _ = supervision.events.send(event);
        }
    }

    /// Connect, discover the UART service and start notifications and heartbeat.
    ///
    /// On failure the partially opened session is torn down before the error
    /// is returned.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        self.stay_disconnected.store(false, Ordering::SeqCst);
        self.establish().await
    }

    /// Connect on behalf of the reconnect supervisor. Returns `Ok(false)`
    /// without touching the transport if an explicit disconnect happened since
    /// the drop.
    pub(crate) async fn reconnect(self: &Arc<Self>) -> Result<bool, ConnectionError> {
        if self.stay_disconnected.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.establish().await.map(|()| true)
    }

    pub(crate) fn reconnect_wanted(&self) -> bool {
        !self.stay_disconnected.load(Ordering::SeqCst) && !self.is_connected()
    }

    async fn establish(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            debug!("{} already connected", self.name);
            return Ok(());
        }

        info!("Connecting to {} ({})", self.name, self.address);
        match self.try_connect().await {
            Ok(()) => {
                info!("Connected to {}", self.name);
                self.emit(SessionEvent::Connected { side: self.side });
                Ok(())
            }
            Err(e) => {
                error!("Error connecting to {}: {}", self.name, e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn try_connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        self.transport.connect().await?;

        info!("Connection to {} open, discovering services...", self.name);
        let services = self.transport.discover_services().await?;
        let uart_service = services
            .iter()
            .find(|s| s.uuid == UART_SERVICE_UUID)
            .ok_or_else(|| {
                for service in &services {
                    debug!("Available service on {}: {}", self.name, service.uuid);
                }
                ConnectionError::ServiceNotFound {
                    device: self.name.clone(),
                    service: UART_SERVICE_UUID,
                }
            })?;

        for characteristic in [UART_TX_CHAR_UUID, UART_RX_CHAR_UUID] {
            if !uart_service.has_characteristic(characteristic) {
                return Err(ConnectionError::CharacteristicNotFound {
                    device: self.name.clone(),
                    characteristic,
                });
            }
        }

        *self.characteristics.lock().await = Some(ResolvedCharacteristics {
            write: UART_TX_CHAR_UUID,
            notify: UART_RX_CHAR_UUID,
        });
        self.connected.store(true, Ordering::SeqCst);

        self.start_notifications().await;
        self.watch_disconnects().await;
        self.start_heartbeat().await;
        Ok(())
    }

    /// Tear the session down. Safe to call on a link that is already down.
    pub async fn disconnect(&self) {
        self.stay_disconnected.store(true, Ordering::SeqCst);
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        if let Some(watch) = self.disconnect_watch.lock().await.take() {
            watch.abort();
        }

        self.stop_heartbeat().await;
        self.stop_notifications().await;

        if self.transport.is_connected().await {
            match self.transport.disconnect().await {
                Ok(()) => info!("Disconnected from {}", self.name),
                Err(e) => error!("Error disconnecting from {}: {}", self.name, e),
            }
        }

        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::Disconnected { side: self.side });
        }
    }

    /// Write `data` to the lens and wait for the confirmation.
    ///
    /// Returns false without touching the transport when the link is down,
    /// and false with a log entry when the write fails.
    pub async fn send(&self, data: &[u8]) -> bool {
        if !self.is_connected() {
            warn!("Cannot send data, {} is disconnected.", self.name);
            return false;
        }

        let Some(characteristics) = self.characteristics().await else {
            warn!("No TX characteristic available for {}.", self.name);
            return false;
        };

        let result = {
            let _write = self.write_lock.lock().await;
            self.transport.write(characteristics.write, data).await
        };

        match result {
            Ok(()) => {
                debug!("Data sent to {}: {}", self.name, to_hex(data));
                true
            }
            Err(e) => {
                error!("Error sending data to {}: {}", self.name, e);
                false
            }
        }
    }

    /// Wait for the next inbound packet and check whether it acknowledges.
    /// Expiry is logged, never an error.
    pub async fn wait_for_ack(&self, timeout: Duration) -> AckOutcome {
        let mut queue = self.ack_rx.lock().await;
        match tokio::time::timeout(timeout, queue.recv()).await {
            Ok(Some(data)) if is_acknowledgment(&data) => {
                info!("Acknowledgment received from {}", self.name);
                AckOutcome::Acknowledged
            }
            Ok(Some(data)) => {
                warn!("Unexpected data from {}: {}", self.name, to_hex(&data));
                AckOutcome::Unexpected(data)
            }
            Ok(None) | Err(_) => {
                warn!("Timeout waiting for acknowledgment from {}", self.name);
                AckOutcome::TimedOut
            }
        }
    }

    /// Drop inbound packets queued for acknowledgment waits
    pub async fn clear_ack_queue(&self) -> usize {
        let mut queue = self.ack_rx.lock().await;
        let mut dropped = 0;
        while queue.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    async fn start_notifications(&self) {
        if self.subscribed.load(Ordering::SeqCst) {
            return;
        }
        let Some(characteristics) = self.characteristics().await else {
            return;
        };

        match self.transport.subscribe(characteristics.notify).await {
            Ok(notifications) => {
                let task = tokio::spawn(process_notifications(
                    self.name.clone(),
                    notifications,
                    self.ack_tx.clone(),
                    self.notification_handler.clone(),
                ));
                if let Some(old) = self.notification_task.lock().await.replace(task) {
                    old.abort();
                }
                self.subscribed.store(true, Ordering::SeqCst);
                info!("Notifications started for {}", self.name);
            }
            Err(e) => error!("Failed to start notifications for {}: {}", self.name, e),
        }
    }

    async fn stop_notifications(&self) {
        if let Some(task) = self.notification_task.lock().await.take() {
            task.abort();
        }

        if self.subscribed.swap(false, Ordering::SeqCst) {
            if let Some(characteristics) = self.characteristics().await {
                match self.transport.unsubscribe(characteristics.notify).await {
                    Ok(()) => info!("Stopped notifications for {}", self.name),
                    Err(e) => warn!("Failed to stop notifications for {}: {}", self.name, e),
                }
            }
        }
    }

    async fn start_heartbeat(self: &Arc<Self>) {
        let mut heartbeat = self.heartbeat.lock().await;
        if heartbeat.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *heartbeat = Some(HeartbeatKeeper::start(
            Arc::downgrade(self),
            self.heartbeat_interval,
        ));
    }

    async fn stop_heartbeat(&self) {
        let keeper = self.heartbeat.lock().await.take();
        if let Some(keeper) = keeper {
            keeper.stop().await;
        }
    }

    async fn watch_disconnects(self: &Arc<Self>) {
        let mut events = match self.transport.disconnect_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Disconnect detection unavailable for {}: {}", self.name, e);
                return;
            }
        };

        let link = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            if events.recv().await.is_some() {
                if let Some(link) = link.upgrade() {
                    link.handle_disconnection().await;
                }
            }
        });

        if let Some(old) = self.disconnect_watch.lock().await.replace(task) {
            old.abort();
        }
    }

    /// The device went away without being asked to.
    async fn handle_disconnection(self: Arc<Self>) {
        if self.stay_disconnected.load(Ordering::SeqCst) {
            return;
        }
        warn!("Device {} disconnected", self.name);

        {
            let _lifecycle = self.lifecycle.lock().await;
            if !self.connected.swap(false, Ordering::SeqCst) {
                return;
            }
            self.stop_heartbeat().await;
            if let Some(task) = self.notification_task.lock().await.take() {
                task.abort();
            }
            self.subscribed.store(false, Ordering::SeqCst);
        }
        self.emit(SessionEvent::Disconnected { side: self.side });

        match self.supervision.get() {
            Some(supervision) => {
                if supervision.reconnect_tx.send(self.clone()).is_err() {
                    warn!("Reconnect supervisor is gone, {} stays disconnected", self.name);
                }
            }
            None => warn!("No reconnect supervisor for {}, staying disconnected", self.name),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("side", &self.side)
            .field("connected", &self.is_connected())
            .finish()
    }
}
