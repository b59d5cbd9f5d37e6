//! In-memory transport and back end for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::constants::{UART_RX_CHAR_UUID, UART_SERVICE_UUID, UART_TX_CHAR_UUID};
use crate::core::bluetooth::transport::{BleBackend, GattService, GlassTransport};
use crate::core::bluetooth::types::DiscoveredDevice;

pub struct MockTransport {
    services: Vec<GattService>,
    connected: AtomicBool,
    subscribed: AtomicBool,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    calls: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
    write_delay_ms: AtomicU64,
    /// Writes currently inside `write`, and the most ever seen at once
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    disconnect_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_characteristics(vec![UART_TX_CHAR_UUID, UART_RX_CHAR_UUID])
    }

    pub fn with_characteristics(characteristics: Vec<Uuid>) -> Arc<Self> {
        Self::with_services(vec![GattService {
            uuid: UART_SERVICE_UUID,
            characteristics,
        }])
    }

    pub fn without_uart_service() -> Arc<Self> {
        Self::with_services(vec![GattService {
            uuid: Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
            characteristics: vec![],
        }])
    }

    fn with_services(services: Vec<GattService>) -> Arc<Self> {
        Arc::new(Self {
            services,
            connected: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            write_delay_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            notify_tx: Mutex::new(None),
            disconnect_tx: Mutex::new(None),
        })
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make every later write take `delay` before it is recorded
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Writes other than heartbeats
    pub fn payload_writes(&self) -> Vec<Vec<u8>> {
        self.writes().into_iter().filter(|w| w.first() != Some(&0x25)).collect()
    }

    pub async fn push_notification(&self, data: Vec<u8>) {
        let tx = self.notify_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(data).await.unwrap();
        }
    }

    /// Simulate the device going out of range
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribed.store(false, Ordering::SeqCst);
        self.notify_tx.lock().unwrap().take();
        if let Some(tx) = self.disconnect_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl GlassTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.record_call();
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record_call();
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.disconnect_tx.lock().unwrap().take();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.record_call();
        self.connected.load(Ordering::SeqCst)
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        self.record_call();
        Ok(self.services.clone())
    }

    async fn write(&self, _characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.record_call();
        if self.fail_writes.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(anyhow!("write rejected"));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.writes.lock().unwrap().push(data.to_vec());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        self.record_call();
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(anyhow!("notify not permitted"));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.notify_tx.lock().unwrap() = Some(tx);
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        self.record_call();
        self.notify_tx.lock().unwrap().take();
        self.subscribed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect_events(&self) -> Result<mpsc::Receiver<()>> {
        self.record_call();
        let (tx, rx) = mpsc::channel(1);
        *self.disconnect_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

/// Back end with a fixed set of advertised devices
pub struct MockBackend {
    devices: Vec<DiscoveredDevice>,
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    fail_discover: AtomicBool,
}

impl MockBackend {
    pub fn new(devices: Vec<DiscoveredDevice>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            transports: Mutex::new(HashMap::new()),
            fail_discover: AtomicBool::new(false),
        })
    }

    pub fn fail_discover(&self, fail: bool) {
        self.fail_discover.store(fail, Ordering::SeqCst);
    }

    /// Transport for `address`, created on first use
    pub fn transport(&self, address: &str) -> Arc<MockTransport> {
        self.transports
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert_with(MockTransport::new)
            .clone()
    }
}

#[async_trait::async_trait]
impl BleBackend for MockBackend {
    async fn discover(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        if self.fail_discover.load(Ordering::SeqCst) {
            return Err(anyhow!("adapter powered off"));
        }
        Ok(self.devices.clone())
    }

    fn transport_for(&self, device: &DiscoveredDevice) -> Arc<dyn GlassTransport> {
        self.transport(&device.address)
    }
}
