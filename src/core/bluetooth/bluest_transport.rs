//! Bluetooth connection handling for the G1 lenses
//! [`GlassTransport`] implementation on top of bluest.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, ConnectionEvent, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::core::bluetooth::constants::{BLUETOOTH_OPERATION_TIMEOUT_SECS, NOTIFICATION_CHANNEL_DEPTH};
use crate::core::bluetooth::scanner::{BluestBackend, DeviceMap};
use crate::core::bluetooth::transport::{GattService, GlassTransport};

/// Device handle and the characteristics found on it
struct ConnectedDeviceState {
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
}

pub struct BluestTransport {
    adapter: Adapter,
    address: String,
    devices: DeviceMap,
    state: Mutex<Option<ConnectedDeviceState>>,
    notify_tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, address: String, devices: DeviceMap) -> Self {
        Self {
            adapter,
            address,
            devices,
            state: Mutex::new(None),
            notify_tasks: Mutex::new(HashMap::new()),
            connection_task: Mutex::new(None),
        }
    }

    async fn device(&self) -> Result<Device> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|state| state.device.clone())
            .ok_or_else(|| anyhow!("Device {} is not connected", self.address))
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| anyhow!("Device {} is not connected", self.address))?;
        state
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| anyhow!("Characteristic {} not discovered on {}", uuid, self.address))
    }

    async fn stop_tasks(&self) {
        for (_, task) in self.notify_tasks.lock().await.drain() {
            task.abort();
        }
        if let Some(task) = self.connection_task.lock().await.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl GlassTransport for BluestTransport {
    async fn connect(&self) -> Result<()> {
        let device = BluestBackend::find_device(
            &self.adapter,
            &self.devices,
            &self.address,
            Duration::from_secs(BLUETOOTH_OPERATION_TIMEOUT_SECS),
        )
        .await?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", self.address);
            tokio::time::timeout(
                Duration::from_secs(BLUETOOTH_OPERATION_TIMEOUT_SECS),
                self.adapter.connect_device(&device),
            )
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}", self.address))??;
        }

        *self.state.lock().await = Some(ConnectedDeviceState {
            device,
            characteristics: HashMap::new(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_tasks().await;

        let state = self.state.lock().await.take();
        match state {
            Some(state) if state.device.is_connected().await => {
                info!("Disconnecting from device {}", state.device.id());
                self.adapter.disconnect_device(&state.device).await?;
                info!("Successfully disconnected");
            }
            Some(state) => info!("Device {} not connected", state.device.id()),
            None => debug!("No device state for {}", self.address),
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match self.device().await {
            Ok(device) => device.is_connected().await,
            Err(_) => false,
        }
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        let device = self.device().await?;

        let mut services = Vec::new();
        let mut characteristics = HashMap::new();
        for service in device.discover_services().await? {
            let mut uuids = Vec::new();
            for characteristic in service.discover_characteristics().await? {
                debug!("Service {} has characteristic {}", service.uuid(), characteristic.uuid());
                uuids.push(characteristic.uuid());
                characteristics.insert(characteristic.uuid(), characteristic);
            }
            services.push(GattService {
                uuid: service.uuid(),
                characteristics: uuids,
            });
        }

        if let Some(state) = self.state.lock().await.as_mut() {
            state.characteristics = characteristics;
        }
        Ok(services)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(characteristic).await?;
        characteristic.write(data).await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        let notify_char = self.characteristic(characteristic).await?;
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();
        let address = self.address.clone();

        // the notify stream borrows the characteristic, so it lives in its own task
        let task = tokio::spawn(async move {
            let mut stream = match notify_char.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow!(e)));
                    return;
                }
            };

            while let Some(result) = stream.next().await {
                match result {
                    Ok(value) => {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error in notification stream from {}: {}", address, e);
                        break;
                    }
                }
            }
            info!("Notification stream from {} ended", address);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                if let Some(old) = self.notify_tasks.lock().await.insert(characteristic, task) {
                    old.abort();
                }
                Ok(rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("Notification task for {} ended before subscribing", self.address)),
        }
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        if let Some(task) = self.notify_tasks.lock().await.remove(&characteristic) {
            task.abort();
        }
        Ok(())
    }

    async fn disconnect_events(&self) -> Result<mpsc::Receiver<()>> {
        let device = self.device().await?;
        let adapter = self.adapter.clone();
        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut events = match adapter.device_connection_events(&device).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot watch connection events for {}: {}", device.id(), e);
                    return;
                }
            };
            while let Some(event) = events.next().await {
                if matches!(event, ConnectionEvent::Disconnected) {
                    let _ = tx.send(()).await;
                    break;
                }
            }
        });

        if let Some(old) = self.connection_task.lock().await.replace(task) {
            old.abort();
        }
        Ok(rx)
    }
}
