//! Device discovery over bluest
//! Scans advertisements, remembers the devices it saw and hands out
//! [`BluestTransport`]s for them.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use regex::Regex;
use tokio::sync::Mutex;

use crate::core::bluetooth::bluest_transport::BluestTransport;
use crate::core::bluetooth::transport::{BleBackend, GlassTransport};
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::error::ConnectionError;

static MAC_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok());

/// Devices seen so far, keyed by address
pub type DeviceMap = Arc<Mutex<HashMap<String, Device>>>;

pub struct BluestBackend {
    adapter: Adapter,
    devices: DeviceMap,
}

impl BluestBackend {
    /// Open the default adapter and wait until it is powered
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or(ConnectionError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn internal_scan_task(
        adapter: &Adapter,
        devices: &DeviceMap,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        let mut found: Vec<DiscoveredDevice> = Vec::new();

        // already connected lenses do not advertise
        for device in adapter.connected_devices().await? {
            let discovered = Self::remember(devices, &device, None).await;
            found.push(discovered);
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(advertising) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", advertising.device, advertising.rssi);
                            let discovered = Self::remember(
                                devices,
                                &advertising.device,
                                advertising.adv_data.local_name.clone(),
                            ).await;
                            if !found.iter().any(|d| d.address == discovered.address) {
                                found.push(discovered);
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => break,
            }
        }

        info!("Scan finished, {} devices found", found.len());
        Ok(found)
    }

    async fn remember(devices: &DeviceMap, device: &Device, local_name: Option<String>) -> DiscoveredDevice {
        let name = local_name
            .or_else(|| device.name().ok())
            .unwrap_or_else(|| "Unknown".to_string());
        let address = device_address(device);
        info!("Found device: {}, Address: {}", name, address);

        devices.lock().await.insert(address.clone(), device.clone());
        DiscoveredDevice::new(name, address)
    }

    /// Look `address` up among known, connected and advertising devices
    pub(crate) async fn find_device(
        adapter: &Adapter,
        devices: &DeviceMap,
        address: &str,
        timeout: Duration,
    ) -> Result<Device> {
        if let Some(device) = devices.lock().await.get(address).cloned() {
            return Ok(device);
        }

        for device in adapter.connected_devices().await? {
            if device_address(&device) == address {
                devices.lock().await.insert(address.to_string(), device.clone());
                return Ok(device);
            }
        }

        info!("Device {} not seen yet, scanning for it", address);
        let mut scan_stream = adapter.scan(&[]).await?;
        let search = async {
            while let Some(advertising) = scan_stream.next().await {
                if device_address(&advertising.device) == address {
                    return Some(advertising.device);
                }
            }
            None
        };

        match tokio::time::timeout(timeout, search).await {
            Ok(Some(device)) => {
                devices.lock().await.insert(address.to_string(), device.clone());
                Ok(device)
            }
            _ => Err(anyhow!(ConnectionError::DeviceNotFound(address.to_string()))),
        }
    }
}

#[async_trait::async_trait]
impl BleBackend for BluestBackend {
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        Self::internal_scan_task(&self.adapter, &self.devices, timeout).await
    }

    fn transport_for(&self, device: &DiscoveredDevice) -> Arc<dyn GlassTransport> {
        Arc::new(BluestTransport::new(
            self.adapter.clone(),
            device.address.clone(),
            self.devices.clone(),
        ))
    }
}

/// MAC address embedded in the platform id, or the id itself
pub fn device_address(device: &Device) -> String {
    let id = device.id().to_string();
    extract_mac_address(&id).unwrap_or(id)
}

pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
    MAC_ADDRESS
        .as_ref()?
        .find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}
