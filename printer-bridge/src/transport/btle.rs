//! btleplug-backed GATT link and printer discovery
//!
//! Compiled with the `ble` feature only; it needs the platform Bluetooth
//! stack (BlueZ, CoreBluetooth, WinRT).

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::ble::{GattCharacteristic, GattLink, is_printer_name};
use super::TransportEvents;
use crate::error::{TransportError, TransportResult};

/// Upper bound for finding a known peripheral again before connecting
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(4);
const DISCOVERY_POLL: Duration = Duration::from_millis(200);

/// Printer found by [`scan_printers`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPrinter {
    /// Bluetooth address, used as the device id
    pub device_id: String,
    pub device_name: String,
}

fn ble_err(e: btleplug::Error) -> TransportError {
    TransportError::Connection(e.to_string())
}

async fn first_adapter() -> TransportResult<Adapter> {
    let manager = Manager::new().await.map_err(ble_err)?;
    manager
        .adapters()
        .await
        .map_err(ble_err)?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::DeviceNotFound("no Bluetooth adapter".to_string()))
}

/// Scan for `duration` and list peripherals that look like printers
pub async fn scan_printers(duration: Duration) -> TransportResult<Vec<DiscoveredPrinter>> {
    let adapter = first_adapter().await?;
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(ble_err)?;
    tokio::time::sleep(duration).await;
    let _ = adapter.stop_scan().await;

    let mut found: Vec<DiscoveredPrinter> = Vec::new();
    for peripheral in adapter.peripherals().await.map_err(ble_err)? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let Some(name) = props.local_name else {
            continue;
        };
        if !is_printer_name(&name) {
            continue;
        }
        let device_id = props.address.to_string();
        if found.iter().all(|p| p.device_id != device_id) {
            found.push(DiscoveredPrinter {
                device_id,
                device_name: name,
            });
        }
    }

    tracing::info!(count = found.len(), "BLE printer scan finished");
    Ok(found)
}

/// Stored as soon as a connect is issued, so `close` can always reach it
struct Session {
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
    watcher: Option<JoinHandle<()>>,
}

/// GATT link to one printer, addressed by Bluetooth address
pub struct BtleLink {
    device_id: String,
    device_name: Option<String>,
    session: Mutex<Option<Session>>,
}

impl BtleLink {
    pub fn new(device_id: impl Into<String>, device_name: Option<&str>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.map(str::to_string),
            session: Mutex::new(None),
        }
    }

    fn matches(&self, address: &str, name: Option<&str>) -> bool {
        address.eq_ignore_ascii_case(&self.device_id)
            || (self.device_id.is_empty() && name.is_some() && name == self.device_name.as_deref())
    }

    async fn find(&self, adapter: &Adapter) -> TransportResult<Peripheral> {
        if let Some(p) = self.find_known(adapter).await? {
            return Ok(p);
        }

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_err)?;
        let deadline = tokio::time::Instant::now() + DISCOVERY_TIMEOUT;
        let found = loop {
            if let Some(p) = self.find_known(adapter).await? {
                break Some(p);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(DISCOVERY_POLL).await;
        };
        let _ = adapter.stop_scan().await;

        found.ok_or_else(|| TransportError::DeviceNotFound(self.device_id.clone()))
    }

    async fn find_known(&self, adapter: &Adapter) -> TransportResult<Option<Peripheral>> {
        for peripheral in adapter.peripherals().await.map_err(ble_err)? {
            let props = peripheral.properties().await.ok().flatten();
            let address = peripheral.address().to_string();
            let name = props.and_then(|p| p.local_name);
            if self.matches(&address, name.as_deref()) {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl GattLink for BtleLink {
    fn name(&self) -> String {
        match &self.device_name {
            Some(name) => format!("{} ({})", name, self.device_id),
            None => self.device_id.clone(),
        }
    }

    async fn open(&self, events: TransportEvents) -> TransportResult<Vec<GattCharacteristic>> {
        self.close().await;

        let adapter = first_adapter().await?;
        let peripheral = self.find(&adapter).await?;
        *self.session.lock().await = Some(Session {
            peripheral: peripheral.clone(),
            characteristics: Vec::new(),
            watcher: None,
        });
        peripheral.connect().await.map_err(ble_err)?;
        peripheral.discover_services().await.map_err(ble_err)?;

        let characteristics: Vec<Characteristic> =
            peripheral.characteristics().into_iter().collect();
        let listed = characteristics
            .iter()
            .map(|c| GattCharacteristic {
                service: c.service_uuid,
                uuid: c.uuid,
                writable: c
                    .properties
                    .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
            })
            .collect();

        // Report link loss for this peripheral through the event sink
        let id = peripheral.id();
        let mut adapter_events = adapter.events().await.map_err(ble_err)?;
        let watcher = tokio::spawn(async move {
            while let Some(event) = adapter_events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event
                    && gone == id
                {
                    events.disconnected("BLE link lost");
                    break;
                }
            }
        });

        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            // Closed while discovery was running
            watcher.abort();
            return Err(TransportError::NotConnected);
        };
        session.characteristics = characteristics;
        session.watcher = Some(watcher);
        Ok(listed)
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
    ) -> TransportResult<()> {
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or(TransportError::NotConnected)?;
        let target = session
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or_else(|| TransportError::NoWritableCharacteristic(self.name()))?;

        let write_type = if target
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        session
            .peripheral
            .write(target, data, write_type)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            if let Some(watcher) = session.watcher {
                watcher.abort();
            }
            if let Err(e) = session.peripheral.disconnect().await {
                tracing::debug!(error = %e, "BLE disconnect failed");
            }
        }
    }
}
