//! Printer service - registry, live connections and dispatch
//!
//! Constructed once by the application root and passed to whatever needs
//! to print. Cloning shares the same state.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use receipt_printer::compile_job;
use shared::models::{
    BlePairing, DispatchResult, PrintJob, PrinterConfig, PrinterDevice, PrinterRole,
    PrinterStatus, PrinterTransport,
};
use thiserror::Error;
use tokio::sync::watch;

use crate::connection::{ConnectionHandle, ConnectionSettings};
use crate::dispatch::{self, ConnectionLookup};
use crate::error::{PrintError, TransportError};
use crate::registry::{PrinterRegistry, RegistryError};
use crate::storage::{PrinterStorage, StorageError};
use crate::transport::{DefaultTransportFactory, TransportFactory};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device {0} is inactive")]
    Inactive(String),

    /// Missing address or transport not available; nothing was attempted
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Print(#[from] PrintError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

struct Inner {
    storage: PrinterStorage,
    registry: RwLock<PrinterRegistry>,
    config: RwLock<PrinterConfig>,
    connections: DashMap<String, ConnectionHandle>,
    factory: Arc<dyn TransportFactory>,
}

/// Printer service
///
/// Responsibilities:
/// - Keep the device registry and bridge settings in storage
/// - Own one connection worker per device
/// - Fan print jobs out by role
#[derive(Clone)]
pub struct PrintService {
    inner: Arc<Inner>,
}

impl PrintService {
    pub fn new(storage: PrinterStorage, factory: Arc<dyn TransportFactory>) -> ServiceResult<Self> {
        let config = storage.load_config()?.unwrap_or_default();
        let registry = PrinterRegistry::load(storage.clone())?;
        tracing::info!(
            devices = registry.len(),
            bridge_host = ?config.bridge_host,
            bridge_port = config.bridge_port,
            "Printer service ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                storage,
                registry: RwLock::new(registry),
                config: RwLock::new(config),
                connections: DashMap::new(),
                factory,
            }),
        })
    }

    /// WebSocket bridge and (with the `ble` feature) Bluetooth LE
    pub fn with_default_transports(storage: PrinterStorage) -> ServiceResult<Self> {
        Self::new(storage, Arc::new(DefaultTransportFactory))
    }

    // ========== Configuration ==========

    pub fn config(&self) -> PrinterConfig {
        self.inner.config.read().clone()
    }

    /// Persist new bridge settings. Connections created afterwards use them.
    pub fn update_config(&self, config: PrinterConfig) -> ServiceResult<()> {
        self.inner.storage.save_config(&config)?;
        *self.inner.config.write() = config;
        Ok(())
    }

    pub fn pairing(&self) -> ServiceResult<Option<BlePairing>> {
        Ok(self.inner.storage.load_pairing()?)
    }

    // ========== Registry ==========

    pub fn devices(&self) -> Vec<PrinterDevice> {
        self.inner.registry.read().list()
    }

    pub fn device(&self, id: &str) -> Option<PrinterDevice> {
        self.inner.registry.read().get(id).cloned()
    }

    /// Add or replace a device
    ///
    /// The live connection for the id is detached in the same registry
    /// write as the change and shut down before this returns; an active
    /// device is then connected afresh.
    pub async fn upsert_device(&self, device: PrinterDevice) -> ServiceResult<()> {
        device
            .validate()
            .map_err(|e| ServiceError::Registry(e.into()))?;

        let active = device.active;
        let id = device.id.clone();
        let previous = {
            let mut registry = self.inner.registry.write();
            registry.upsert(device)?;
            self.detach(&id)
        };
        self.teardown(&id, previous).await;
        tracing::info!(device_id = %id, active, "Printer saved");

        if active {
            self.spawn_connect(id);
        }
        Ok(())
    }

    /// Delete a device and force its connection down
    pub async fn remove_device(&self, id: &str) -> ServiceResult<PrinterDevice> {
        let (removed, previous) = {
            let mut registry = self.inner.registry.write();
            if !registry.contains(id) {
                return Err(ServiceError::DeviceNotFound(id.to_string()));
            }
            let removed = registry.remove(id)?;
            (removed, self.detach(id))
        };
        self.teardown(id, previous).await;
        tracing::info!(device_id = %id, "Printer removed");
        Ok(removed)
    }

    // ========== Connections ==========

    /// Connect every active device in the background
    pub fn start(&self) -> usize {
        let ids: Vec<String> = self
            .devices()
            .into_iter()
            .filter(|d| d.active)
            .map(|d| d.id)
            .collect();
        let count = ids.len();
        for id in ids {
            self.spawn_connect(id);
        }
        tracing::info!(count, "Connecting active printers");
        count
    }

    /// Connect one device and wait for the outcome
    ///
    /// On success the bridge address or the BLE pairing is remembered.
    pub async fn connect(&self, id: &str) -> ServiceResult<()> {
        let (device, handle) = self.ensure_connection(id, true)?;
        handle.connect().await?;
        self.remember_link(&device)?;
        Ok(())
    }

    /// Disconnect one device; it stays disconnected until `connect`
    pub async fn disconnect(&self, id: &str) {
        let handle = self.inner.connections.get(id).map(|h| h.clone());
        if let Some(handle) = handle {
            handle.disconnect().await;
        }
    }

    pub fn status(&self, id: &str) -> PrinterStatus {
        self.inner
            .connections
            .get(id)
            .map(|h| h.status())
            .unwrap_or_else(|| PrinterStatus::disconnected(id))
    }

    /// Status of every registered device, in registry order
    pub fn statuses(&self) -> Vec<PrinterStatus> {
        self.devices().iter().map(|d| self.status(&d.id)).collect()
    }

    /// Status stream of one device; the current status arrives first
    pub fn subscribe(&self, id: &str) -> ServiceResult<watch::Receiver<PrinterStatus>> {
        let (_, handle) = self.ensure_connection(id, false)?;
        Ok(handle.subscribe())
    }

    /// Current device and its worker, created on first use
    ///
    /// Runs under the registry read lock, so a worker is never created for
    /// a device that an edit or removal has already replaced.
    fn ensure_connection(
        &self,
        id: &str,
        require_active: bool,
    ) -> ServiceResult<(PrinterDevice, ConnectionHandle)> {
        let config = self.config();
        let registry = self.inner.registry.read();
        let device = registry
            .get(id)
            .ok_or_else(|| ServiceError::DeviceNotFound(id.to_string()))?;
        if require_active && !device.active {
            return Err(ServiceError::Inactive(id.to_string()));
        }

        let handle = match self.inner.connections.entry(device.id.clone()) {
            Entry::Occupied(entry) if !entry.get().is_stopped() => entry.get().clone(),
            entry => {
                // Configuration errors fail here, before any attempt
                let transport = self.inner.factory.create(device, &config)?;
                tracing::debug!(
                    device_id = %device.id,
                    target_addr = %transport.describe(),
                    "Creating connection"
                );
                let handle = ConnectionHandle::spawn(
                    device.id.clone(),
                    transport,
                    ConnectionSettings::from_config(&config),
                );
                entry.insert(handle.clone());
                handle
            }
        };
        Ok((device.clone(), handle))
    }

    fn spawn_connect(&self, id: String) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.connect(&id).await {
                tracing::warn!(device_id = %id, error = %e, "Initial connect failed");
            }
        });
    }

    fn remember_link(&self, device: &PrinterDevice) -> ServiceResult<()> {
        match &device.transport {
            PrinterTransport::Bridge { host, port } => {
                let mut config = self.config();
                let Some((host, port)) = config.resolve_bridge(host.as_deref(), *port) else {
                    return Ok(());
                };
                if config.bridge_host.as_deref() == Some(host.as_str())
                    && config.bridge_port == port
                {
                    return Ok(());
                }
                config.bridge_host = Some(host);
                config.bridge_port = port;
                self.update_config(config)
            }
            PrinterTransport::Wireless {
                device_id,
                device_name,
            } => {
                let pairing = BlePairing {
                    device_id: device_id.clone(),
                    device_name: device_name.clone().unwrap_or_else(|| device.name.clone()),
                };
                self.inner.storage.save_pairing(&pairing)?;
                Ok(())
            }
        }
    }

    /// Take the worker out of the map; callers hold the registry write lock
    fn detach(&self, id: &str) -> Option<ConnectionHandle> {
        self.inner.connections.remove(id).map(|(_, handle)| handle)
    }

    async fn teardown(&self, id: &str, handle: Option<ConnectionHandle>) {
        if let Some(handle) = handle {
            tracing::debug!(device_id = %id, "Tearing down connection");
            handle.shutdown().await;
        }
    }

    // ========== Printing ==========

    /// Print on every active device with `role`; see [`dispatch::print_by_role`]
    pub async fn print_by_role(&self, role: PrinterRole, job: &PrintJob) -> Vec<DispatchResult> {
        let devices = self.devices();
        dispatch::print_by_role(role, job, &devices, self).await
    }

    /// Print one copy on one device
    pub async fn print(&self, id: &str, job: &PrintJob) -> ServiceResult<DispatchResult> {
        let device = self
            .device(id)
            .ok_or_else(|| ServiceError::DeviceNotFound(id.to_string()))?;

        let compiled = Arc::new(compile_job(job, device.paper_width, device.charset));
        let outcome = match self.connection(id) {
            Some(handle) => handle.print(compiled).await,
            None => Err(PrintError::NoConnection(id.to_string())),
        };
        Ok(match outcome {
            Ok(()) => DispatchResult::ok(id, 1),
            Err(e) => {
                tracing::warn!(device_id = %id, error = %e, "Print failed");
                DispatchResult::failed(id, 1, e.to_string())
            }
        })
    }

    /// Print the diagnostic page on one device
    pub async fn print_test(&self, id: &str) -> ServiceResult<DispatchResult> {
        let device = self
            .device(id)
            .ok_or_else(|| ServiceError::DeviceNotFound(id.to_string()))?;
        self.print(id, &dispatch::diagnostic_job(&device)).await
    }

    /// Stop every connection worker
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let handles: Vec<ConnectionHandle> = ids
            .iter()
            .filter_map(|id| self.inner.connections.remove(id).map(|(_, h)| h))
            .collect();

        futures::future::join_all(handles.iter().map(|h| h.shutdown())).await;
        tracing::info!(count = handles.len(), "Printer connections closed");
    }
}

impl ConnectionLookup for PrintService {
    fn connection(&self, device_id: &str) -> Option<ConnectionHandle> {
        self.inner.connections.get(device_id).map(|h| h.clone())
    }
}
