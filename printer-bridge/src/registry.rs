//! Device registry
//!
//! In-memory view of the configured printers, written through to
//! [`PrinterStorage`] on every edit.

use std::collections::BTreeMap;

use shared::models::{DeviceValidationError, PrinterDevice};
use thiserror::Error;

use crate::storage::{PrinterStorage, StorageError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid device: {0}")]
    Invalid(#[from] DeviceValidationError),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

pub struct PrinterRegistry {
    storage: PrinterStorage,
    devices: BTreeMap<String, PrinterDevice>,
}

impl PrinterRegistry {
    /// Load all stored devices
    pub fn load(storage: PrinterStorage) -> RegistryResult<Self> {
        let devices = storage
            .list_devices()?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(count = devices.len(), "Printer registry loaded");
        Ok(Self { storage, devices })
    }

    pub fn list(&self) -> Vec<PrinterDevice> {
        self.devices.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&PrinterDevice> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Validate and store. Returns the previous record, if any.
    pub fn upsert(&mut self, device: PrinterDevice) -> RegistryResult<Option<PrinterDevice>> {
        device.validate()?;
        self.storage.put_device(&device)?;
        Ok(self.devices.insert(device.id.clone(), device))
    }

    pub fn remove(&mut self, id: &str) -> RegistryResult<PrinterDevice> {
        if !self.devices.contains_key(id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.storage.delete_device(id)?;
        self.devices
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{PrinterRole, PrinterTransport};

    fn device(name: &str) -> PrinterDevice {
        PrinterDevice::new(
            name,
            vec![PrinterRole::Receipt],
            PrinterTransport::Bridge {
                host: Some("127.0.0.1".to_string()),
                port: Some(8181),
            },
        )
    }

    #[test]
    fn test_upsert_persists() {
        let storage = PrinterStorage::open_in_memory().unwrap();
        let mut registry = PrinterRegistry::load(storage.clone()).unwrap();
        assert!(registry.is_empty());

        let d = device("Front");
        assert!(registry.upsert(d.clone()).unwrap().is_none());
        assert!(registry.upsert(d.clone().with_copies(2)).unwrap().is_some());

        let reloaded = PrinterRegistry::load(storage).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&d.id).map(|d| d.copies), Some(2));
    }

    #[test]
    fn test_invalid_device_not_stored() {
        let storage = PrinterStorage::open_in_memory().unwrap();
        let mut registry = PrinterRegistry::load(storage.clone()).unwrap();

        let mut d = device("No roles");
        d.roles.clear();
        assert!(matches!(
            registry.upsert(d),
            Err(RegistryError::Invalid(DeviceValidationError::NoRoles(_)))
        ));
        assert!(storage.list_devices().unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let storage = PrinterStorage::open_in_memory().unwrap();
        let mut registry = PrinterRegistry::load(storage.clone()).unwrap();
        let d = device("Bar");
        registry.upsert(d.clone()).unwrap();

        assert_eq!(registry.remove(&d.id).unwrap().id, d.id);
        assert!(matches!(registry.remove(&d.id), Err(RegistryError::NotFound(_))));
        assert!(storage.get_device(&d.id).unwrap().is_none());
    }
}
