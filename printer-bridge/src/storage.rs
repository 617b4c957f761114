//! redb-based storage for printer devices and settings

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{BlePairing, PrinterConfig, PrinterDevice};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Devices table: key = device id, value = JSON
const DEVICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("printer_devices");

/// Settings table: key = setting name, value = JSON
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("printer_settings");

const CONFIG_KEY: &str = "printer_config";
const PAIRING_KEY: &str = "ble_pairing";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable printer registry and settings
#[derive(Clone)]
pub struct PrinterStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for PrinterStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterStorage").finish_non_exhaustive()
    }
}

impl PrinterStorage {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (tests, throwaway runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DEVICES_TABLE)?;
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Devices ==========

    /// All devices, ordered by id
    pub fn list_devices(&self) -> StorageResult<Vec<PrinterDevice>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES_TABLE)?;

        let mut devices = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let device: PrinterDevice = serde_json::from_slice(guard.value())?;
            devices.push(device);
        }
        Ok(devices)
    }

    pub fn get_device(&self, id: &str) -> StorageResult<Option<PrinterDevice>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES_TABLE)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a device
    pub fn put_device(&self, device: &PrinterDevice) -> StorageResult<()> {
        let value = serde_json::to_vec(device)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DEVICES_TABLE)?;
            table.insert(device.id.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a device. Returns whether it existed.
    pub fn delete_device(&self, id: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(DEVICES_TABLE)?;
            table.remove(id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    // ========== Settings ==========

    fn get_setting<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;

        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(key, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Stored bridge config, if any was ever saved
    pub fn load_config(&self) -> StorageResult<Option<PrinterConfig>> {
        self.get_setting(CONFIG_KEY)
    }

    pub fn save_config(&self, config: &PrinterConfig) -> StorageResult<()> {
        self.put_setting(CONFIG_KEY, config)
    }

    pub fn load_pairing(&self) -> StorageResult<Option<BlePairing>> {
        self.get_setting(PAIRING_KEY)
    }

    pub fn save_pairing(&self, pairing: &BlePairing) -> StorageResult<()> {
        self.put_setting(PAIRING_KEY, pairing)
    }
}
