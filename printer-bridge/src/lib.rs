//! Printer bridge - receipt and kitchen printer connectivity
//!
//! # Overview
//!
//! - **Transports** (`transport`): WebSocket to an ESP32 bridge, direct Bluetooth LE
//! - **Connections** (`connection`): per-device worker with connect timeout,
//!   status polling, liveness, auto-reconnect and a single print slot
//! - **Registry** (`registry`, `storage`): configured printers in redb
//! - **Dispatch** (`dispatch`): print a job on every active printer of a role
//! - **Service** (`service`): the object the application holds on to
//!
//! # Layout
//!
//! ```text
//! printer-bridge/src/
//! ├── transport/     # bridge (WebSocket), ble (GATT chunking), btle (btleplug)
//! ├── connection.rs  # connection state machine
//! ├── dispatch.rs    # printByType and the diagnostic page
//! ├── registry.rs    # device registry
//! ├── storage.rs     # redb tables
//! ├── service.rs     # PrintService
//! ├── config.rs      # environment config
//! └── logger.rs      # tracing setup
//! ```
//!
//! Rendering (ESC/POS, layout helpers) lives in `receipt-printer`; data
//! types and the bridge wire protocol live in `shared`.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod registry;
pub mod service;
pub mod storage;
pub mod transport;

// Re-export public types
pub use config::Config;
pub use connection::{ConnectionHandle, ConnectionSettings};
pub use dispatch::{ConnectionLookup, diagnostic_job, print_by_role, select_devices};
pub use error::{PrintError, PrintResult, TransportError, TransportResult};
pub use registry::{PrinterRegistry, RegistryError};
pub use service::{PrintService, ServiceError, ServiceResult};
pub use storage::{PrinterStorage, StorageError};
pub use transport::{
    DefaultTransportFactory, SendOutcome, Transport, TransportEvent, TransportEvents,
    TransportFactory,
};

/// Load `.env`, read the config, prepare the working directory and logging
pub fn setup_environment() -> std::io::Result<Config> {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    logger::init_logger_with_file(&config.log_level, config.log_dir.as_deref());
    Ok(config)
}
