//! Error types for the printer bridge
//!
//! Transport and protocol failures are handled inside the connection
//! worker. What reaches callers is a [`PrintError`], and the dispatcher
//! turns even that into a per-device result value.

use thiserror::Error;

/// Low-level transport error types
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection attempt rejected by the remote end or the OS
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Send attempted without a live link
    #[error("Not connected")]
    NotConnected,

    /// Write failed mid-transfer
    #[error("Write failed: {0}")]
    Write(String),

    /// No writable characteristic among the known candidates
    #[error("No writable characteristic found on {0}")]
    NoWritableCharacteristic(String),

    /// Device not found during discovery
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Missing or malformed address
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Transport not compiled into this build
    #[error("Unsupported transport: {0}")]
    Unsupported(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Print failure as seen by a caller
#[derive(Debug, Clone, Error)]
pub enum PrintError {
    /// Transport is not connected; nothing was sent
    #[error("Printer not connected")]
    NotConnected,

    /// Another print is still in flight on this connection
    #[error("Printer busy with another job")]
    Busy,

    /// No result within the print timeout
    #[error("Print timed out after {0} ms")]
    Timeout(u64),

    /// Printer reported failure
    #[error("Printer rejected job: {0}")]
    Rejected(String),

    /// Link dropped while the job was pending
    #[error("Transport closed before print completed")]
    TransportClosed,

    /// Connection attempt did not complete in time
    #[error("Connect timed out after {0} ms")]
    ConnectTimeout(u64),

    /// Device has no live connection
    #[error("No connection for device {0}")]
    NoConnection(String),

    /// Connection worker has stopped
    #[error("Connection worker stopped")]
    WorkerStopped,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for print operations
pub type PrintResult<T> = Result<T, PrintError>;
