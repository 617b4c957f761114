//! Printer transport layer
//!
//! Two interchangeable channels to a printer:
//!
//! - [`bridge`]: WebSocket to an ESP32 bridge with the printer wired to it
//! - [`ble`]: direct Bluetooth LE (GATT) link to the printer
//!
//! A transport only moves data. Lifecycle (timeouts, polling, reconnect)
//! belongs to the connection worker in [`crate::connection`].

pub mod ble;
pub mod bridge;
#[cfg(feature = "ble")]
pub mod btle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use receipt_printer::CompiledJob;
use shared::models::{PrinterConfig, PrinterDevice, PrinterTransport};
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};

pub use ble::{BleTransport, GattCharacteristic, GattLink};
pub use bridge::BridgeTransport;

/// Something the far end told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link closed (remote close or error)
    Disconnected { reason: String },
    /// Status reply: is the printer behind the transport reachable
    Status { printer_ready: bool },
    /// Outcome of the last print
    PrintResult {
        success: bool,
        error: Option<String>,
    },
    Pong,
}

/// Event sink handed to a transport for one connection attempt
///
/// `disconnected` is delivered at most once per attempt, and nothing is
/// delivered after it.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl TransportEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    fn emit(&self, event: TransportEvent) {
        if !self.closed.load(Ordering::Acquire) {
            // Receiver gone means the worker moved on; nothing to do
            let _ = self.tx.send(event);
        }
    }

    pub fn status(&self, printer_ready: bool) {
        self.emit(TransportEvent::Status { printer_ready });
    }

    pub fn print_result(&self, success: bool, error: Option<String>) {
        self.emit(TransportEvent::PrintResult { success, error });
    }

    pub fn pong(&self) {
        self.emit(TransportEvent::Pong);
    }

    pub fn disconnected(&self, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(TransportEvent::Disconnected {
                reason: reason.into(),
            });
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// How a send completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The write itself is the print (direct links)
    Delivered,
    /// The far end reports the outcome later as a `PrintResult` event
    AwaitingResult,
}

/// Low-level printer channel
///
/// Implementations allow one physical write at a time. The connection
/// worker never calls into a transport while a `send` is still running.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Human-readable target for logs
    fn describe(&self) -> String;

    /// Open the link. Events for this attempt go to `events`.
    async fn connect(&self, events: TransportEvents) -> TransportResult<()>;

    /// Ask for printer status; the answer arrives as a `Status` event
    async fn request_status(&self) -> TransportResult<()>;

    /// Send one job. Rejected immediately when not connected.
    async fn send(&self, job: &CompiledJob) -> TransportResult<SendOutcome>;

    /// Close the link. Safe to call when already closed.
    async fn disconnect(&self);
}

/// Builds the transport for a configured device
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        device: &PrinterDevice,
        config: &PrinterConfig,
    ) -> TransportResult<Arc<dyn Transport>>;
}

/// Bridge over WebSocket, wireless over btleplug (when built with `ble`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        device: &PrinterDevice,
        config: &PrinterConfig,
    ) -> TransportResult<Arc<dyn Transport>> {
        match &device.transport {
            PrinterTransport::Bridge { host, port } => {
                let (host, port) = config
                    .resolve_bridge(host.as_deref(), *port)
                    .ok_or_else(|| {
                        TransportError::InvalidConfig(format!(
                            "No bridge host for device {}",
                            device.id
                        ))
                    })?;
                Ok(Arc::new(BridgeTransport::new(host, port)))
            }
            PrinterTransport::Wireless {
                device_id,
                device_name,
            } => wireless_transport(device_id, device_name.as_deref()),
        }
    }
}

#[cfg(feature = "ble")]
fn wireless_transport(
    device_id: &str,
    device_name: Option<&str>,
) -> TransportResult<Arc<dyn Transport>> {
    let link = btle::BtleLink::new(device_id, device_name);
    Ok(Arc::new(BleTransport::new(link)))
}

#[cfg(not(feature = "ble"))]
fn wireless_transport(
    device_id: &str,
    _device_name: Option<&str>,
) -> TransportResult<Arc<dyn Transport>> {
    Err(TransportError::Unsupported(format!(
        "Bluetooth LE printer {} needs a build with the `ble` feature",
        device_id
    )))
}
