//! Direct Bluetooth LE transport
//!
//! Thermal printers expose a write characteristic under one of a few
//! well-known GATT services. The transport picks the first candidate the
//! printer offers and streams ESC/POS bytes to it in small chunks.
//!
//! The GATT client itself sits behind [`GattLink`] so the chunking and
//! selection logic run without a Bluetooth adapter.

use std::time::Duration;

use async_trait::async_trait;
use receipt_printer::CompiledJob;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SendOutcome, Transport, TransportEvents};
use crate::error::{TransportError, TransportResult};

/// BLE write payload size (default ATT MTU minus header)
pub const CHUNK_SIZE: usize = 20;

/// Gap between chunks so the printer buffer keeps up
pub const CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Advertised-name prefixes of supported printers
pub const NAME_PREFIXES: &[&str] = &["RPP", "PT-", "Printer", "BT", "MTP"];

/// Whether an advertised name looks like a receipt printer
pub fn is_printer_name(name: &str) -> bool {
    NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Known (service, write characteristic) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattCandidate {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// Probed in order; the first writable match wins
pub const GATT_CANDIDATES: &[GattCandidate] = &[
    // Generic 16-bit printer service
    GattCandidate {
        service: Uuid::from_u128(0x000018F0_0000_1000_8000_00805F9B34FB),
        characteristic: Uuid::from_u128(0x00002AF1_0000_1000_8000_00805F9B34FB),
    },
    GattCandidate {
        service: Uuid::from_u128(0xE7810A71_73AE_499D_8C15_FAA9AEF0C3F2),
        characteristic: Uuid::from_u128(0xBEF8D6C9_9C21_4C9E_B632_BD58C1009F9F),
    },
    // Microchip transparent UART
    GattCandidate {
        service: Uuid::from_u128(0x49535343_FE7D_4AE5_8FA9_9FAFD205E455),
        characteristic: Uuid::from_u128(0x49535343_8841_43F4_A8D4_ECBE34729BB3),
    },
];

/// A characteristic as discovered on the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
    pub writable: bool,
}

/// First characteristic matching the candidate list, in candidate order
pub fn select_characteristic(found: &[GattCharacteristic]) -> Option<GattCharacteristic> {
    GATT_CANDIDATES.iter().find_map(|candidate| {
        found
            .iter()
            .find(|c| {
                c.writable
                    && c.service == candidate.service
                    && c.uuid == candidate.characteristic
            })
            .cloned()
    })
}

/// GATT client operations the transport needs
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Peripheral name or address for logs
    fn name(&self) -> String;

    /// Connect, discover services and list characteristics.
    /// A link drop after this returns is reported through `events`.
    async fn open(&self, events: TransportEvents) -> TransportResult<Vec<GattCharacteristic>>;

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
    ) -> TransportResult<()>;

    async fn close(&self);
}

/// ESC/POS over a BLE write characteristic
pub struct BleTransport<L> {
    link: L,
    target: Mutex<Option<GattCharacteristic>>,
    events: parking_lot::Mutex<Option<TransportEvents>>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl<L: GattLink> BleTransport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            target: Mutex::new(None),
            events: parking_lot::Mutex::new(None),
            chunk_size: CHUNK_SIZE,
            chunk_delay: CHUNK_DELAY,
        }
    }

    /// Override the chunking (tests, printers with a larger MTU)
    pub fn with_chunking(mut self, chunk_size: usize, chunk_delay: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_delay = chunk_delay;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}

#[async_trait]
impl<L: GattLink> Transport for BleTransport<L> {
    fn describe(&self) -> String {
        format!("ble://{}", self.link.name())
    }

    async fn connect(&self, events: TransportEvents) -> TransportResult<()> {
        let found = self.link.open(events.clone()).await?;
        let Some(characteristic) = select_characteristic(&found) else {
            self.link.close().await;
            return Err(TransportError::NoWritableCharacteristic(self.link.name()));
        };

        tracing::info!(
            device = %self.link.name(),
            service = %characteristic.service,
            characteristic = %characteristic.uuid,
            "BLE printer connected"
        );
        *self.target.lock().await = Some(characteristic);

        // The printer itself is the far end: an open link means ready
        events.status(true);
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn request_status(&self) -> TransportResult<()> {
        let events = self.events.lock().clone();
        match events {
            Some(events) if !events.is_closed() => {
                events.status(true);
                Ok(())
            }
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn send(&self, job: &CompiledJob) -> TransportResult<SendOutcome> {
        // Held for the whole job: one write stream at a time
        let target = self.target.lock().await;
        let characteristic = target.as_ref().ok_or(TransportError::NotConnected)?;

        let total = job.bytes.len().div_ceil(self.chunk_size);
        for (i, chunk) in job.bytes.chunks(self.chunk_size).enumerate() {
            self.link.write(characteristic, chunk).await?;
            if i + 1 < total && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        tracing::debug!(bytes = job.bytes.len(), chunks = total, "BLE job written");
        Ok(SendOutcome::Delivered)
    }

    async fn disconnect(&self) {
        self.target.lock().await.take();
        self.events.lock().take();
        self.link.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipt_printer::compile_job;
    use shared::models::{Charset, PaperWidth, PrintJob, PrintLine};

    #[derive(Default)]
    struct MockLink {
        offered: Vec<GattCharacteristic>,
        writes: parking_lot::Mutex<Vec<Vec<u8>>>,
        fail_at: Option<usize>,
        hang_open: bool,
        closed: parking_lot::Mutex<u32>,
    }

    #[async_trait]
    impl GattLink for MockLink {
        fn name(&self) -> String {
            "RPP02N".to_string()
        }

        async fn open(&self, _events: TransportEvents) -> TransportResult<Vec<GattCharacteristic>> {
            if self.hang_open {
                std::future::pending::<()>().await;
            }
            Ok(self.offered.clone())
        }

        async fn write(
            &self,
            _characteristic: &GattCharacteristic,
            data: &[u8],
        ) -> TransportResult<()> {
            let mut writes = self.writes.lock();
            if self.fail_at == Some(writes.len()) {
                return Err(TransportError::Write("GATT error".to_string()));
            }
            writes.push(data.to_vec());
            Ok(())
        }

        async fn close(&self) {
            *self.closed.lock() += 1;
        }
    }

    fn characteristic(candidate: usize, writable: bool) -> GattCharacteristic {
        GattCharacteristic {
            service: GATT_CANDIDATES[candidate].service,
            uuid: GATT_CANDIDATES[candidate].characteristic,
            writable,
        }
    }

    fn job_of_len(n: usize) -> CompiledJob {
        let mut job = compile_job(
            &PrintJob::new(vec![PrintLine::text("x")]),
            PaperWidth::Mm58,
            Charset::Utf8,
        );
        job.bytes = (0..n).map(|i| i as u8).collect();
        job
    }

    #[test]
    fn test_printer_name_filter() {
        assert!(is_printer_name("RPP300"));
        assert!(is_printer_name("PT-210"));
        assert!(is_printer_name("Printer_5A2B"));
        assert!(is_printer_name("MTP-II"));
        assert!(!is_printer_name("Galaxy Buds"));
        assert!(!is_printer_name("rpp300"));
    }

    #[test]
    fn test_select_characteristic_candidate_order() {
        let found = vec![characteristic(2, true), characteristic(0, false), characteristic(1, true)];
        assert_eq!(select_characteristic(&found), Some(characteristic(1, true)));

        let found = vec![characteristic(0, false)];
        assert_eq!(select_characteristic(&found), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_chunks_of_twenty() {
        let link = MockLink {
            offered: vec![characteristic(0, true)],
            ..Default::default()
        };
        let transport = BleTransport::new(link);
        let (events, mut rx) = TransportEvents::channel();
        transport.connect(events).await.unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(crate::transport::TransportEvent::Status { printer_ready: true })
        ));

        let outcome = transport.send(&job_of_len(45)).await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);

        let writes = transport.link().writes.lock().clone();
        let sizes: Vec<usize> = writes.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(writes.concat(), job_of_len(45).bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_stops_at_first_failed_chunk() {
        let link = MockLink {
            offered: vec![characteristic(2, true)],
            fail_at: Some(1),
            ..Default::default()
        };
        let transport = BleTransport::new(link);
        let (events, _rx) = TransportEvents::channel();
        transport.connect(events).await.unwrap();

        let result = transport.send(&job_of_len(100)).await;
        assert!(matches!(result, Err(TransportError::Write(_))));
        assert_eq!(transport.link().writes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_without_known_characteristic() {
        let link = MockLink {
            offered: vec![GattCharacteristic {
                service: Uuid::from_u128(1),
                uuid: Uuid::from_u128(2),
                writable: true,
            }],
            ..Default::default()
        };
        let transport = BleTransport::new(link);
        let (events, _rx) = TransportEvents::channel();

        let result = transport.connect(events).await;
        assert!(matches!(result, Err(TransportError::NoWritableCharacteristic(_))));
        assert_eq!(*transport.link().closed.lock(), 1);
        assert!(matches!(
            transport.send(&job_of_len(4)).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_status_after_disconnect() {
        let link = MockLink {
            offered: vec![characteristic(0, true)],
            ..Default::default()
        };
        let transport = BleTransport::new(link);
        let (events, _rx) = TransportEvents::channel();
        transport.connect(events).await.unwrap();
        assert!(transport.request_status().await.is_ok());

        transport.disconnect().await;
        assert!(matches!(
            transport.request_status().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_cut_off_by_connect_timeout_is_closed() {
        use crate::connection::{ConnectionHandle, ConnectionSettings};
        use crate::error::PrintError;
        use std::sync::Arc;

        let link = MockLink {
            offered: vec![characteristic(0, true)],
            hang_open: true,
            ..Default::default()
        };
        let transport = Arc::new(BleTransport::new(link));
        let settings = ConnectionSettings {
            auto_reconnect: false,
            ..ConnectionSettings::default()
        };
        let handle = ConnectionHandle::spawn("ble-1", transport.clone(), settings);

        let result = handle.connect().await;
        assert!(matches!(result, Err(PrintError::ConnectTimeout(5000))));
        assert_eq!(*transport.link().closed.lock(), 1);
        handle.shutdown().await;
    }
}
