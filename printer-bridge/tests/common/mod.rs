//! Scripted transport for connection and service tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use printer_bridge::transport::{SendOutcome, Transport, TransportEvents, TransportFactory};
use printer_bridge::{TransportError, TransportResult};
use receipt_printer::CompiledJob;
use shared::models::{PrinterConfig, PrinterDevice, PrinterTransport};

#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Succeed,
    Fail(String),
    /// Never completes; the worker's timeout has to fire
    Hang,
}

#[derive(Debug, Clone)]
pub enum SendBehavior {
    Delivered,
    AwaitingResult,
    Fail(String),
    /// Write never completes
    Hang,
}

pub struct MockTransport {
    pub name: String,
    connect: Mutex<ConnectBehavior>,
    send: Mutex<SendBehavior>,
    /// Readiness to report on each status request; `None` stays silent
    status_reply: Mutex<Option<bool>>,
    /// Print result to report right after an `AwaitingResult` send
    auto_result: Mutex<Option<(bool, Option<String>)>>,
    events: Mutex<Option<TransportEvents>>,
    sent: Mutex<Vec<CompiledJob>>,
    pub connects: AtomicUsize,
    pub status_requests: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            connect: Mutex::new(ConnectBehavior::Succeed),
            send: Mutex::new(SendBehavior::Delivered),
            status_reply: Mutex::new(Some(true)),
            auto_result: Mutex::new(None),
            events: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            status_requests: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        *self.connect.lock() = behavior;
    }

    pub fn set_send(&self, behavior: SendBehavior) {
        *self.send.lock() = behavior;
    }

    pub fn set_status_reply(&self, ready: Option<bool>) {
        *self.status_reply.lock() = ready;
    }

    pub fn set_auto_result(&self, result: Option<(bool, Option<String>)>) {
        *self.auto_result.lock() = result;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn status_requests(&self) -> usize {
        self.status_requests.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<CompiledJob> {
        self.sent.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.events.lock().is_some()
    }

    /// Far end reports a status
    pub fn emit_status(&self, ready: bool) {
        if let Some(events) = self.events.lock().as_ref() {
            events.status(ready);
        }
    }

    /// Far end reports a print outcome
    pub fn emit_print_result(&self, success: bool, error: Option<&str>) {
        if let Some(events) = self.events.lock().as_ref() {
            events.print_result(success, error.map(str::to_string));
        }
    }

    /// Far end closes the link
    pub fn drop_link(&self, reason: &str) {
        if let Some(events) = self.events.lock().take() {
            events.disconnected(reason);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn describe(&self) -> String {
        format!("mock://{}", self.name)
    }

    async fn connect(&self, events: TransportEvents) -> TransportResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.connect.lock().clone();
        match behavior {
            ConnectBehavior::Succeed => {
                *self.events.lock() = Some(events);
                Ok(())
            }
            ConnectBehavior::Fail(reason) => Err(TransportError::Connection(reason)),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn request_status(&self) -> TransportResult<()> {
        self.status_requests.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().clone();
        let Some(events) = events else {
            return Err(TransportError::NotConnected);
        };
        if let Some(ready) = *self.status_reply.lock() {
            events.status(ready);
        }
        Ok(())
    }

    async fn send(&self, job: &CompiledJob) -> TransportResult<SendOutcome> {
        let events = self.events.lock().clone();
        let Some(events) = events else {
            return Err(TransportError::NotConnected);
        };
        self.sent.lock().push(job.clone());

        let behavior = self.send.lock().clone();
        match behavior {
            SendBehavior::Delivered => Ok(SendOutcome::Delivered),
            SendBehavior::AwaitingResult => {
                if let Some((success, error)) = self.auto_result.lock().clone() {
                    events.print_result(success, error);
                }
                Ok(SendOutcome::AwaitingResult)
            }
            SendBehavior::Fail(reason) => Err(TransportError::Write(reason)),
            SendBehavior::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.events.lock().take();
    }
}

/// Hands out a fresh [`MockTransport`] per connection and keeps them
pub struct MockFactory {
    created: Mutex<Vec<(String, Arc<MockTransport>)>>,
    send: Mutex<SendBehavior>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            send: Mutex::new(SendBehavior::Delivered),
        })
    }

    /// Send behavior for transports created from now on
    pub fn set_send(&self, behavior: SendBehavior) {
        *self.send.lock() = behavior;
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// All transports created for a device, oldest first
    pub fn transports_for(&self, device_id: &str) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .iter()
            .filter(|(id, _)| id == device_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn latest(&self, device_id: &str) -> Option<Arc<MockTransport>> {
        self.transports_for(device_id).pop()
    }
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        device: &PrinterDevice,
        config: &PrinterConfig,
    ) -> TransportResult<Arc<dyn Transport>> {
        if let PrinterTransport::Bridge { host, port } = &device.transport
            && config.resolve_bridge(host.as_deref(), *port).is_none()
        {
            return Err(TransportError::InvalidConfig(format!(
                "No bridge host for device {}",
                device.id
            )));
        }

        let transport = MockTransport::new(&device.name);
        transport.set_send(self.send.lock().clone());
        self.created
            .lock()
            .push((device.id.clone(), transport.clone()));
        Ok(transport)
    }
}

/// A compiled one-line job
pub fn sample_job() -> Arc<CompiledJob> {
    use shared::models::{Charset, PaperWidth, PrintJob, PrintLine};
    Arc::new(receipt_printer::compile_job(
        &PrintJob::new(vec![PrintLine::text("2x Burger")]),
        PaperWidth::Mm80,
        Charset::Utf8,
    ))
}
