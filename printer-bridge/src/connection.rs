//! Per-device connection worker
//!
//! One tokio task per configured printer owns the transport and drives
//!
//! ```text
//! Disconnected -> Connecting -> Connected(not ready) <-> Connected(ready)
//!       ^              |                  |
//!       +--------------+------------------+   (timeout, error, loss)
//! ```
//!
//! Callers talk to it through a cloneable [`ConnectionHandle`]. Status is
//! published on a `watch` channel, so a new subscriber always sees the
//! current value first.
//!
//! Timers:
//! - connect attempts time out after 5 s
//! - status is polled every 3 s while connected
//! - a link with no inbound traffic for 9 s is declared dead
//! - a lost link is retried once per reconnect interval (5 s default)
//! - a print without a result after 10 s resolves as a timeout

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use receipt_printer::CompiledJob;
use shared::models::{ConnectionState, PrinterConfig, PrinterStatus};
use shared::util::now_millis;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::Instrument;

use crate::error::{PrintError, PrintResult, TransportResult};
use crate::transport::{SendOutcome, Transport, TransportEvent, TransportEvents};

/// Connect attempt budget
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Status request cadence while connected
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Time allowed for a print result
pub const PRINT_TIMEOUT: Duration = Duration::from_secs(10);
/// Silence after which a link is considered dead (three missed polls)
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(9);

/// Connection tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub status_interval: Duration,
    pub print_timeout: Duration,
    pub liveness_timeout: Duration,
    pub reconnect_interval: Duration,
    pub auto_reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&PrinterConfig::default())
    }
}

impl ConnectionSettings {
    /// Fixed timers plus the reconnect policy from persisted config
    pub fn from_config(config: &PrinterConfig) -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            status_interval: STATUS_POLL_INTERVAL,
            print_timeout: PRINT_TIMEOUT,
            liveness_timeout: LIVENESS_TIMEOUT,
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            auto_reconnect: config.auto_reconnect,
        }
    }
}

enum Command {
    Connect {
        reply: Option<oneshot::Sender<PrintResult<()>>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Print {
        job: Arc<CompiledJob>,
        reply: oneshot::Sender<PrintResult<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a device's connection worker
#[derive(Clone)]
pub struct ConnectionHandle {
    device_id: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PrinterStatus>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("device_id", &self.device_id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl ConnectionHandle {
    /// Start the worker in the `Disconnected` state. Nothing is attempted
    /// until [`connect`](Self::connect) or [`request_connect`](Self::request_connect).
    pub fn spawn(
        device_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        settings: ConnectionSettings,
    ) -> Self {
        let device_id: String = device_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PrinterStatus::disconnected(&device_id));

        let worker = Worker {
            auto_reconnect: settings.auto_reconnect,
            transport,
            settings,
            status: status_tx,
            events: None,
            connecting: None,
            connect_waiters: Vec::new(),
            sending: None,
            pending: None,
            reconnect_at: None,
            next_poll: None,
            last_seen: Instant::now(),
        };
        let span = tracing::info_span!("printer", device_id = %device_id);
        tokio::spawn(worker.run(rx).instrument(span));

        Self {
            device_id: device_id.into(),
            tx,
            status: status_rx,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current status snapshot
    pub fn status(&self) -> PrinterStatus {
        self.status.borrow().clone()
    }

    /// Status stream; the current value is delivered first
    pub fn subscribe(&self) -> watch::Receiver<PrinterStatus> {
        let mut rx = self.status.clone();
        rx.mark_changed();
        rx
    }

    /// Connect and wait for the outcome. Re-enables auto-reconnect.
    pub async fn connect(&self) -> PrintResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Connect { reply: Some(reply) })
            .map_err(|_| PrintError::WorkerStopped)?;
        rx.await.map_err(|_| PrintError::WorkerStopped)?
    }

    /// Start connecting without waiting
    pub fn request_connect(&self) {
        let _ = self.tx.send(Command::Connect { reply: None });
    }

    /// Close the link and stop auto-reconnect for this device
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Send one copy of a compiled job
    ///
    /// Resolves exactly once: on the printer's result, on write completion
    /// for direct links, on timeout, or on link loss.
    pub async fn print(&self, job: Arc<CompiledJob>) -> PrintResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Print { job, reply })
            .map_err(|_| PrintError::WorkerStopped)?;
        rx.await.map_err(|_| PrintError::WorkerStopped)?
    }

    /// Disconnect and stop the worker
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

type ConnectFuture =
    BoxFuture<'static, (PrintResult<()>, mpsc::UnboundedReceiver<TransportEvent>)>;

struct PendingPrint {
    reply: oneshot::Sender<PrintResult<()>>,
    deadline: Instant,
}

struct Worker {
    transport: Arc<dyn Transport>,
    settings: ConnectionSettings,
    auto_reconnect: bool,
    status: watch::Sender<PrinterStatus>,
    /// Inbound events of the current session
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    connecting: Option<ConnectFuture>,
    connect_waiters: Vec<oneshot::Sender<PrintResult<()>>>,
    /// Physical write in flight; no other transport call while this is set
    sending: Option<BoxFuture<'static, TransportResult<SendOutcome>>>,
    pending: Option<PendingPrint>,
    reconnect_at: Option<Instant>,
    next_poll: Option<Instant>,
    last_seen: Instant,
}

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_events(
    rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Connection worker started");
        let far_future = Duration::from_secs(86400 * 365);

        loop {
            let print_deadline = self.pending.as_ref().map(|p| p.deadline);
            let reconnect_at = self.reconnect_at;
            let next_poll = self.next_poll;
            let far = Instant::now() + far_future;

            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },

                (result, rx) = poll_slot(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_finished(result, rx).await;
                }

                result = poll_slot(&mut self.sending) => {
                    self.sending = None;
                    self.on_send_finished(result);
                }

                event = recv_events(&mut self.events) => match event {
                    Some(event) => self.on_event(event).await,
                    None => self.on_transport_lost("event channel closed").await,
                },

                _ = sleep_until(print_deadline.unwrap_or(far)), if print_deadline.is_some() => {
                    self.on_print_timeout().await;
                }

                _ = sleep_until(reconnect_at.unwrap_or(far)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    if self.auto_reconnect && self.connecting.is_none() && !self.is_connected() {
                        tracing::info!("Reconnecting");
                        self.start_connect();
                    }
                }

                _ = sleep_until(next_poll.unwrap_or(far)), if next_poll.is_some() => {
                    self.on_poll().await;
                }
            }
        }

        tracing::debug!("Connection worker stopped");
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => {
                self.auto_reconnect = self.settings.auto_reconnect;
                if self.is_connected() {
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                    return;
                }
                if let Some(reply) = reply {
                    self.connect_waiters.push(reply);
                }
                if self.connecting.is_none() {
                    self.start_connect();
                }
            }
            Command::Disconnect { reply } => {
                tracing::info!("Disconnect requested");
                self.auto_reconnect = false;
                self.reconnect_at = None;
                if self.connecting.take().is_some() {
                    self.resolve_waiters(Err(PrintError::NotConnected));
                }
                self.teardown(PrintError::TransportClosed).await;
                let _ = reply.send(());
            }
            Command::Print { job, reply } => self.on_print(job, reply),
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn start_connect(&mut self) {
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);
        tracing::debug!(target_addr = %self.transport.describe(), "Connecting");

        let transport = self.transport.clone();
        let timeout = self.settings.connect_timeout;
        let (events, rx) = TransportEvents::channel();
        self.connecting = Some(Box::pin(async move {
            let result = match tokio::time::timeout(timeout, transport.connect(events)).await {
                Ok(result) => result.map_err(PrintError::from),
                Err(_) => Err(PrintError::ConnectTimeout(timeout.as_millis() as u64)),
            };
            (result, rx)
        }));
    }

    async fn on_connect_finished(
        &mut self,
        result: PrintResult<()>,
        rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        match result {
            Ok(()) => {
                tracing::info!(target_addr = %self.transport.describe(), "Printer connected");
                self.events = Some(rx);
                self.last_seen = Instant::now();
                self.set_state(ConnectionState::Connected { ready: false });
                self.resolve_waiters(Ok(()));
                self.request_status().await;
                self.next_poll = Some(Instant::now() + self.settings.status_interval);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connect failed");
                // Drop whatever half-open state the attempt left behind
                self.transport.disconnect().await;
                self.set_state(ConnectionState::Disconnected);
                self.resolve_waiters(Err(e));
                if self.auto_reconnect {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn on_print(&mut self, job: Arc<CompiledJob>, reply: oneshot::Sender<PrintResult<()>>) {
        if !self.is_connected() {
            let _ = reply.send(Err(PrintError::NotConnected));
            return;
        }
        if self.pending.is_some() || self.sending.is_some() {
            tracing::warn!("Print rejected, another job is in flight");
            let _ = reply.send(Err(PrintError::Busy));
            return;
        }

        tracing::debug!(bytes = job.bytes.len(), lines = job.lines.len(), "Sending print job");
        let transport = self.transport.clone();
        self.sending = Some(Box::pin(async move { transport.send(&job).await }));
        self.pending = Some(PendingPrint {
            reply,
            deadline: Instant::now() + self.settings.print_timeout,
        });
    }

    fn on_send_finished(&mut self, result: TransportResult<SendOutcome>) {
        match result {
            Ok(SendOutcome::Delivered) => {
                self.last_seen = Instant::now();
                self.resolve_pending(Ok(()));
            }
            // Result arrives as an event
            Ok(SendOutcome::AwaitingResult) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Print write failed");
                self.resolve_pending(Err(e.into()));
            }
        }
    }

    async fn on_print_timeout(&mut self) {
        let ms = self.settings.print_timeout.as_millis() as u64;
        if self.resolve_pending(Err(PrintError::Timeout(ms))) {
            tracing::warn!(timeout_ms = ms, "Print timed out");
        }
        // A write still running after the deadline is wedged; only a fresh
        // session frees the slot
        if self.sending.is_some() {
            self.on_transport_lost("print write did not complete").await;
        }
    }

    async fn on_event(&mut self, event: TransportEvent) {
        if let TransportEvent::Disconnected { reason } = event {
            self.on_transport_lost(&reason).await;
            return;
        }

        self.last_seen = Instant::now();
        match event {
            TransportEvent::Status { printer_ready } => {
                if self.is_connected() {
                    self.set_state(ConnectionState::Connected {
                        ready: printer_ready,
                    });
                }
            }
            TransportEvent::PrintResult { success, error } => {
                let outcome = if success {
                    Ok(())
                } else {
                    Err(PrintError::Rejected(
                        error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                };
                if !self.resolve_pending(outcome) {
                    tracing::debug!(success, "Ignoring print result with no pending job");
                }
            }
            TransportEvent::Pong | TransportEvent::Disconnected { .. } => {}
        }
    }

    async fn on_poll(&mut self) {
        if !self.is_connected() {
            self.next_poll = None;
            return;
        }

        if self.sending.is_none() {
            if self.last_seen.elapsed() >= self.settings.liveness_timeout {
                tracing::warn!(
                    silent_ms = self.last_seen.elapsed().as_millis() as u64,
                    "No reply from printer link"
                );
                self.on_transport_lost("no reply to status requests").await;
                return;
            }
            self.request_status().await;
        }
        self.next_poll = Some(Instant::now() + self.settings.status_interval);
    }

    async fn request_status(&mut self) {
        if let Err(e) = self.transport.request_status().await {
            tracing::debug!(error = %e, "Status request failed");
        }
    }

    async fn on_transport_lost(&mut self, reason: &str) {
        if !self.is_connected() && self.events.is_none() {
            return;
        }
        tracing::warn!(reason, "Printer link lost");
        self.teardown(PrintError::TransportClosed).await;
        if self.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    /// Only one reconnect timer at a time
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }
        tracing::info!(
            delay_ms = self.settings.reconnect_interval.as_millis() as u64,
            "Reconnect scheduled"
        );
        self.reconnect_at = Some(Instant::now() + self.settings.reconnect_interval);
    }

    /// Close the session and fail whatever is in flight
    async fn teardown(&mut self, pending_error: PrintError) {
        // The write must be gone before the transport is touched again
        self.sending = None;
        self.events = None;
        self.next_poll = None;
        self.resolve_pending(Err(pending_error));
        self.set_state(ConnectionState::Disconnected);
        self.transport.disconnect().await;
    }

    async fn stop(&mut self) {
        self.auto_reconnect = false;
        self.reconnect_at = None;
        self.connecting = None;
        self.resolve_waiters(Err(PrintError::WorkerStopped));
        self.teardown(PrintError::WorkerStopped).await;
    }

    fn resolve_pending(&mut self, outcome: PrintResult<()>) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let _ = pending.reply.send(outcome);
                true
            }
            None => false,
        }
    }

    fn resolve_waiters(&mut self, outcome: PrintResult<()>) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn is_connected(&self) -> bool {
        self.status.borrow().transport_connected()
    }

    /// Timestamp always refreshes; subscribers wake only on a state change
    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|status| {
            status.updated_at = now_millis();
            if status.state == state {
                return false;
            }
            tracing::debug!(from = ?status.state, to = ?state, "Status changed");
            status.state = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = PrinterConfig {
            auto_reconnect: false,
            reconnect_interval_ms: 1500,
            ..PrinterConfig::default()
        };
        let settings = ConnectionSettings::from_config(&config);
        assert!(!settings.auto_reconnect);
        assert_eq!(settings.reconnect_interval, Duration::from_millis(1500));
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.status_interval, Duration::from_secs(3));
        assert_eq!(settings.print_timeout, Duration::from_secs(10));
        assert_eq!(settings.liveness_timeout, 3 * settings.status_interval);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_worker_future_is_send() {
        let (status, _status_rx) = watch::channel(PrinterStatus::disconnected("p1"));
        let settings = ConnectionSettings::default();
        let worker = Worker {
            transport: Arc::new(crate::transport::BridgeTransport::new("127.0.0.1", 81)),
            auto_reconnect: settings.auto_reconnect,
            settings,
            status,
            events: None,
            connecting: None,
            connect_waiters: Vec::new(),
            sending: None,
            pending: None,
            reconnect_at: None,
            next_poll: None,
            last_seen: Instant::now(),
        };
        let (_tx, rx) = mpsc::unbounded_channel();
        // Must hold for tokio::spawn
        assert_send(&worker.run(rx));
    }

    #[test]
    fn test_default_settings_reconnect_every_five_seconds() {
        let settings = ConnectionSettings::default();
        assert!(settings.auto_reconnect);
        assert_eq!(settings.reconnect_interval, Duration::from_secs(5));
    }
}
