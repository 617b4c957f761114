//! Role-based print dispatch
//!
//! `print_by_role` fans one job out to every active device serving a role.
//! Devices run concurrently; copies on one device go out one after the
//! other. Every (device x copy) attempt yields a [`DispatchResult`], so a
//! caller can report partial success instead of all-or-nothing.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use receipt_printer::{compile_job, two_column};
use shared::models::{DispatchResult, PrintJob, PrintLine, PrinterDevice, PrinterRole};
use tracing::instrument;

use crate::connection::ConnectionHandle;
use crate::error::PrintError;

/// Where the dispatcher finds a device's live connection
pub trait ConnectionLookup {
    fn connection(&self, device_id: &str) -> Option<ConnectionHandle>;
}

impl ConnectionLookup for HashMap<String, ConnectionHandle> {
    fn connection(&self, device_id: &str) -> Option<ConnectionHandle> {
        self.get(device_id).cloned()
    }
}

/// Active devices serving `role`, in input order
pub fn select_devices(role: PrinterRole, devices: &[PrinterDevice]) -> Vec<&PrinterDevice> {
    devices
        .iter()
        .filter(|d| d.active && d.serves(role))
        .collect()
}

/// Send every copy of `job` to one device
///
/// Copies are independent: a failed copy does not stop the next one.
#[instrument(skip(device, job, connection), fields(device_id = %device.id, copies = device.effective_copies()))]
pub async fn print_to_device(
    device: &PrinterDevice,
    job: &PrintJob,
    connection: Option<ConnectionHandle>,
) -> Vec<DispatchResult> {
    let copies = device.effective_copies();
    let compiled = Arc::new(compile_job(job, device.paper_width, device.charset));

    let mut results = Vec::with_capacity(copies as usize);
    for copy in 1..=copies {
        let outcome = match &connection {
            Some(handle) => handle.print(compiled.clone()).await,
            None => Err(PrintError::NoConnection(device.id.clone())),
        };
        match outcome {
            Ok(()) => {
                tracing::info!(copy, bytes = compiled.bytes.len(), "Copy printed");
                results.push(DispatchResult::ok(&device.id, copy));
            }
            Err(e) => {
                tracing::warn!(copy, error = %e, "Copy failed");
                results.push(DispatchResult::failed(&device.id, copy, e.to_string()));
            }
        }
    }
    results
}

/// Print `job` on every active device with `role`
///
/// No matching device is not an error: the result is empty. Results are
/// ordered by device, then by copy.
#[instrument(skip(role, job, devices, connections), fields(role = %role, lines = job.lines.len()))]
pub async fn print_by_role<C: ConnectionLookup + ?Sized>(
    role: PrinterRole,
    job: &PrintJob,
    devices: &[PrinterDevice],
    connections: &C,
) -> Vec<DispatchResult> {
    let targets = select_devices(role, devices);
    if targets.is_empty() {
        tracing::debug!("No active printer for role");
        return Vec::new();
    }

    let sends = targets
        .into_iter()
        .map(|device| print_to_device(device, job, connections.connection(&device.id)));
    let results: Vec<DispatchResult> = join_all(sends).await.into_iter().flatten().collect();

    let ok = shared::models::success_count(&results);
    if ok < results.len() {
        tracing::warn!(ok, total = results.len(), "Partial print failure");
    }
    results
}

/// Canned test page describing the device
pub fn diagnostic_job(device: &PrinterDevice) -> PrintJob {
    let width = device.paper_width.chars_per_line();
    let row = |label: &str, value: &str| {
        PrintLine::text(two_column(label, value, width, device.charset))
    };
    let roles = device
        .roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let printed_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    PrintJob::new(vec![
        PrintLine::text("PRINTER TEST").center().bold().large(),
        PrintLine::separator(),
        row("Name", &device.name),
        row("Transport", device.transport.kind()),
        row("Paper", &device.paper_width.to_string()),
        row("Roles", &roles),
        row("Copies", &device.effective_copies().to_string()),
        PrintLine::separator(),
        PrintLine::text(printed_at).center(),
        PrintLine::text("OK").center().bold(),
    ])
}
