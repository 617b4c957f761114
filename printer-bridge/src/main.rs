use std::time::Duration;

use anyhow::Context;
use printer_bridge::{PrintService, PrinterStorage, setup_environment};
use shared::models::PrinterStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How long to wait for a printer before skipping its startup test page
const TEST_PAGE_WAIT: Duration = Duration::from_secs(10);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (dotenv, work dir, logging)
    let config = setup_environment().context("failed to prepare environment")?;
    tracing::info!("Printer bridge starting...");

    // 2. Storage, seeded with bridge defaults on first run
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let storage = PrinterStorage::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    if storage.load_config()?.is_none() {
        storage.save_config(&config.seed_printer_config())?;
    }

    // 3. Service
    let service = PrintService::with_default_transports(storage)?;
    let shutdown = CancellationToken::new();

    for device in service.devices().into_iter().filter(|d| d.active) {
        match service.subscribe(&device.id) {
            Ok(rx) => {
                tokio::spawn(log_status(device.name.clone(), rx, shutdown.clone()));
            }
            Err(e) => tracing::error!(device_id = %device.id, error = %e, "Printer unusable"),
        }
    }

    let started = service.start();
    if started == 0 {
        tracing::warn!("No active printers configured");
    }

    if config.print_test_on_start {
        tokio::spawn(print_test_pages(service.clone(), shutdown.clone()));
    }

    // 4. Run until Ctrl-C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down...");
    shutdown.cancel();
    service.shutdown().await;

    Ok(())
}

async fn log_status(
    name: String,
    mut rx: watch::Receiver<PrinterStatus>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = rx.borrow_and_update().clone();
                tracing::info!(
                    printer = %name,
                    connected = status.transport_connected(),
                    ready = status.device_ready(),
                    "Printer status"
                );
            }
        }
    }
}

async fn print_test_pages(service: PrintService, shutdown: CancellationToken) {
    for device in service.devices().into_iter().filter(|d| d.active) {
        let Ok(mut rx) = service.subscribe(&device.id) else {
            continue;
        };

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = tokio::time::timeout(
                TEST_PAGE_WAIT,
                async { rx.wait_for(|s| s.transport_connected()).await.is_ok() },
            ) => result.unwrap_or(false),
        };
        if !connected {
            tracing::warn!(printer = %device.name, "Printer not connected, skipping test page");
            continue;
        }

        match service.print_test(&device.id).await {
            Ok(result) if result.success => {
                tracing::info!(printer = %device.name, "Test page printed")
            }
            Ok(result) => tracing::warn!(
                printer = %device.name,
                error = ?result.error,
                "Test page failed"
            ),
            Err(e) => tracing::error!(printer = %device.name, error = %e, "Test page failed"),
        }
    }
}
