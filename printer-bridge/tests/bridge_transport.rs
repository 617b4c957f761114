//! Bridge transport against a loopback WebSocket server

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use printer_bridge::transport::{BridgeTransport, Transport, TransportEvent, TransportEvents};
use printer_bridge::{ConnectionHandle, ConnectionSettings, PrintError};
use receipt_printer::compile_job;
use serde_json::Value;
use shared::models::{Charset, PaperWidth, PrintJob, PrintLine};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(3);

/// Fake ESP32 firmware
///
/// Answers status with `printer_ready`, answers print with `print_reply`,
/// forwards every received message to the test and closes after `close_after`
/// prints.
async fn fake_bridge(
    printer_ready: bool,
    print_reply: &'static str,
    close_after: usize,
) -> (u16, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut prints = 0;

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = seen_tx.send(value.clone());

            match value["type"].as_str() {
                Some("status") => {
                    let reply = format!(
                        "{{\"type\":\"status\",\"esp\":true,\"printer\":{printer_ready}}}"
                    );
                    ws.send(Message::Text(reply.into())).await.unwrap();
                }
                Some("print") => {
                    ws.send(Message::Text(print_reply.into())).await.unwrap();
                    prints += 1;
                    if prints >= close_after {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                Some("ping") => {
                    ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
                        .await
                        .unwrap();
                }
                _ => {}
            }
        }
    });

    (port, seen_rx)
}

fn job() -> Arc<receipt_printer::CompiledJob> {
    let job = PrintJob::new(vec![
        PrintLine::text("ORDER 12").center().bold(),
        PrintLine::separator(),
    ])
    .with_open_drawer(true);
    Arc::new(compile_job(&job, PaperWidth::Mm58, Charset::Utf8))
}

#[tokio::test]
async fn test_handshake_print_and_remote_close() {
    let (port, mut seen) = fake_bridge(
        true,
        "{\"type\":\"firmware\",\"v\":2}\n{\"type\":\"print_result\",\"success\":true}",
        1,
    )
    .await;

    let transport = Arc::new(BridgeTransport::new("127.0.0.1", port));
    let handle = ConnectionHandle::spawn("bar", transport, ConnectionSettings::default());
    handle.connect().await.unwrap();

    // Socket up first, then the status handshake makes it ready
    let first = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(first["type"], "status");
    let mut rx = handle.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.device_ready()))
        .await
        .unwrap()
        .unwrap();

    handle.print(job()).await.unwrap();
    let print = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(print["type"], "print");
    assert_eq!(print["cut"], true);
    assert_eq!(print["drawer"], true);
    assert_eq!(print["lines"][0]["text"], "ORDER 12");
    assert_eq!(print["lines"][0]["align"], "center");
    assert_eq!(print["lines"][1]["text"], "-".repeat(32));

    // Bridge closes the socket after the print
    tokio::time::timeout(WAIT, rx.wait_for(|s| !s.transport_connected()))
        .await
        .unwrap()
        .unwrap();
    assert!(!handle.status().device_ready());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_printer_failure_is_returned() {
    let (port, _seen) = fake_bridge(
        false,
        r#"{"type":"print_result","success":false,"error":"paper out"}"#,
        usize::MAX,
    )
    .await;

    let transport = Arc::new(BridgeTransport::new("127.0.0.1", port));
    let handle = ConnectionHandle::spawn("kitchen", transport, ConnectionSettings::default());
    handle.connect().await.unwrap();

    // Bridge is up, printer behind it is not
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = handle.status();
    assert!(status.transport_connected());
    assert!(!status.device_ready());

    let result = handle.print(job()).await;
    assert!(matches!(result, Err(PrintError::Rejected(ref e)) if e == "paper out"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_close_reports_disconnected_once() {
    let (port, _seen) = fake_bridge(true, r#"{"type":"print_result","success":true}"#, 1).await;

    let transport = BridgeTransport::new("127.0.0.1", port);
    let (events, mut rx) = TransportEvents::channel();
    transport.connect(events).await.unwrap();

    transport.send(&job()).await.unwrap();

    let mut got = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        got.push(event);
    }
    assert_eq!(
        got.iter()
            .filter(|e| matches!(e, TransportEvent::Disconnected { .. }))
            .count(),
        1
    );
    assert!(got.contains(&TransportEvent::PrintResult {
        success: true,
        error: None
    }));

    // Writing after the close is rejected or fails, never hangs
    let _ = tokio::time::timeout(WAIT, transport.request_status()).await.unwrap();
    transport.disconnect().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = Arc::new(BridgeTransport::new("127.0.0.1", port));
    let handle = ConnectionHandle::spawn("gone", transport, ConnectionSettings::default());
    let result = handle.connect().await;
    assert!(matches!(result, Err(PrintError::Transport(_))));
    assert!(!handle.status().transport_connected());
    handle.shutdown().await;
}
