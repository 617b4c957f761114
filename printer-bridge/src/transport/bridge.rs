//! WebSocket transport to the ESP32 printer bridge
//!
//! The bridge speaks JSON text frames (see [`shared::message`]). One
//! reader task per connection turns frames into [`TransportEvent`]s and
//! reports `disconnected` once when the stream ends.
//!
//! [`TransportEvent`]: super::TransportEvent

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use receipt_printer::CompiledJob;
use shared::message::{ClientMessage, ServerMessage, decode_frame};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{SendOutcome, Transport, TransportEvents};
use crate::error::{TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Client side of the bridge WebSocket
pub struct BridgeTransport {
    host: String,
    port: u16,
    sink: Mutex<Option<WsSink>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl BridgeTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            sink: Mutex::new(None),
            reader: parking_lot::Mutex::new(None),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }

    async fn write(&self, message: &ClientMessage) -> TransportResult<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(message.to_json().into()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    fn stop_reader(&self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn describe(&self) -> String {
        self.url()
    }

    async fn connect(&self, events: TransportEvents) -> TransportResult<()> {
        // A reconnect replaces whatever is left of the previous session
        self.stop_reader();
        self.sink.lock().await.take();

        let url = self.url();
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        tracing::info!(url = %url, "Bridge WebSocket connected");

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        let handle = tokio::spawn(read_loop(stream, events));
        *self.reader.lock() = Some(handle);
        Ok(())
    }

    async fn request_status(&self) -> TransportResult<()> {
        self.write(&ClientMessage::Status).await
    }

    async fn send(&self, job: &CompiledJob) -> TransportResult<SendOutcome> {
        self.write(&job.to_bridge_message()).await?;
        Ok(SendOutcome::AwaitingResult)
    }

    async fn disconnect(&self) {
        self.stop_reader();
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.close().await;
            tracing::debug!(url = %self.url(), "Bridge WebSocket closed");
        }
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: TransportEvents) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => dispatch_frame(text.as_str(), &events),
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| format!("closed by bridge: {}", f.reason.as_str()))
                    .unwrap_or_else(|| "closed by bridge".to_string());
            }
            // Ping/pong is answered by tungstenite; binary frames are not part of the protocol
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        }
    };
    tracing::warn!(reason = %reason, "Bridge WebSocket disconnected");
    events.disconnected(reason);
}

fn dispatch_frame(frame: &str, events: &TransportEvents) {
    for message in decode_frame(frame) {
        match message {
            Ok(ServerMessage::Status { esp, printer }) => events.status(esp && printer),
            Ok(ServerMessage::PrintResult { success, error }) => {
                events.print_result(success, error)
            }
            Ok(ServerMessage::Pong) => events.pong(),
            Ok(ServerMessage::Unknown) => {
                tracing::debug!("Ignoring unknown bridge message");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed bridge message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;

    #[test]
    fn test_dispatch_frame_multiple_messages() {
        let (events, mut rx) = TransportEvents::channel();
        dispatch_frame(
            "{\"type\":\"status\",\"esp\":true,\"printer\":false}\n\
             not json\n\
             {\"type\":\"print_result\",\"success\":false,\"error\":\"paper out\"}\n\
             {\"type\":\"firmware\"}\n\
             {\"type\":\"pong\"}",
            &events,
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Status {
                printer_ready: false
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::PrintResult {
                success: false,
                error: Some("paper out".to_string())
            }
        );
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Pong);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let transport = BridgeTransport::new("127.0.0.1", 81);
        assert!(matches!(
            transport.request_status().await,
            Err(TransportError::NotConnected)
        ));
        // Closing twice is harmless
        transport.disconnect().await;
        transport.disconnect().await;
    }
}
