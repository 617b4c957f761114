//! Bridge wire protocol
//!
//! JSON messages exchanged with the ESP32 bridge firmware over WebSocket
//! text frames. A frame may carry several newline-delimited messages.
//!
//! ```text
//! client -> bridge   {"type":"status"}
//!                    {"type":"print","lines":[...],"cut":true,"drawer":false}
//!                    {"type":"ping"}
//! bridge -> client   {"type":"status","esp":true,"printer":true}
//!                    {"type":"print_result","success":false,"error":"paper out"}
//!                    {"type":"pong"}
//! ```

use serde::{Deserialize, Serialize};

use crate::models::{Align, TextSize};

/// Line as sent to the bridge
///
/// Separators are already expanded to a dash run of the device width,
/// so the firmware needs no paper-width knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLine {
    pub text: String,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub size: TextSize,
}

/// Client -> bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Status,
    Print {
        lines: Vec<WireLine>,
        cut: bool,
        drawer: bool,
    },
    /// Bare keepalive, answered with `pong`. The daemon does not send it:
    /// the periodic `status` request already gets a reply whenever the
    /// bridge is alive, and that reply also carries printer readiness.
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Bridge -> client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// `esp` is true whenever the bridge answers at all; `printer` is
    /// whether the wired printer responds.
    Status {
        #[serde(default = "default_true")]
        esp: bool,
        #[serde(default)]
        printer: bool,
    },
    PrintResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong,
    /// Any type this client does not know. Ignored, not an error.
    #[serde(other)]
    Unknown,
}

fn default_true() -> bool {
    true
}

/// Decode every non-blank line of a text frame
///
/// Each line is decoded on its own so one malformed message does not
/// hide the others.
pub fn decode_frame(frame: &str) -> Vec<Result<ServerMessage, serde_json::Error>> {
    frame
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}
