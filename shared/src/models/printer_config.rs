//! Persisted printer settings

use serde::{Deserialize, Serialize};

/// Default bridge WebSocket port (ESP32 firmware)
pub const DEFAULT_BRIDGE_PORT: u16 = 81;

/// Default delay before an automatic reconnect
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

/// Bridge defaults and reconnect policy
///
/// Read at startup, written on every successful bridge connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_host: Option<String>,
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_bridge_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            bridge_host: None,
            bridge_port: DEFAULT_BRIDGE_PORT,
            auto_reconnect: true,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
        }
    }
}

impl PrinterConfig {
    /// Resolve a bridge address, device values first
    ///
    /// Returns `None` when no host is configured anywhere.
    pub fn resolve_bridge(&self, host: Option<&str>, port: Option<u16>) -> Option<(String, u16)> {
        let host = host
            .filter(|h| !h.trim().is_empty())
            .or(self.bridge_host.as_deref().filter(|h| !h.trim().is_empty()))?;
        Some((host.trim().to_string(), port.unwrap_or(self.bridge_port)))
    }
}

/// Remembered Bluetooth LE printer
///
/// Kept apart from the device registry so a re-scan can find the same
/// printer again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlePairing {
    pub device_id: String,
    pub device_name: String,
}
