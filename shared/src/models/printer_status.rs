//! Live printer status
//!
//! Derived state only. Never persisted; rebuilt from transport heartbeats.

use serde::{Deserialize, Serialize};

/// Connection lifecycle
///
/// `Disconnected -> Connecting -> Connected{ready: false} -> Connected{ready: true}`.
/// Readiness only exists inside `Connected`, so a printer can never be
/// ready while its transport is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        /// Printer reachable from the far end of the transport
        ready: bool,
    },
}

/// Per-device status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub device_id: String,
    #[serde(flatten)]
    pub state: ConnectionState,
    pub updated_at: i64,
}

impl PrinterStatus {
    pub fn new(device_id: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            device_id: device_id.into(),
            state,
            updated_at: crate::util::now_millis(),
        }
    }

    pub fn disconnected(device_id: impl Into<String>) -> Self {
        Self::new(device_id, ConnectionState::Disconnected)
    }

    pub fn transport_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    pub fn device_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { ready: true })
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }
}
