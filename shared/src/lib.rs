//! Shared types for the printer bridge
//!
//! Data model for configured printers, print jobs and live printer status,
//! plus the wire protocol spoken with the ESP32 bridge firmware. Everything
//! here is plain data: no I/O, no async.

pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use message::{ClientMessage, ServerMessage, WireLine};
pub use models::*;
