//! Data models
//!
//! Shared between the printer bridge daemon and its configuration UI (via JSON).

pub mod dispatch;
pub mod print_job;
pub mod printer_config;
pub mod printer_device;
pub mod printer_status;

// Re-exports
pub use dispatch::*;
pub use print_job::*;
pub use printer_config::*;
pub use printer_device::*;
pub use printer_status::*;
