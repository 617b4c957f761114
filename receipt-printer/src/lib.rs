//! # receipt-printer
//!
//! ESC/POS rendering for thermal receipt and kitchen printers - no I/O.
//!
//! ## Scope
//!
//! This crate handles HOW a job becomes printer input:
//! - Control codes for the common ESC/POS subset (align, bold, size, cut, drawer)
//! - A fluent byte builder
//! - The job compiler (abstract lines -> byte stream at a paper width)
//! - GBK transcoding and fixed-width layout helpers
//!
//! Delivery (WebSocket bridge, Bluetooth LE) lives in `printer-bridge`.
//!
//! ## Example
//!
//! ```
//! use receipt_printer::compile;
//! use shared::models::{Charset, PaperWidth, PrintJob, PrintLine};
//!
//! let job = PrintJob::new(vec![
//!     PrintLine::text("KITCHEN").center().bold().large(),
//!     PrintLine::separator(),
//!     PrintLine::text("2x Burger"),
//! ]);
//!
//! let bytes = compile(&job, PaperWidth::Mm80, Charset::Utf8);
//! assert_eq!(&bytes[..2], &[0x1B, 0x40]);
//! ```

mod commands;
mod compiler;
mod encoding;
mod escpos;

// Re-exports
pub use commands::Command;
pub use compiler::{CompiledJob, compile, compile_job, wire_lines};
pub use encoding::{encode_gbk, gbk_width, pad, text_width, truncate, two_column};
pub use escpos::EscPosBuilder;
