//! Print job compiler
//!
//! Renders an abstract [`PrintJob`] at a device's paper width:
//!
//! ```text
//! INIT
//! for each line:
//!     separator -> "-" * width, LF
//!     text      -> ALIGN, BOLD, SIZE, text, LF
//! ALIGN left, BOLD off, SIZE normal
//! CUT        (if job.cut)
//! KICK       (if job.open_drawer)
//! ```
//!
//! Lines are never reordered, dropped, wrapped or truncated.

use shared::message::{ClientMessage, WireLine};
use shared::models::{Align, Charset, PaperWidth, PrintJob, TextSize};
use tracing::instrument;

use crate::escpos::EscPosBuilder;

/// A job rendered for one paper width
///
/// Holds both renderings so each transport picks the one it speaks:
/// raw ESC/POS bytes for direct links, structured lines for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledJob {
    pub paper_width: PaperWidth,
    pub bytes: Vec<u8>,
    pub lines: Vec<WireLine>,
    pub cut: bool,
    pub open_drawer: bool,
}

impl CompiledJob {
    /// Bridge `print` message for this job
    pub fn to_bridge_message(&self) -> ClientMessage {
        ClientMessage::Print {
            lines: self.lines.clone(),
            cut: self.cut,
            drawer: self.open_drawer,
        }
    }
}

/// Compile a job to a single ESC/POS byte stream
#[instrument(skip(job), fields(lines = job.lines.len(), width = %paper_width))]
pub fn compile(job: &PrintJob, paper_width: PaperWidth, charset: Charset) -> Vec<u8> {
    let mut b = EscPosBuilder::new(paper_width.chars_per_line());

    for line in &job.lines {
        if line.is_separator() {
            b.separator();
            continue;
        }
        b.align(line.effective_align())
            .bold(line.bold)
            .size(line.size)
            .line(&line.text);
    }

    b.reset_style();
    if job.cut {
        b.cut();
    }
    if job.open_drawer {
        b.open_drawer();
    }

    b.build(charset)
}

/// Lines as the bridge firmware expects them
pub fn wire_lines(job: &PrintJob, paper_width: PaperWidth) -> Vec<WireLine> {
    let rule = "-".repeat(paper_width.chars_per_line());
    job.lines
        .iter()
        .map(|line| {
            if line.is_separator() {
                WireLine {
                    text: rule.clone(),
                    align: Align::Left,
                    bold: false,
                    size: TextSize::Normal,
                }
            } else {
                WireLine {
                    text: line.text.clone(),
                    align: line.effective_align(),
                    bold: line.bold,
                    size: line.size,
                }
            }
        })
        .collect()
}

/// Compile both renderings of a job for one device
pub fn compile_job(job: &PrintJob, paper_width: PaperWidth, charset: Charset) -> CompiledJob {
    CompiledJob {
        paper_width,
        bytes: compile(job, paper_width, charset),
        lines: wire_lines(job, paper_width),
        cut: job.cut,
        open_drawer: job.open_drawer,
    }
}
