//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data.

use crate::commands::Command;
use crate::encoding::encode_gbk;
use shared::models::{Align, Charset, TextSize};

/// Piece of a job before charset conversion
///
/// Control codes and text stay apart so only text is ever transcoded.
enum Segment {
    Command(Command),
    Raw(Vec<u8>),
    Text(String),
}

/// ESC/POS command builder
///
/// Text is kept as UTF-8 and converted to the printer's charset in
/// [`EscPosBuilder::build`].
pub struct EscPosBuilder {
    segments: Vec<Segment>,
    width: usize,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize) -> Self {
        Self {
            segments: vec![Segment::Command(Command::Initialize)],
            width,
        }
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    // === Text Output ===

    /// Write raw text
    pub fn text(&mut self, s: &str) -> &mut Self {
        match self.segments.last_mut() {
            Some(Segment::Text(text)) => text.push_str(s),
            _ => self.segments.push(Segment::Text(s.to_string())),
        }
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.newline()
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.command(Command::LineFeed)
    }

    // === Style ===

    pub fn align(&mut self, align: Align) -> &mut Self {
        self.command(Command::Align(align))
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.align(Align::Left)
    }

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.align(Align::Center)
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.align(Align::Right)
    }

    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.command(Command::Bold(on))
    }

    pub fn size(&mut self, size: TextSize) -> &mut Self {
        self.command(Command::Size(size))
    }

    /// Back to left / bold off / normal size
    pub fn reset_style(&mut self) -> &mut Self {
        self.left().bold(false).size(TextSize::Normal)
    }

    // === Separators ===

    /// Print a line of '-' characters spanning the paper width
    pub fn separator(&mut self) -> &mut Self {
        let rule = "-".repeat(self.width);
        self.line(&rule)
    }

    // === Paper Control ===

    /// Feed and full cut
    pub fn cut(&mut self) -> &mut Self {
        self.command(Command::Cut)
    }

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        self.command(Command::KickDrawer)
    }

    // === Raw Commands ===

    pub fn command(&mut self, command: Command) -> &mut Self {
        self.segments.push(Segment::Command(command));
        self
    }

    /// Write raw bytes directly; never transcoded
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.segments.push(Segment::Raw(bytes.to_vec()));
        self
    }

    // === Build ===

    /// Build the final byte buffer in the printer's charset
    pub fn build(self, charset: Charset) -> Vec<u8> {
        let mut out = Vec::with_capacity(4096);
        if charset == Charset::Gbk {
            Command::ChineseMode(true).write_to(&mut out);
            Command::SelectGbk.write_to(&mut out);
        }

        for segment in self.segments {
            match segment {
                Segment::Command(command) => {
                    command.write_to(&mut out);
                    // ESC @ drops the printer out of Chinese mode
                    if command == Command::Initialize && charset == Charset::Gbk {
                        Command::ChineseMode(true).write_to(&mut out);
                    }
                }
                Segment::Raw(bytes) => out.extend_from_slice(&bytes),
                Segment::Text(text) => match charset {
                    Charset::Utf8 => out.extend_from_slice(text.as_bytes()),
                    Charset::Gbk => encode_gbk(&text, &mut out),
                },
            }
        }

        if charset == Charset::Gbk {
            Command::ChineseMode(false).write_to(&mut out);
        }
        out
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(48)
    }
}
