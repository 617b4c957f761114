//! Print Job Model
//!
//! A job is an ordered list of styled lines. Layout (column padding,
//! headers, totals) is assembled by the caller; the compiler never wraps
//! or truncates.

use serde::{Deserialize, Serialize};

/// Horizontal alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Character size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    #[default]
    Normal,
    /// Double width and height
    Large,
}

/// Line type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[default]
    Text,
    /// Full-width dash rule
    Separator,
}

/// One line of a print job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrintLine {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub size: TextSize,
    #[serde(default, rename = "type")]
    pub kind: LineKind,
}

impl PrintLine {
    /// Plain left-aligned text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Full-width separator
    pub fn separator() -> Self {
        Self {
            kind: LineKind::Separator,
            ..Self::default()
        }
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    pub fn center(self) -> Self {
        self.align(Align::Center)
    }

    pub fn right(self) -> Self {
        self.align(Align::Right)
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn large(mut self) -> Self {
        self.size = TextSize::Large;
        self
    }

    pub fn is_separator(&self) -> bool {
        self.kind == LineKind::Separator
    }

    /// Alignment with the default applied
    pub fn effective_align(&self) -> Align {
        self.align.unwrap_or_default()
    }
}

/// Abstract print job
///
/// Immutable once submitted; if delivery fails the caller resubmits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub lines: Vec<PrintLine>,
    #[serde(default = "default_cut")]
    pub cut: bool,
    #[serde(default)]
    pub open_drawer: bool,
}

fn default_cut() -> bool {
    true
}

impl PrintJob {
    /// Job with paper cut and no drawer kick
    pub fn new(lines: Vec<PrintLine>) -> Self {
        Self {
            lines,
            cut: true,
            open_drawer: false,
        }
    }

    pub fn with_cut(mut self, cut: bool) -> Self {
        self.cut = cut;
        self
    }

    pub fn with_open_drawer(mut self, open_drawer: bool) -> Self {
        self.open_drawer = open_drawer;
        self
    }

    pub fn push(&mut self, line: PrintLine) -> &mut Self {
        self.lines.push(line);
        self
    }
}

impl Default for PrintJob {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
