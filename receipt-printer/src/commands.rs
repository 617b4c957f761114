//! ESC/POS control codes
//!
//! Stateless mapping from style directives to bytes. Same directive,
//! same bytes; no I/O and no error cases.

use shared::models::{Align, TextSize};

const ESC: u8 = 0x1B;
const FS: u8 = 0x1C;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// ESC @ - reset printer state
const INITIALIZE: [u8; 2] = [ESC, 0x40];

/// ESC a n
const ALIGN_LEFT: [u8; 3] = [ESC, 0x61, 0x00];
const ALIGN_CENTER: [u8; 3] = [ESC, 0x61, 0x01];
const ALIGN_RIGHT: [u8; 3] = [ESC, 0x61, 0x02];

/// ESC E n
const BOLD_ON: [u8; 3] = [ESC, 0x45, 0x01];
const BOLD_OFF: [u8; 3] = [ESC, 0x45, 0x00];

/// GS ! n - character size (0x11 = double width and height)
const SIZE_NORMAL: [u8; 3] = [GS, 0x21, 0x00];
const SIZE_LARGE: [u8; 3] = [GS, 0x21, 0x11];

/// GS V 66 n - feed n lines then full cut.
/// Lets the printer handle the cutter-to-head distance so the last line
/// is not sliced.
const CUT: [u8; 4] = [GS, 0x56, 0x42, 0x03];

/// ESC p m t1 t2 - pulse drawer pin 2
const KICK_DRAWER: [u8; 5] = [ESC, 0x70, 0x00, 25, 250];

/// FS & / FS . - double-byte (Chinese) character mode on / off
const CHINESE_MODE_ON: [u8; 2] = [FS, 0x26];
const CHINESE_MODE_OFF: [u8; 2] = [FS, 0x2E];

/// FS C 1 - double-byte code page GBK
const SELECT_GBK: [u8; 3] = [FS, 0x43, 0x01];

/// Printer control directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Initialize,
    Align(Align),
    Bold(bool),
    Size(TextSize),
    LineFeed,
    Cut,
    KickDrawer,
    ChineseMode(bool),
    SelectGbk,
}

impl Command {
    /// Byte encoding of this directive
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Command::Initialize => &INITIALIZE,
            Command::Align(Align::Left) => &ALIGN_LEFT,
            Command::Align(Align::Center) => &ALIGN_CENTER,
            Command::Align(Align::Right) => &ALIGN_RIGHT,
            Command::Bold(true) => &BOLD_ON,
            Command::Bold(false) => &BOLD_OFF,
            Command::Size(TextSize::Normal) => &SIZE_NORMAL,
            Command::Size(TextSize::Large) => &SIZE_LARGE,
            Command::LineFeed => &[LF],
            Command::Cut => &CUT,
            Command::KickDrawer => &KICK_DRAWER,
            Command::ChineseMode(true) => &CHINESE_MODE_ON,
            Command::ChineseMode(false) => &CHINESE_MODE_OFF,
            Command::SelectGbk => &SELECT_GBK,
        }
    }

    /// Append this directive to a buffer
    pub fn write_to(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sequences() {
        assert_eq!(Command::Initialize.bytes(), &[0x1B, 0x40]);
        assert_eq!(Command::Align(Align::Center).bytes(), &[0x1B, 0x61, 0x01]);
        assert_eq!(Command::Bold(true).bytes(), &[0x1B, 0x45, 0x01]);
        assert_eq!(Command::Size(TextSize::Large).bytes(), &[0x1D, 0x21, 0x11]);
        assert_eq!(Command::LineFeed.bytes(), b"\n");
        assert_eq!(Command::KickDrawer.bytes(), &[0x1B, 0x70, 0x00, 25, 250]);
    }

    #[test]
    fn test_deterministic() {
        let all = [
            Command::Initialize,
            Command::Align(Align::Left),
            Command::Align(Align::Right),
            Command::Bold(false),
            Command::Size(TextSize::Normal),
            Command::LineFeed,
            Command::Cut,
            Command::KickDrawer,
            Command::ChineseMode(true),
            Command::SelectGbk,
        ];
        for cmd in all {
            assert_eq!(cmd.bytes(), cmd.bytes());
            assert!(!cmd.bytes().is_empty());
        }
    }

    #[test]
    fn test_write_to() {
        let mut buf = Vec::new();
        Command::Initialize.write_to(&mut buf);
        Command::Cut.write_to(&mut buf);
        assert_eq!(buf, vec![0x1B, 0x40, 0x1D, 0x56, 0x42, 0x03]);
    }
}
