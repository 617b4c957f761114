//! Text encoding and fixed-width layout helpers
//!
//! Most thermal printers count columns in bytes of their code page:
//! CJK characters take two columns in GBK, ASCII takes one. For UTF-8
//! printers every character is counted as one column.
//!
//! The compiler never wraps or truncates; callers use these helpers to
//! pre-format lines that must fit the paper width.

use shared::models::Charset;

/// Get the GBK byte width of a string
pub fn gbk_width(s: &str) -> usize {
    let (cow, _, _) = encoding_rs::GBK.encode(s);
    cow.len()
}

/// Column width of a string on a printer using `charset`
pub fn text_width(s: &str, charset: Charset) -> usize {
    match charset {
        Charset::Utf8 => s.chars().count(),
        Charset::Gbk => gbk_width(s),
    }
}

fn char_width(c: char, charset: Charset) -> usize {
    match charset {
        Charset::Utf8 => 1,
        Charset::Gbk => {
            let mut tmp = [0u8; 4];
            gbk_width(c.encode_utf8(&mut tmp))
        }
    }
}

/// Truncate a string to fit within `max_width` columns
pub fn truncate(s: &str, max_width: usize, charset: Charset) -> String {
    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let w = char_width(c, charset);
        if width + w > max_width {
            break;
        }
        result.push(c);
        width += w;
    }
    result
}

/// Pad a string to exactly `width` columns
///
/// Longer strings are truncated.
pub fn pad(s: &str, width: usize, align_right: bool, charset: Charset) -> String {
    let current_width = text_width(s, charset);
    if current_width >= width {
        return truncate(s, width, charset);
    }
    let spaces = width - current_width;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

/// Left and right text on one line, e.g. an item and its price
///
/// If both do not fit, they are joined by a single space and the printer
/// wraps naturally.
pub fn two_column(left: &str, right: &str, width: usize, charset: Charset) -> String {
    let lw = text_width(left, charset);
    let rw = text_width(right, charset);

    if lw + rw >= width {
        format!("{} {}", left, right)
    } else {
        format!("{}{}{}", left, " ".repeat(width - lw - rw), right)
    }
}

/// Euro from code page 858, bracketed by Chinese mode off / on
const EURO_CP858: [u8; 8] = [0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26];

/// Append `text` to `out` as GBK
///
/// Text only: control codes never go through here. GBK has no Euro sign,
/// so each one is printed from code page 858 with Chinese mode switched
/// off around it.
pub fn encode_gbk(text: &str, out: &mut Vec<u8>) {
    let mut parts = text.split('€');
    if let Some(first) = parts.next() {
        push_gbk(first, out);
    }
    for part in parts {
        out.extend_from_slice(&EURO_CP858);
        push_gbk(part, out);
    }
}

fn push_gbk(s: &str, out: &mut Vec<u8>) {
    if !s.is_empty() {
        let (bytes, _, _) = encoding_rs::GBK.encode(s);
        out.extend_from_slice(&bytes);
    }
}
