//! Content sniffing: decides whether a file is text or opaque binary.
//!
//! Classification looks at bytes only, never at the file extension. A file is
//! binary when the sniff window contains a NUL byte, when too many of its
//! bytes are non-printable control characters, or when it is not valid UTF-8.

/// Number of leading bytes inspected for NUL and control characters.
pub const SNIFF_WINDOW: usize = 8000;

/// Share of suspicious bytes (in percent) above which content is binary.
const SUSPICIOUS_PERCENT: usize = 10;

/// Result of classifying a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Valid UTF-8 text, decoded.
    Text(String),
    /// Anything else.
    Binary,
}

impl Content {
    /// Classify raw file bytes, decoding them when they are text.
    pub fn classify(bytes: Vec<u8>) -> Self {
        if is_binary(&bytes) {
            return Content::Binary;
        }
        match String::from_utf8(bytes) {
            Ok(text) => Content::Text(text),
            Err(_) => Content::Binary,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Content::Text(_))
    }
}

/// Byte-level binary test over the sniff window.
///
/// Does not check UTF-8 validity; `Content::classify` does that on the full
/// buffer.
pub fn is_binary(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if window.is_empty() {
        return false;
    }
    if window.contains(&0) {
        return true;
    }

    let suspicious = window.iter().filter(|&&b| is_suspicious(b)).count();
    suspicious * 100 > window.len() * SUSPICIOUS_PERCENT
}

// Control characters that do not show up in ordinary text files.
fn is_suspicious(byte: u8) -> bool {
    matches!(byte, 0x01..=0x08 | 0x0e..=0x1a | 0x1c..=0x1f | 0x7f)
}
