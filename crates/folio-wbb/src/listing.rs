//! Parser for the geometry-aware extractor's word-box listing.
//!
//! One word per line, whitespace separated, pages separated by a line holding
//! a single form feed. Blank lines and `#` comments are skipped. Three line
//! layouts exist and are told apart by where the first decimal point falls:
//!
//! ```text
//! v1: ulx uly lrx lry type size fixed serif symbolic italic bold hyphen space newline n c1..cn
//! v2: ulx uly lrx lry type name size fixed serif symbolic italic bold hyphen space newline n c1..cn
//! v3: ulx uly lrx lry baseline rotation type name size fixed ... newline n c1..cn
//! ```
//!
//! Characters are decimal Unicode code points. The assembled word is NFKC
//! normalized so ligatures become plain letters.

use crate::error::WbbError;
use crate::record::WordFlags;
use unicode_normalization::UnicodeNormalization;

/// One word as reported by the extractor, before it is placed in a text
/// stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedWord {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub baseline: f32,
    pub rotation: u8,
    pub font_type: u8,
    pub font_name: Option<String>,
    pub font_size: f32,
    pub flags: WordFlags,
}

impl ExtractedWord {
    /// Number of characters in the normalized word.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Parse a whole listing into pages of words.
///
/// A trailing page without a closing form feed is kept. An empty listing
/// yields no pages.
pub fn parse(listing: &str) -> Result<Vec<Vec<ExtractedWord>>, WbbError> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    for (idx, raw) in listing.split_inclusive('\n').enumerate() {
        if raw == "\u{c}\n" || raw == "\u{c}" {
            pages.push(std::mem::take(&mut current));
            continue;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        current.push(parse_line(trimmed).map_err(|reason| WbbError::MalformedListing {
            line: idx + 1,
            reason,
        })?);
    }
    if !current.is_empty() {
        pages.push(current);
    }
    Ok(pages)
}

fn parse_line(line: &str) -> Result<ExtractedWord, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 15 {
        return Err(format!("expected at least 15 fields, found {}", parts.len()));
    }

    // Field positions for each layout: (baseline, rotation, type, name, size).
    let layout: (Option<usize>, Option<usize>, usize, Option<usize>, usize) =
        if parts[8].contains('.') {
            (Some(4), Some(5), 6, Some(7), 8)
        } else if parts[6].contains('.') || parts[5].parse::<f32>().is_err() {
            (None, None, 4, Some(5), 6)
        } else {
            (None, None, 4, None, 5)
        };
    let (baseline_at, rotation_at, type_at, name_at, size_at) = layout;
    let flags_at = size_at + 1;

    let float = |i: usize| -> Result<f32, String> {
        parts
            .get(i)
            .ok_or_else(|| format!("missing field {i}"))?
            .parse::<f32>()
            .map_err(|e| format!("field {i}: {e}"))
    };
    let int = |i: usize| -> Result<u32, String> {
        parts
            .get(i)
            .ok_or_else(|| format!("missing field {i}"))?
            .parse::<u32>()
            .map_err(|e| format!("field {i}: {e}"))
    };

    let bits = [
        WordFlags::FIXED_WIDTH,
        WordFlags::SERIF,
        WordFlags::SYMBOLIC,
        WordFlags::ITALIC,
        WordFlags::BOLD,
        WordFlags::HAS_HYPHEN,
        WordFlags::ENDS_WORD,
        WordFlags::ENDS_LINE,
    ];
    let mut flags = WordFlags::empty();
    for (i, bit) in bits.into_iter().enumerate() {
        if int(flags_at + i)? != 0 {
            flags |= bit;
        }
    }

    let count_at = flags_at + bits.len();
    let count = int(count_at)? as usize;
    let mut chars = String::with_capacity(count);
    for i in 0..count {
        let code = int(count_at + 1 + i)?;
        let c = char::from_u32(code).ok_or_else(|| format!("invalid code point {code}"))?;
        chars.push(c);
    }

    let bottom = float(3)?;
    Ok(ExtractedWord {
        text: chars.nfkc().collect(),
        left: float(0)?,
        top: float(1)?,
        right: float(2)?,
        bottom,
        baseline: match baseline_at {
            Some(i) => float(i)?,
            None => bottom,
        },
        rotation: match rotation_at {
            Some(i) => (int(i)? & 0x03) as u8,
            None => 0,
        },
        font_type: (int(type_at)? & 0x3F) as u8,
        font_name: name_at.and_then(|i| parts.get(i)).map(|s| s.to_string()),
        font_size: float(size_at)?,
        flags,
    })
}
