//! The companion text stream (`contents.txt`).
//!
//! Two header lines precede the body:
//!
//! ```text
//! Content-Type: text/plain; charset=utf8
//! Content-Language: en-US
//! <body, pages separated by "\f\n">
//! ```

use crate::error::WbbError;
use std::path::Path;

/// Separator written between pages of the body.
pub const PAGE_BREAK: &str = "\u{c}\n";

const TYPE_PREFIX: &str = "Content-Type:";
const LANGUAGE_PREFIX: &str = "Content-Language:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextStream {
    pub charset: String,
    pub language: String,
    pub body: String,
}

impl TextStream {
    pub fn new(language: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            charset: "utf8".to_string(),
            language: language.into(),
            body: body.into(),
        }
    }

    /// Header lines as written to disk; sidecar offsets start after them.
    pub fn header(&self) -> String {
        format!(
            "{TYPE_PREFIX} text/plain; charset={}\n{LANGUAGE_PREFIX} {}\n",
            self.charset, self.language
        )
    }

    pub fn render(&self) -> String {
        let mut out = self.header();
        out.push_str(&self.body);
        out
    }

    /// Parse a text stream. Missing header lines are tolerated; the body is
    /// then the whole input.
    pub fn parse(text: &str) -> Self {
        let mut stream = Self::new("en-US", "");
        let mut rest = text;
        if let Some((line, tail)) = split_line(rest) {
            if let Some(value) = line.strip_prefix(TYPE_PREFIX) {
                if let Some((_, cs)) = value.split_once("charset=") {
                    stream.charset = cs.trim().to_string();
                }
                rest = tail;
                if let Some((line, tail)) = split_line(rest) {
                    if let Some(lang) = line.strip_prefix(LANGUAGE_PREFIX) {
                        stream.language = lang.trim().to_string();
                        rest = tail;
                    }
                }
            }
        }
        stream.body = rest.to_string();
        stream
    }

    /// Read and parse `path`. Invalid UTF-8 is an error: replacing bad bytes
    /// would move every sidecar offset that follows them.
    pub fn read(path: &Path) -> Result<Self, WbbError> {
        let bytes = std::fs::read(path).map_err(|e| WbbError::io(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| WbbError::InvalidText {
            path: path.to_path_buf(),
            valid_up_to: e.utf8_error().valid_up_to(),
        })?;
        Ok(Self::parse(&text))
    }

    pub fn write(&self, path: &Path) -> Result<(), WbbError> {
        std::fs::write(path, self.render()).map_err(|e| WbbError::io(path, e))
    }

    /// Body text split at form feeds, one entry per page.
    pub fn pages(&self) -> Vec<&str> {
        if self.body.is_empty() {
            return Vec::new();
        }
        self.body
            .split('\u{c}')
            .enumerate()
            .map(|(i, page)| if i > 0 { page.strip_prefix('\n').unwrap_or(page) } else { page })
            .collect()
    }

    /// True when the body holds nothing but whitespace and page breaks.
    pub fn is_blank(&self) -> bool {
        self.body.chars().all(char::is_whitespace)
    }
}

fn split_line(text: &str) -> Option<(&str, &str)> {
    text.split_once('\n')
        .map(|(line, rest)| (line.trim_end_matches('\r'), rest))
}
