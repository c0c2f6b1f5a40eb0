//! Errors raised while reading or writing sidecar files.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong in this crate.
#[derive(Debug, Error)]
pub enum WbbError {
    /// The first 12 bytes are not a sidecar header.
    #[error("not a wordbboxes file: bad header {found:?}")]
    BadHeader { found: Vec<u8> },

    /// The header names a format version this crate cannot read.
    #[error("unsupported wordbboxes version {0}")]
    UnsupportedVersion(u8),

    /// The record area is not a whole number of records.
    #[error("wordbboxes record area has {trailing} trailing bytes (record length {record_len})")]
    Truncated { trailing: usize, record_len: usize },

    /// An extractor listing line could not be parsed.
    #[error("malformed word-box listing line {line}: {reason}")]
    MalformedListing { line: usize, reason: String },

    /// A record offset points outside the text body.
    #[error("word offset {offset} is outside the text body ({len} bytes)")]
    OffsetOutOfRange { offset: u32, len: usize },

    /// The text stream is not valid UTF-8; sidecar offsets cannot be trusted.
    #[error("'{path}' is not valid UTF-8 (first bad byte at {valid_up_to})")]
    InvalidText { path: PathBuf, valid_up_to: usize },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WbbError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WbbError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_version_names_the_version() {
        let e = WbbError::UnsupportedVersion(3);
        assert!(e.to_string().contains("version 3"));
    }

    #[test]
    fn truncated_display() {
        let e = WbbError::Truncated {
            trailing: 5,
            record_len: 28,
        };
        let msg = e.to_string();
        assert!(msg.contains("5 trailing"), "got: {msg}");
        assert!(msg.contains("28"));
    }
}
