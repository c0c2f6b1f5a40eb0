//! Results of ingesting one input.

use crate::error::{IngestError, SubJobFailure};
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextSource {
    /// Geometry-aware extractor; the folder has a sidecar.
    WordBoxes,
    /// Plain-text extractor or the input's own text.
    PlainText,
    Ocr,
    /// Carried over from a prepared folder.
    Prepared,
    /// No text was found.
    #[default]
    None,
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TextSource::WordBoxes => "word-boxes",
            TextSource::PlainText => "plain-text",
            TextSource::Ocr => "ocr",
            TextSource::Prepared => "prepared",
            TextSource::None => "none",
        };
        f.write_str(s)
    }
}

/// Counters gathered while a job ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub page_count: usize,
    /// 1-based input pages removed as blank.
    pub dropped_pages: Vec<usize>,
    pub monochrome_pages: usize,
    pub paletted_pages: usize,
    pub fullcolor_pages: usize,
    pub text_source: TextSource,
    pub word_count: usize,
    /// Duplicate word boxes removed by the overlay cleanup.
    pub duplicate_words: usize,
    pub paragraph_count: usize,
    pub link_count: usize,
    pub duration_ms: u64,
}

/// One finished document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedDocument {
    /// Input path, or `original[start-end]` for a part of a decomposed input.
    pub identifier: String,
    /// Parser that produced the document.
    pub parser: String,
    /// The finished folder, when it was kept rather than uploaded.
    pub folder: Option<PathBuf>,
    /// Repository id, when uploaded.
    pub doc_id: Option<String>,
    pub metadata: Metadata,
    pub stats: JobStats,
}

/// Terminal state of one input.
#[derive(Debug)]
pub enum Outcome {
    Single(IngestedDocument),
    /// The input held several documents. Parts that failed are listed in
    /// `failures` and left out of `parts`.
    Decomposed {
        parts: Vec<IngestedDocument>,
        failures: Vec<SubJobFailure>,
    },
    Failed(IngestError),
}

impl Outcome {
    /// Every document produced, in order.
    pub fn documents(&self) -> Vec<&IngestedDocument> {
        match self {
            Outcome::Single(doc) => vec![doc],
            Outcome::Decomposed { parts, .. } => parts.iter().collect(),
            Outcome::Failed(_) => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&IngestError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// One input of a batch and what became of it.
#[derive(Debug)]
pub struct InputResult {
    pub input: String,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc(id: &str) -> IngestedDocument {
        IngestedDocument {
            identifier: id.to_string(),
            parser: "ScanDoc".to_string(),
            folder: Some(PathBuf::from("/tmp/x")),
            doc_id: None,
            metadata: Metadata::new(),
            stats: JobStats::default(),
        }
    }

    #[test]
    fn documents_lists_parts_in_order() {
        let o = Outcome::Decomposed {
            parts: vec![doc("s.tiff[0-1]"), doc("s.tiff[3-4]")],
            failures: Vec::new(),
        };
        let ids: Vec<&str> = o.documents().iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["s.tiff[0-1]", "s.tiff[3-4]"]);
        assert!(!o.is_failed());
    }

    #[test]
    fn failed_has_no_documents() {
        let o = Outcome::Failed(IngestError::Internal("boom".into()));
        assert!(o.documents().is_empty());
        assert!(o.error().is_some());
    }

    #[test]
    fn stats_serialize() {
        let mut s = JobStats::default();
        s.text_source = TextSource::Ocr;
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"text_source\":\"ocr\""), "got: {json}");
    }
}
