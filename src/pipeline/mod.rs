//! Pipeline stages that turn one source file into a document folder.
//!
//! Each submodule implements one stage (or one family of stages). The
//! per-document driver in [`job`] runs them in order on a blocking worker and
//! owns the job's working folder for the whole trip.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ originals ──▶ images ──▶ text ──▶ summary ──▶ links ──▶ metadata ──▶ upload
//!            (copy, hash)  (raster,   (word    (display   (anchors)  (merge)     (persist)
//!                          optimize)  boxes,    line)
//!                                     OCR)
//! ```
//!
//! 1. [`input`]: resolve a user-supplied path or URL to a local path
//! 2. [`originals`]: copy the source into `originals/` and fingerprint it
//! 3. [`upload`]: optional placeholder upload before the slow stages
//! 4. [`images`]: one PNG per page, then per-page re-encoding and
//!    blank-page removal
//! 5. [`text`]: geometry-aware extraction, plain-text and OCR
//!    fallbacks, paragraph index, separator-sheet detection
//! 6. [`summary`]: short display summary of the text
//! 7. [`links`]: hyperlinks, for formats that carry them
//! 8. [`job`]: metadata merge, persistence hand-off, folder lifetime
//!
//! A multi-document scan leaves the text stage with separator pages;
//! [`split`] then cuts the job into independent sub-jobs.

pub mod images;
pub mod input;
pub mod job;
pub mod links;
pub mod originals;
pub mod split;
pub mod summary;
pub mod text;
pub mod upload;

pub use job::{run_job, JobContext, JobOutcome, JobSpec, WorkFolder};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The states a job passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    CopyOriginal,
    Fingerprint,
    EarlyUpload,
    PageImages,
    OptimizeImages,
    TextExtraction,
    Summarize,
    LinkExtraction,
    WriteMetadata,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::CopyOriginal => "copy-original",
            Stage::Fingerprint => "fingerprint",
            Stage::EarlyUpload => "early-upload",
            Stage::PageImages => "page-images",
            Stage::OptimizeImages => "optimize-images",
            Stage::TextExtraction => "text-extraction",
            Stage::Summarize => "summarize",
            Stage::LinkExtraction => "link-extraction",
            Stage::WriteMetadata => "write-metadata",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the page image for 1-based page `n`.
pub fn page_image_name(n: usize) -> String {
    format!("page{n:05}.png")
}

/// Directory holding page images inside a document folder.
pub const PAGE_IMAGES_DIR: &str = "page-images";

/// Directory holding the copied source inside a document folder.
pub const ORIGINALS_DIR: &str = "originals";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered_and_kebab_cased() {
        assert!(Stage::CopyOriginal < Stage::Fingerprint);
        assert!(Stage::WriteMetadata < Stage::Persist);
        assert_eq!(Stage::OptimizeImages.to_string(), "optimize-images");
        let json = serde_json::to_string(&Stage::TextExtraction).unwrap();
        assert_eq!(json, "\"text-extraction\"");
    }

    #[test]
    fn page_names_are_zero_padded() {
        assert_eq!(page_image_name(1), "page00001.png");
        assert_eq!(page_image_name(123), "page00123.png");
    }
}
