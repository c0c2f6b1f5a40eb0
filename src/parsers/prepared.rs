//! Folders that already hold page images and possibly text, e.g. the output
//! of an earlier run or one part of a split scan.

use crate::metadata::METADATA_FILE;
use crate::registry::{Detection, ParserDescriptor, SourceKind};
use folio_wbb::{CONTENTS_FILE, SIDECAR_FILE};
use std::path::Path;

pub struct PreparedFolder;

impl ParserDescriptor for PreparedFolder {
    fn name(&self) -> &str {
        "PreparedFolder"
    }

    fn media_type(&self) -> &str {
        "multipart/x-folio"
    }

    fn detect(&self, path: &Path) -> Detection {
        let has_pages = path.join("page-images").is_dir()
            || path.join("originals/document.tiff").is_file()
            || path.join("document.tiff").is_file();
        let has_record = [METADATA_FILE, CONTENTS_FILE, SIDECAR_FILE]
            .iter()
            .any(|f| path.join(f).is_file());
        if path.is_dir() && has_pages && has_record {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Prepared
    }

    fn checks_text_quality(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_pages_and_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path();
        assert!(!PreparedFolder.detect(f).is_match());
        std::fs::create_dir(f.join("page-images")).unwrap();
        assert!(!PreparedFolder.detect(f).is_match());
        std::fs::write(f.join("metadata.txt"), "title: x\n").unwrap();
        assert!(PreparedFolder.detect(f).is_match());
    }
}
