//! Web pages and office documents, both converted to PDF by the gateway.

use super::{file_extension, head};
use crate::registry::{Detection, ParserDescriptor, SourceKind};
use std::path::Path;

pub struct WebPage;

impl ParserDescriptor for WebPage {
    fn name(&self) -> &str {
        "WebPage"
    }

    fn media_type(&self) -> &str {
        "text/html"
    }

    fn before(&self) -> Vec<&str> {
        vec!["TextDoc"]
    }

    fn detect(&self, path: &Path) -> Detection {
        let by_name = matches!(file_extension(path).as_deref(), Some("html" | "htm" | "xhtml"));
        let by_content = || {
            head(path, 512).is_some_and(|h| {
                let text = String::from_utf8_lossy(&h).to_ascii_lowercase();
                let text = text.trim_start();
                text.starts_with("<!doctype html") || text.starts_with("<html")
            })
        };
        if by_name || (path.is_file() && path.extension().is_none() && by_content()) {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }

    fn has_links(&self) -> bool {
        true
    }
}

pub struct MsDoc;

const OFFICE_TYPES: &[(&str, &str)] = &[
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("rtf", "application/rtf"),
    ("odt", "application/vnd.oasis.opendocument.text"),
];

fn office_type(path: &Path) -> Option<&'static str> {
    let ext = file_extension(path)?;
    OFFICE_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

impl ParserDescriptor for MsDoc {
    fn name(&self) -> &str {
        "MSDoc"
    }

    fn media_type(&self) -> &str {
        "application/msword"
    }

    fn media_type_of(&self, path: &Path) -> String {
        office_type(path).unwrap_or(self.media_type()).to_string()
    }

    fn detect(&self, path: &Path) -> Detection {
        if office_type(path).is_some() {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }

    fn has_links(&self) -> bool {
        true
    }
}
