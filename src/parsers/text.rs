//! Page-description and text formats.

use super::{file_extension, head, sniff};
use crate::registry::{Detection, JobOptions, ParserDescriptor, SourceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// ── PDF ──────────────────────────────────────────────────────────────────

pub struct PdfDoc;

impl ParserDescriptor for PdfDoc {
    fn name(&self) -> &str {
        "PDFDoc"
    }

    fn media_type(&self) -> &str {
        "application/pdf"
    }

    fn detect(&self, path: &Path) -> Detection {
        if file_extension(path).as_deref() == Some("pdf") || sniff(path) == Some("application/pdf") {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Pdf
    }

    fn has_links(&self) -> bool {
        true
    }
}

// ── PostScript ───────────────────────────────────────────────────────────

pub struct PostscriptDoc;

impl ParserDescriptor for PostscriptDoc {
    fn name(&self) -> &str {
        "PostscriptDoc"
    }

    fn media_type(&self) -> &str {
        "application/postscript"
    }

    fn detect(&self, path: &Path) -> Detection {
        let by_name = matches!(file_extension(path).as_deref(), Some("ps" | "eps"));
        let by_magic = || head(path, 4).is_some_and(|h| h.starts_with(b"%!PS"));
        if by_name || (path.is_file() && by_magic()) {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }
}

// ── Plain text ───────────────────────────────────────────────────────────

/// Plain text. Files without an extension are accepted when their first
/// few kilobytes are UTF-8 without NUL bytes.
pub struct TextDoc;

fn looks_like_text(path: &Path) -> bool {
    let Some(bytes) = head(path, 4096) else {
        return false;
    };
    if bytes.is_empty() || bytes.contains(&0) {
        return false;
    }
    match std::str::from_utf8(&bytes) {
        Ok(_) => true,
        // a multi-byte character cut off by the read limit
        Err(e) => e.error_len().is_none(),
    }
}

impl ParserDescriptor for TextDoc {
    fn name(&self) -> &str {
        "TextDoc"
    }

    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn detect(&self, path: &Path) -> Detection {
        if !path.is_file() {
            return Detection::NoMatch;
        }
        let matched = match file_extension(path).as_deref() {
            Some("txt" | "text" | "asc") => true,
            None => looks_like_text(path),
            Some(_) => false,
        };
        if matched {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }

    fn checks_text_quality(&self) -> bool {
        false
    }
}

// ── Source code ──────────────────────────────────────────────────────────

pub struct SourceCode;

const SOURCE_TYPES: &[(&str, &str)] = &[
    ("c", "text/x-csrc"),
    ("h", "text/x-chdr"),
    ("cc", "text/x-c++src"),
    ("cpp", "text/x-c++src"),
    ("hpp", "text/x-c++hdr"),
    ("java", "text/x-java"),
    ("js", "text/javascript"),
    ("ts", "text/x-typescript"),
    ("go", "text/x-go"),
    ("py", "text/x-python"),
    ("rb", "text/x-ruby"),
    ("rs", "text/x-rust"),
    ("pl", "text/x-perl"),
    ("sh", "text/x-sh"),
    ("el", "text/x-emacs-lisp"),
    ("lisp", "text/x-lisp"),
    ("scm", "text/x-scheme"),
    ("ml", "text/x-ocaml"),
    ("hs", "text/x-haskell"),
];

fn source_type(path: &Path) -> Option<&'static str> {
    let ext = file_extension(path)?;
    SOURCE_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

impl ParserDescriptor for SourceCode {
    fn name(&self) -> &str {
        "SourceCode"
    }

    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn media_type_of(&self, path: &Path) -> String {
        source_type(path).unwrap_or(self.media_type()).to_string()
    }

    fn before(&self) -> Vec<&str> {
        vec!["TextDoc"]
    }

    fn detect(&self, path: &Path) -> Detection {
        if source_type(path).is_some() {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }

    fn checks_text_quality(&self) -> bool {
        false
    }
}

// ── Note cards ───────────────────────────────────────────────────────────

/// `notes.3x5` is a card 3 inches high and 5 wide; `.card` and `.crd` files
/// are 5x3. The size travels to the converter as `width`/`height` options.
pub struct CardDoc;

static CARD_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([0-9]+)x([0-9]+)$").expect("valid regex"));

impl ParserDescriptor for CardDoc {
    fn name(&self) -> &str {
        "CardDoc"
    }

    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn before(&self) -> Vec<&str> {
        vec!["TextDoc", "SourceCode"]
    }

    fn detect(&self, path: &Path) -> Detection {
        if !path.is_file() {
            return Detection::NoMatch;
        }
        let name = path.to_string_lossy();
        let (width, height) = if let Some(caps) = CARD_SIZE.captures(&name) {
            (caps[2].to_string(), caps[1].to_string())
        } else if name.ends_with(".card") || name.ends_with(".crd") {
            ("5".to_string(), "3".to_string())
        } else {
            return Detection::NoMatch;
        };
        let mut options = JobOptions::new();
        options.insert("width".into(), width);
        options.insert("height".into(), height);
        Detection::MatchWithOptions(options)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ConvertedPdf
    }

    fn checks_text_quality(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(dir: &Path, name: &str, body: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn pdf_by_extension_or_magic() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PdfDoc.detect(&file(dir.path(), "a.pdf", b"junk")).is_match());
        assert!(PdfDoc.detect(&file(dir.path(), "noext", b"%PDF-1.5\n")).is_match());
        assert!(!PdfDoc.detect(&file(dir.path(), "b.txt", b"hello")).is_match());
    }

    #[test]
    fn postscript_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PostscriptDoc.detect(&file(dir.path(), "x", b"%!PS-Adobe-3.0")).is_match());
        assert!(PostscriptDoc.detect(&file(dir.path(), "fig.eps", b"")).is_match());
    }

    #[test]
    fn text_without_extension_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TextDoc.detect(&file(dir.path(), "README", "naïve text".as_bytes())).is_match());
        assert!(!TextDoc.detect(&file(dir.path(), "blob", b"\x00\x01\x02")).is_match());
        assert!(!TextDoc.detect(&file(dir.path(), "empty", b"")).is_match());
        assert!(!TextDoc.detect(dir.path()).is_match());
    }

    #[test]
    fn source_media_type_follows_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = file(dir.path(), "main.rs", b"fn main() {}");
        assert!(SourceCode.detect(&p).is_match());
        assert_eq!(SourceCode.media_type_of(&p), "text/x-rust");
    }

    #[test]
    fn card_size_from_name() {
        let dir = tempfile::tempdir().unwrap();
        let sized = CardDoc.detect(&file(dir.path(), "todo.3x5", b"milk"));
        let Detection::MatchWithOptions(o) = sized else {
            panic!("expected options, got {sized:?}");
        };
        assert_eq!(o["width"], "5");
        assert_eq!(o["height"], "3");

        let Detection::MatchWithOptions(o) = CardDoc.detect(&file(dir.path(), "ideas.card", b"x")) else {
            panic!("expected a match");
        };
        assert_eq!((o["width"].as_str(), o["height"].as_str()), ("5", "3"));
        assert!(!CardDoc.detect(&file(dir.path(), "plain.txt", b"x")).is_match());
    }
}
