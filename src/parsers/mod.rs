//! Built-in parser descriptors.
//!
//! | parser          | reads                                   | kind           |
//! |-----------------|-----------------------------------------|----------------|
//! | `PDFDoc`        | PDF                                     | `Pdf`          |
//! | `PostscriptDoc` | PostScript, EPS                         | `ConvertedPdf` |
//! | `TextDoc`       | plain text                              | `ConvertedPdf` |
//! | `SourceCode`    | program source                          | `ConvertedPdf` |
//! | `CardDoc`       | `name.HxW`, `.card`, `.crd` note cards  | `ConvertedPdf` |
//! | `WebPage`       | HTML                                    | `ConvertedPdf` |
//! | `MSDoc`         | office documents                        | `ConvertedPdf` |
//! | `ImageDoc`      | single raster images (not TIFF)         | `Raster`       |
//! | `TIFFDoc`       | single-page TIFF                        | `Raster`       |
//! | `ScanDoc`       | multi-page TIFF, may hold several docs  | `Raster`       |
//! | `PreparedFolder`| already-processed document folders      | `Prepared`     |

mod prepared;
mod scan;
mod text;
mod web;

pub use self::prepared::PreparedFolder;
pub use self::scan::{ImageDoc, ScanDoc, TiffDoc, IMAGE_SIZE_LIMIT};
pub use self::text::{CardDoc, PdfDoc, PostscriptDoc, SourceCode, TextDoc};
pub use self::web::{MsDoc, WebPage};

use crate::error::IngestError;
use crate::registry::{ParserDescriptor, ParserRegistry, RegistryBuilder};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Every built-in parser, in registration order.
pub fn builtin_parsers() -> Vec<Arc<dyn ParserDescriptor>> {
    vec![
        Arc::new(PdfDoc),
        Arc::new(PostscriptDoc),
        Arc::new(TextDoc),
        Arc::new(SourceCode),
        Arc::new(CardDoc),
        Arc::new(WebPage),
        Arc::new(MsDoc),
        Arc::new(ImageDoc),
        Arc::new(TiffDoc),
        Arc::new(ScanDoc),
        Arc::new(PreparedFolder),
    ]
}

impl ParserRegistry {
    /// Registry holding the built-in parsers.
    pub fn with_defaults() -> Result<Self, IngestError> {
        builtin_parsers()
            .into_iter()
            .fold(RegistryBuilder::new(), RegistryBuilder::register)
            .build()
    }
}

/// Lower-cased extension of a regular file.
pub(crate) fn file_extension(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Media type sniffed from the file's leading bytes.
pub(crate) fn sniff(path: &Path) -> Option<&'static str> {
    if !path.is_file() {
        return None;
    }
    infer::get_from_path(path).ok().flatten().map(|k| k.mime_type())
}

/// The first `n` bytes of a file.
pub(crate) fn head(path: &Path, n: u64) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    std::fs::File::open(path).ok()?.take(n).read_to_end(&mut buf).ok()?;
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_in_constraint_order() {
        let r = ParserRegistry::with_defaults().unwrap();
        let names: Vec<&str> = r.list().iter().map(|p| p.name()).collect();
        let pos = |n: &str| names.iter().position(|p| *p == n).unwrap();
        assert!(pos("ScanDoc") < pos("TIFFDoc"));
        assert!(pos("TIFFDoc") < pos("ImageDoc"));
        assert!(pos("CardDoc") < pos("TextDoc"));
        assert!(pos("CardDoc") < pos("SourceCode"));
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn extension_is_lowercased_and_needs_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Report.PDF");
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        assert_eq!(file_extension(&p).as_deref(), Some("pdf"));
        assert_eq!(file_extension(dir.path()), None);
        assert_eq!(sniff(&p), Some("application/pdf"));
    }
}
