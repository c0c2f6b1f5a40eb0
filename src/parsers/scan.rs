//! Raster formats: single images, TIFF, and multi-page scans.

use super::{file_extension, sniff};
use crate::raster::{embedded_dpi, image_header, tiff_info};
use crate::registry::{Detection, JobOptions, ParserDescriptor, SourceKind};
use std::path::Path;
use tracing::debug;

/// Largest decoded image, in bytes, accepted as a single-image document.
pub const IMAGE_SIZE_LIMIT: u64 = 3000 * 3000 * 4;

fn dpi_options(dpi: Option<u32>) -> Detection {
    let mut options = JobOptions::new();
    if let Some(dpi) = dpi {
        options.insert("dpi".into(), dpi.to_string());
    }
    Detection::with_options(options)
}

fn is_tiff(path: &Path) -> bool {
    matches!(file_extension(path).as_deref(), Some("tif" | "tiff")) || sniff(path) == Some("image/tiff")
}

// ── Single images ────────────────────────────────────────────────────────

pub struct ImageDoc;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
];

fn image_type(path: &Path) -> Option<&'static str> {
    if let Some(ext) = file_extension(path) {
        if let Some((_, m)) = IMAGE_TYPES.iter().find(|(e, _)| *e == ext) {
            return Some(m);
        }
    }
    sniff(path).filter(|m| IMAGE_TYPES.iter().any(|(_, t)| t == m))
}

impl ParserDescriptor for ImageDoc {
    fn name(&self) -> &str {
        "ImageDoc"
    }

    fn media_type(&self) -> &str {
        "image/png"
    }

    fn media_type_of(&self, path: &Path) -> String {
        image_type(path).unwrap_or(self.media_type()).to_string()
    }

    fn detect(&self, path: &Path) -> Detection {
        if image_type(path).is_none() || is_tiff(path) {
            return Detection::NoMatch;
        }
        let (w, h, bpp) = match image_header(path) {
            Ok(header) => header,
            Err(e) => {
                debug!("{} looks like an image but cannot be read: {}", path.display(), e);
                return Detection::NoMatch;
            }
        };
        let size = u64::from(w) * u64::from(h) * u64::from(bpp);
        if size > IMAGE_SIZE_LIMIT {
            debug!("{} is too large for an image document ({} bytes)", path.display(), size);
            return Detection::NoMatch;
        }
        dpi_options(embedded_dpi(path))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Raster
    }
}

// ── TIFF ─────────────────────────────────────────────────────────────────

pub struct TiffDoc;

impl ParserDescriptor for TiffDoc {
    fn name(&self) -> &str {
        "TIFFDoc"
    }

    fn media_type(&self) -> &str {
        "image/tiff"
    }

    fn before(&self) -> Vec<&str> {
        vec!["ImageDoc"]
    }

    fn detect(&self, path: &Path) -> Detection {
        if !is_tiff(path) {
            return Detection::NoMatch;
        }
        match tiff_info(path) {
            Ok(info) => dpi_options(info.dpi),
            Err(e) => {
                debug!("unreadable TIFF {}: {}", path.display(), e);
                Detection::NoMatch
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Raster
    }
}

/// A multi-page TIFF, typically a batch from a sheet-fed scanner. Separator
/// sheets between documents split it into several documents.
pub struct ScanDoc;

impl ParserDescriptor for ScanDoc {
    fn name(&self) -> &str {
        "ScanDoc"
    }

    fn media_type(&self) -> &str {
        "image/tiff"
    }

    fn before(&self) -> Vec<&str> {
        vec!["ImageDoc", "TIFFDoc"]
    }

    fn detect(&self, path: &Path) -> Detection {
        if !is_tiff(path) {
            return Detection::NoMatch;
        }
        match tiff_info(path) {
            Ok(info) if info.pages > 1 => dpi_options(info.dpi),
            _ => Detection::NoMatch,
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Raster
    }

    fn splittable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::write_gray_tiff;

    #[test]
    fn single_and_multi_page_tiffs_go_to_different_parsers() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.tif");
        let many = dir.path().join("many.tiff");
        write_gray_tiff(&one, 4, 4, &[255]);
        write_gray_tiff(&many, 4, 4, &[255, 0]);

        assert!(!ScanDoc.detect(&one).is_match());
        assert!(TiffDoc.detect(&one).is_match());
        assert!(ScanDoc.detect(&many).is_match());
        assert!(!ImageDoc.detect(&many).is_match());
    }

    #[test]
    fn small_png_matches_image_doc() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("photo.png");
        image::GrayImage::from_pixel(10, 10, image::Luma([7u8])).save(&p).unwrap();
        assert_eq!(ImageDoc.detect(&p), Detection::Match);
        assert_eq!(ImageDoc.media_type_of(&p), "image/png");
    }
}
