//! Decomposition of a multi-document scan at its separator sheets.
//!
//! Each part becomes a prepared folder (page images, text, sidecar,
//! `originals/document.tiff`) that is ingested as an independent job with the
//! [`PreparedFolder`] parser. Separator pages belong to no part.

use super::images::{page_files, IMAGES_DPI, FULLCOLOR_PAGES, MONOCHROME_PAGES, PALETTED_PAGES};
use super::job::{Job, JobContext, JobSpec};
use super::{page_image_name, ORIGINALS_DIR, PAGE_IMAGES_DIR};
use crate::error::StageError;
use crate::metadata::{Metadata, METADATA_FILE, MIME_TYPE, PAGE_COUNT, SUMMARY, TITLE, TITLE_IS_FILEPATH};
use crate::parsers::PreparedFolder;
use crate::raster;
use crate::registry::{JobOptions, ParserDescriptor, Selection};
use folio_wbb::contents::PAGE_BREAK;
use folio_wbb::{
    page_words, ExtractedWord, Sidecar, SidecarWriter, TextStream, Word, CONTENTS_FILE,
    SIDECAR_FILE,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// The parts of a decomposed input, ready to run.
#[derive(Debug)]
pub struct SplitPlan {
    pub parts: Vec<JobSpec>,
    /// Inclusive 0-based page range of each part.
    pub ranges: Vec<(usize, usize)>,
    /// Owns the parts' prepared folders until they have been ingested.
    _staging: TempDir,
}

/// 0-based inclusive page ranges between separator pages.
///
/// Empty ranges (adjacent separators, a separator on the first page) are
/// skipped, so the ranges and the separators together cover every page once.
pub fn subdocument_ranges(separators: &[usize], page_count: usize) -> Vec<(usize, usize)> {
    let mut seps: Vec<usize> = separators.iter().copied().filter(|&s| s < page_count).collect();
    seps.sort_unstable();
    seps.dedup();

    let mut ranges = Vec::new();
    let mut prev = 0;
    for sep in seps {
        if sep > prev {
            ranges.push((prev, sep - 1));
        }
        prev = sep + 1;
    }
    if prev < page_count {
        ranges.push((prev, page_count - 1));
    }
    ranges
}

/// Caller metadata for the part covering pages `first..=last`.
fn part_metadata(job: &Job, first: usize, last: usize) -> Metadata {
    let mut md = job.caller_metadata.clone();
    let suffix = format!("[{first}-{last}]");
    match md.get(TITLE).map(str::to_string) {
        Some(title) => md.set(TITLE, format!("{title}{suffix}")),
        None => {
            let name = job
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.identifier.clone());
            md.set(TITLE, format!("{name}{suffix}"));
            md.set(TITLE_IS_FILEPATH, "true");
        }
    }
    for key in [MONOCHROME_PAGES, PALETTED_PAGES, FULLCOLOR_PAGES, SUMMARY] {
        md.remove(key);
    }
    md.set(PAGE_COUNT, last - first + 1);
    md.set(MIME_TYPE, "image/tiff");
    md
}

pub fn plan(job: &Job, ctx: &JobContext<'_>, separators: &[usize]) -> Result<SplitPlan, StageError> {
    let folder = job.path();
    let pages = page_files(&folder.join(PAGE_IMAGES_DIR));
    let ranges = subdocument_ranges(separators, pages.len());

    let staging = tempfile::Builder::new()
        .prefix("folio-parts-")
        .tempdir_in(ctx.work_root())
        .map_err(|e| StageError::io(ctx.work_root(), e))?;

    let text = TextStream::read(&folder.join(CONTENTS_FILE))?;
    let sidecar_path = folder.join(SIDECAR_FILE);
    let words: Option<Vec<Vec<Word>>> = if sidecar_path.exists() {
        Some(page_words(&Sidecar::read(&sidecar_path)?, &text)?)
    } else {
        None
    };
    let text_pages = text.pages();
    let parser: Arc<dyn ParserDescriptor> = Arc::new(PreparedFolder);

    let mut parts = Vec::with_capacity(ranges.len());
    for &(first, last) in &ranges {
        let dir = staging.path().join(format!("part-{first:05}-{last:05}"));
        let dir_pages = dir.join(PAGE_IMAGES_DIR);
        std::fs::create_dir_all(&dir_pages).map_err(|e| StageError::io(&dir_pages, e))?;

        let mut images = Vec::with_capacity(last - first + 1);
        for (n, src) in pages[first..=last].iter().enumerate() {
            let dst = dir_pages.join(page_image_name(n + 1));
            std::fs::copy(src, &dst).map_err(|e| StageError::io(src, e))?;
            images.push(image::open(src).map_err(|e| StageError::Image {
                path: src.clone(),
                detail: e.to_string(),
            })?);
        }

        match &words {
            Some(words) => {
                let mut writer = SidecarWriter::new(ctx.config.sidecar_version, text.language.clone());
                for p in first..=last {
                    let page: Vec<ExtractedWord> = words
                        .get(p)
                        .map(|ws| ws.iter().map(ExtractedWord::from).collect())
                        .unwrap_or_default();
                    writer.push_page(&page);
                }
                writer.write_to(&dir)?;
            }
            None => {
                let body = (first..=last)
                    .filter_map(|p| text_pages.get(p).copied())
                    .collect::<Vec<_>>()
                    .join(PAGE_BREAK);
                TextStream::new(text.language.clone(), body).write(&dir.join(CONTENTS_FILE))?;
            }
        }

        write_part_tiff(&dir, &images)?;

        let mut md = Metadata::new();
        md.set(PAGE_COUNT, last - first + 1);
        if let Some(dpi) = job.metadata.get(IMAGES_DPI) {
            md.set(IMAGES_DPI, dpi);
        }
        let md_path = dir.join(METADATA_FILE);
        md.write(&md_path).map_err(|e| StageError::io(&md_path, e))?;

        debug!("{}: part {first}-{last} staged in {}", job.identifier, dir.display());
        parts.push(JobSpec {
            identifier: format!("{}[{first}-{last}]", job.identifier),
            selection: Selection {
                path: dir,
                parser: parser.clone(),
                options: JobOptions::new(),
            },
            caller_metadata: part_metadata(job, first, last),
        });
    }

    Ok(SplitPlan {
        parts,
        ranges,
        _staging: staging,
    })
}

fn write_part_tiff(dir: &Path, images: &[image::DynamicImage]) -> Result<(), StageError> {
    let originals = dir.join(ORIGINALS_DIR);
    std::fs::create_dir_all(&originals).map_err(|e| StageError::io(&originals, e))?;
    let tiff = originals.join("document.tiff");
    raster::write_tiff_pages(&tiff, images).map_err(|detail| StageError::Image { path: tiff, detail })
}
