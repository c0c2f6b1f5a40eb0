//! `TextExtraction`: `contents.txt`, the word-box sidecar and the paragraph
//! index, plus separator-sheet detection for multi-document scans.
//!
//! Extractors are tried in order, each only when the previous one left no
//! usable text:
//!
//! 1. the geometry-aware word-box extractor (writes a sidecar, then runs the
//!    overlay cleanup)
//! 2. the plain-text extractor, or the input's own text for `text/*` inputs
//! 3. the quality scorer, which can throw the text away again
//! 4. OCR over the page images, subject to [`OcrPolicy`]

use super::images::{page_files, IMAGES_DPI};
use super::job::{Job, JobContext};
use super::PAGE_IMAGES_DIR;
use crate::config::OcrPolicy;
use crate::error::StageError;
use crate::gateway::{run_checked, ToolId, ToolRequest};
use crate::layout;
use crate::metadata::{BAD_TEXT_SCORE, NO_TEXT};
use crate::output::TextSource;
use crate::registry::SourceKind;
use folio_wbb::contents::PAGE_BREAK;
use folio_wbb::{clean_overlays, listing, SidecarWriter, TextStream, CONTENTS_FILE, SIDECAR_FILE};
use std::path::Path;
use tracing::{debug, info, warn};

/// Files a prepared folder may already carry.
const PREPARED_ARTIFACTS: [&str; 4] = [CONTENTS_FILE, SIDECAR_FILE, "summary.txt", "links"];

/// Produce the folder's text and return the 0-based pages that are
/// separator sheets (empty unless the parser splits).
pub fn extract_text(job: &mut Job, ctx: &JobContext<'_>) -> Result<Vec<usize>, StageError> {
    let config = ctx.config;
    let contents = job.path().join(CONTENTS_FILE);

    if job.kind() == SourceKind::Prepared {
        carry_over(job)?;
    }

    if contents.exists() {
        job.stats.text_source = TextSource::Prepared;
    } else if !config.no_text && config.ocr != OcrPolicy::Always {
        if job.pdf.is_some() {
            match word_boxes(job, ctx) {
                Ok(true) => {
                    job.stats.text_source = TextSource::WordBoxes;
                    match clean_overlays(job.path()) {
                        Ok(report) => job.stats.duplicate_words = report.removed_words,
                        Err(e) => warn!("{}: overlay cleanup failed: {e}", job.identifier),
                    }
                }
                Ok(false) => debug!("{}: word-box extractor found no text", job.identifier),
                Err(e) => warn!(
                    "{}: word-box extraction failed, trying plain text: {e}",
                    job.identifier
                ),
            }
        }
        if !contents.exists() && plain_text(job, ctx)? {
            job.stats.text_source = TextSource::PlainText;
        }
        if contents.exists() && config.check_text_quality && job.parser.checks_text_quality() {
            check_quality(job, ctx)?;
        }
    }

    let wants_ocr = match config.ocr {
        OcrPolicy::Always => job.stats.text_source != TextSource::Prepared,
        OcrPolicy::WhenNeeded => !contents.exists(),
        OcrPolicy::Never => false,
    };
    if wants_ocr && !config.no_text && ocr(job, ctx)? {
        job.stats.text_source = TextSource::Ocr;
    }

    let text = if contents.exists() {
        TextStream::read(&contents)?
    } else {
        let empty = TextStream::new(config.language.clone(), "");
        empty.write(&contents)?;
        empty
    };
    if text.is_blank() {
        info!("{}: no text found", job.identifier);
        job.metadata.set(NO_TEXT, "true");
        job.stats.text_source = TextSource::None;
    }
    job.stats.word_count = text.body.split_whitespace().count();

    if let Some(index) = layout::process_folder(job.path(), &config.layout)? {
        job.stats.paragraph_count = index.entries.len();
    }

    Ok(if job.parser.splittable() {
        find_separators(job, ctx, &text)
    } else {
        Vec::new()
    })
}

fn remove_text(folder: &Path) {
    for name in [CONTENTS_FILE, SIDECAR_FILE] {
        let path = folder.join(name);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("cannot remove {}: {e}", path.display());
            }
        }
    }
}

fn carry_over(job: &Job) -> Result<(), StageError> {
    for name in PREPARED_ARTIFACTS {
        let src = job.source.join(name);
        let dst = job.path().join(name);
        if dst.exists() {
            continue;
        }
        if src.is_dir() {
            super::originals::copy_tree(&src, &dst).map_err(|e| StageError::io(&src, e))?;
        } else if src.is_file() {
            std::fs::copy(&src, &dst).map_err(|e| StageError::io(&src, e))?;
        }
    }
    Ok(())
}

/// Split tool output at form feeds, leave out dropped pages and rejoin with
/// page breaks.
fn assemble_pages(raw: &str, dropped: &[usize]) -> String {
    raw.split('\u{c}')
        .enumerate()
        .filter(|(i, _)| !dropped.contains(&(i + 1)))
        .map(|(i, page)| if i > 0 { page.strip_prefix('\n').unwrap_or(page) } else { page })
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
}

// ── Extractors ───────────────────────────────────────────────────────────

/// Write contents and sidecar from the word-box extractor. `Ok(false)` when
/// it found no text.
fn word_boxes(job: &Job, ctx: &JobContext<'_>) -> Result<bool, StageError> {
    let pdf = job.pdf.as_deref().ok_or(StageError::Unsupported(ToolId::WordBoxes))?;
    let listing_file = job.scratch.path().join("wordboxes.txt");
    let req = ToolRequest::new(ToolId::WordBoxes, ctx.config.tool_timeout())
        .input(pdf)
        .output_file(&listing_file);
    let output = run_checked(ctx.gateway, &req)?;
    let raw = output.primary(&req)?;
    let pages = listing::parse(&String::from_utf8_lossy(&raw))?;

    let mut writer = SidecarWriter::new(ctx.config.sidecar_version, ctx.config.language.clone())
        .skip_pages(job.dropped_pages.iter().copied());
    for page in &pages {
        writer.push_page(page);
    }
    let (text, sidecar) = writer.finish();
    if text.is_blank() {
        return Ok(false);
    }
    text.write(&job.path().join(CONTENTS_FILE))?;
    sidecar.write(&job.path().join(SIDECAR_FILE))?;
    debug!(
        "{}: {} words on {} pages",
        job.identifier,
        sidecar.word_count(),
        sidecar.pages.len()
    );
    Ok(true)
}

fn plain_text(job: &Job, ctx: &JobContext<'_>) -> Result<bool, StageError> {
    let raw = match job.pdf.as_deref() {
        Some(pdf) if ctx.gateway.supports(ToolId::PlainText) => {
            let out_file = job.scratch.path().join("plain.txt");
            let req = ToolRequest::new(ToolId::PlainText, ctx.config.tool_timeout())
                .input(pdf)
                .output_file(&out_file);
            match run_checked(ctx.gateway, &req).and_then(|out| out.primary(&req)) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    warn!("{}: plain-text extraction failed: {e}", job.identifier);
                    return Ok(false);
                }
            }
        }
        _ if job.parser.media_type().starts_with("text/") && job.source.is_file() => {
            let bytes = std::fs::read(&job.source).map_err(|e| StageError::io(&job.source, e))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        _ => return Ok(false),
    };

    let body = assemble_pages(&raw, &job.dropped_pages);
    if body.chars().all(char::is_whitespace) {
        return Ok(false);
    }
    TextStream::new(ctx.config.language.clone(), body).write(&job.path().join(CONTENTS_FILE))?;
    Ok(true)
}

/// Ask the scorer about the text and discard it when the score is over the
/// threshold or negative. Scores that do not parse are ignored.
fn check_quality(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), StageError> {
    if !ctx.gateway.supports(ToolId::ScoreText) {
        return Ok(());
    }
    let req = ToolRequest::new(ToolId::ScoreText, ctx.config.tool_timeout())
        .input(job.path().join(CONTENTS_FILE));
    let output = match run_checked(ctx.gateway, &req) {
        Ok(out) => out,
        Err(e) => {
            warn!("{}: text scorer failed: {e}", job.identifier);
            return Ok(());
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let Ok(score) = stdout.trim().parse::<i32>() else {
        debug!("{}: unparseable text score {:?}", job.identifier, stdout.trim());
        return Ok(());
    };
    if score > ctx.config.text_quality_threshold || score < 0 {
        warn!(
            "{}: text scored {score} (threshold {}), discarding it",
            job.identifier, ctx.config.text_quality_threshold
        );
        job.metadata.set(BAD_TEXT_SCORE, score);
        remove_text(job.path());
        job.stats.text_source = TextSource::None;
        job.stats.duplicate_words = 0;
    }
    Ok(())
}

/// OCR the page images. The tool may answer with a word-box listing, which
/// gives the folder a sidecar, or with plain text.
fn ocr(job: &Job, ctx: &JobContext<'_>) -> Result<bool, StageError> {
    let required = ctx.config.ocr == OcrPolicy::Always;
    if !ctx.gateway.supports(ToolId::Ocr) {
        if required {
            return Err(StageError::Unsupported(ToolId::Ocr));
        }
        warn!("{}: no text and no OCR tool available", job.identifier);
        return Ok(false);
    }

    let dpi = job
        .metadata
        .get(IMAGES_DPI)
        .map(str::to_string)
        .unwrap_or_else(|| ctx.config.dpi.to_string());
    let out_file = job.scratch.path().join("ocr.txt");
    let req = ToolRequest::new(ToolId::Ocr, ctx.config.tool_timeout())
        .inputs(page_files(&job.path().join(PAGE_IMAGES_DIR)))
        .output_file(&out_file)
        .option("language", &ctx.config.language)
        .option("dpi", dpi);
    let raw = match run_checked(ctx.gateway, &req).and_then(|out| out.primary(&req)) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if required => return Err(e),
        Err(e) => {
            warn!("{}: OCR failed: {e}", job.identifier);
            return Ok(false);
        }
    };

    let contents = job.path().join(CONTENTS_FILE);
    let text = match listing::parse(&raw) {
        Ok(pages) if pages.iter().any(|p| !p.is_empty()) => {
            let mut writer =
                SidecarWriter::new(ctx.config.sidecar_version, ctx.config.language.clone());
            for page in &pages {
                writer.push_page(page);
            }
            let (text, sidecar) = writer.finish();
            sidecar.write(&job.path().join(SIDECAR_FILE))?;
            text
        }
        _ => TextStream::new(ctx.config.language.clone(), assemble_pages(&raw, &[])),
    };
    text.write(&contents)?;
    if text.is_blank() {
        remove_text(job.path());
        return Ok(false);
    }
    info!("{}: text from OCR", job.identifier);
    Ok(true)
}

// ── Separator sheets ─────────────────────────────────────────────────────

/// 0-based pages whose text carries the separator marker at least
/// `repeat` times.
pub fn separator_pages(text: &TextStream, marker: &str, repeat: usize) -> Vec<usize> {
    text.pages()
        .iter()
        .enumerate()
        .filter(|(_, page)| page.matches(marker).count() >= repeat)
        .map(|(i, _)| i)
        .collect()
}

/// Separator sheets from the dedicated tool when there is one, else from
/// the text.
fn find_separators(job: &Job, ctx: &JobContext<'_>, text: &TextStream) -> Vec<usize> {
    if ctx.gateway.supports(ToolId::FindSeparators) {
        let req = ToolRequest::new(ToolId::FindSeparators, ctx.config.tool_timeout())
            .inputs(page_files(&job.path().join(PAGE_IMAGES_DIR)));
        match run_checked(ctx.gateway, &req) {
            Ok(out) => {
                // the tool counts pages from 1
                let mut pages: Vec<usize> = String::from_utf8_lossy(&out.stdout)
                    .split_whitespace()
                    .filter_map(|t| t.parse::<usize>().ok())
                    .filter(|&p| p >= 1 && p <= job.stats.page_count)
                    .map(|p| p - 1)
                    .collect();
                pages.sort_unstable();
                pages.dedup();
                return pages;
            }
            Err(e) => warn!("{}: separator finder failed, using text: {e}", job.identifier),
        }
    }
    separator_pages(text, &ctx.config.separator_marker, ctx.config.separator_repeat)
}
