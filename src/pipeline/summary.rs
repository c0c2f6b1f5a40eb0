//! `Summarize`: a one-line display summary from the start of the text.
//!
//! ## Rule Order
//!
//! Invisible characters go first so they cannot hide a line break. Line
//! breaks become ` / ` before whitespace is collapsed, otherwise the breaks
//! would be gone. Leading punctuation is stripped last, after the string has
//! settled.

use super::job::{Job, JobContext};
use crate::error::StageError;
use crate::metadata::SUMMARY;
use folio_wbb::{TextStream, CONTENTS_FILE};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const SUMMARY_FILE: &str = "summary.txt";

/// Build a summary of at most `max_chars` characters.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Replace each run of line breaks (and page breaks) with ` / `
/// 3. Collapse remaining whitespace to single spaces
/// 4. Drop leading characters that are not letters or digits
/// 5. Truncate
pub fn summarize_text(text: &str, max_chars: usize) -> String {
    let s = remove_invisible_chars(text);
    let s = join_lines(&s);
    let s = collapse_whitespace(&s);
    let s = strip_leading_punctuation(&s);
    s.chars().take(max_chars).collect()
}

// ── Rule 1: Strip invisible characters ───────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Line breaks ──────────────────────────────────────────────────

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\s*[\n\x0c])+\s*").expect("valid regex"));

fn join_lines(input: &str) -> String {
    RE_LINE_BREAKS.replace_all(input.trim(), " / ").into_owned()
}

// ── Rule 3: Whitespace ───────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").into_owned()
}

// ── Rule 4: Leading punctuation ──────────────────────────────────────────

fn strip_leading_punctuation(input: &str) -> &str {
    input.trim_start_matches(|c: char| !c.is_alphanumeric())
}

// ── Stage ────────────────────────────────────────────────────────────────

/// Write `summary.txt` and the `summary` metadata field. A summary carried
/// over from a prepared folder is kept.
pub fn summarize(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), StageError> {
    let path = job.path().join(SUMMARY_FILE);
    let summary = if path.is_file() {
        let kept = std::fs::read_to_string(&path).map_err(|e| StageError::io(&path, e))?;
        kept.trim().to_string()
    } else {
        let contents = job.path().join(CONTENTS_FILE);
        if !contents.exists() {
            return Ok(());
        }
        let text = TextStream::read(&contents)?;
        summarize_text(&text.body, ctx.config.summary_length)
    };
    if summary.is_empty() {
        debug!("{}: nothing to summarize", job.identifier);
        return Ok(());
    }
    std::fs::write(&path, &summary).map_err(|e| StageError::io(&path, e))?;
    job.metadata.set(SUMMARY, &summary);
    Ok(())
}
