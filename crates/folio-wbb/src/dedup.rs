//! Duplicate word-box cleanup.
//!
//! Some producers draw the same text twice (fake bold, shadow effects), so
//! the extractor reports two boxes at nearly the same place. The later copy is
//! removed from both the sidecar and the text stream, and every following
//! offset is shifted down by the bytes removed before it.

use crate::contents::TextStream;
use crate::error::WbbError;
use crate::record::WordBox;
use crate::sidecar::Sidecar;
use crate::{CONTENTS_FILE, SIDECAR_FILE};
use std::path::Path;
use tracing::{debug, info};

/// Two boxes are copies of each other when one covers more than this share of
/// the other's area.
pub const DUPLICATE_OVERLAP: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DedupReport {
    pub removed_words: usize,
    pub removed_bytes: usize,
}

fn is_duplicate(a: &WordBox, b: &WordBox) -> bool {
    (b.left >= a.left && b.percentage_overlap(a) > DUPLICATE_OVERLAP)
        || (a.left >= b.left && a.percentage_overlap(b) > DUPLICATE_OVERLAP)
}

/// Byte span of the word at `b.offset`, plus one trailing space if present.
fn word_span(body: &str, b: &WordBox) -> Option<(usize, usize)> {
    let start = b.offset as usize;
    let tail = body.get(start..)?;
    let stored = if b.has_hyphen() && b.ends_line() {
        usize::from(b.char_count).saturating_sub(1)
    } else {
        usize::from(b.char_count)
    };
    let mut len: usize = tail.chars().take(stored).map(char::len_utf8).sum();
    if tail.as_bytes().get(len) == Some(&b' ') {
        len += 1;
    }
    Some((start, start + len))
}

/// Remove duplicate boxes in place. Returns what was removed.
///
/// Boxes are visited in text order and each is compared against the boxes
/// already kept on its page, so after one pass no two kept boxes are
/// duplicates and a second pass changes nothing.
pub fn remove_duplicates(sidecar: &mut Sidecar, text: &mut TextStream) -> DedupReport {
    let mut kept_offsets = Vec::new();
    let mut dropped = Vec::new();

    for page in &mut sidecar.pages {
        let mut order: Vec<usize> = (0..page.len()).collect();
        order.sort_by_key(|&i| page[i].offset);

        let mut kept: Vec<usize> = Vec::with_capacity(page.len());
        let mut drop_flags = vec![false; page.len()];
        for i in order {
            if kept.iter().any(|&k| is_duplicate(&page[k], &page[i])) {
                drop_flags[i] = true;
            } else {
                kept.push(i);
            }
        }
        let mut idx = 0;
        page.retain(|b| {
            let keep = !drop_flags[idx];
            idx += 1;
            if keep {
                kept_offsets.push(b.offset as usize);
            } else {
                dropped.push(*b);
            }
            keep
        });
    }

    if dropped.is_empty() {
        return DedupReport::default();
    }

    // Text spans to splice out. A span that still holds a kept word's text is
    // left alone; only the record goes.
    kept_offsets.sort_unstable();
    let mut spans: Vec<(usize, usize)> = dropped
        .iter()
        .filter_map(|b| word_span(&text.body, b))
        .filter(|&(start, end)| {
            let first = kept_offsets.partition_point(|&o| o < start);
            kept_offsets.get(first).is_none_or(|&o| o >= end)
        })
        .collect();
    spans.sort_unstable();
    spans.dedup();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut body = String::with_capacity(text.body.len());
    let mut cursor = 0;
    for &(start, end) in &merged {
        body.push_str(&text.body[cursor..start]);
        cursor = end;
    }
    body.push_str(&text.body[cursor..]);
    let removed_bytes = text.body.len() - body.len();
    text.body = body;

    for page in &mut sidecar.pages {
        for b in page.iter_mut() {
            let offset = b.offset as usize;
            let shift: usize = merged
                .iter()
                .take_while(|&&(start, _)| start < offset)
                .map(|&(start, end)| end.min(offset) - start)
                .sum();
            b.offset = (offset - shift) as u32;
        }
    }

    debug!(
        "removed {} duplicate boxes ({} bytes of text)",
        dropped.len(),
        removed_bytes
    );
    DedupReport {
        removed_words: dropped.len(),
        removed_bytes,
    }
}

/// Run [`remove_duplicates`] over the sidecar and text stream in `folder`,
/// rewriting both files when anything was removed.
pub fn clean_overlays(folder: &Path) -> Result<DedupReport, WbbError> {
    let sidecar_path = folder.join(SIDECAR_FILE);
    let contents_path = folder.join(CONTENTS_FILE);
    if !sidecar_path.exists() || !contents_path.exists() {
        return Ok(DedupReport::default());
    }
    let mut sidecar = Sidecar::read(&sidecar_path)?;
    let mut text = TextStream::read(&contents_path)?;
    let report = remove_duplicates(&mut sidecar, &mut text);
    if report.removed_words > 0 {
        text.write(&contents_path)?;
        sidecar.write(&sidecar_path)?;
        info!(
            "cleaned {} duplicate word boxes in {}",
            report.removed_words,
            folder.display()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ExtractedWord;
    use crate::record::WordFlags;
    use crate::sidecar::Version;
    use crate::words::page_words;
    use crate::writer::SidecarWriter;

    fn at(text: &str, left: f32, top: f32, flags: WordFlags) -> ExtractedWord {
        ExtractedWord {
            text: text.into(),
            left,
            top,
            right: left + 8.0 * text.chars().count() as f32,
            bottom: top + 12.0,
            baseline: top + 10.0,
            rotation: 0,
            font_type: 0,
            font_name: None,
            font_size: 12.0,
            flags,
        }
    }

    /// "Bold" drawn twice, shifted by half a point.
    fn doubled() -> (TextStream, Sidecar) {
        let mut w = SidecarWriter::new(Version::V2, "en-US");
        w.push_page(&[
            at("Bold", 10.0, 10.0, WordFlags::ENDS_WORD),
            at("Bold", 10.5, 10.0, WordFlags::ENDS_WORD),
            at("text", 60.0, 10.0, WordFlags::ENDS_LINE),
        ]);
        w.push_page(&[at("next", 10.0, 10.0, WordFlags::ENDS_LINE)]);
        w.finish()
    }

    #[test]
    fn later_copy_is_removed_and_offsets_shift() {
        let (mut text, mut sidecar) = doubled();
        assert_eq!(text.body, "Bold Bold text\n\u{c}\nnext\n");

        let report = remove_duplicates(&mut sidecar, &mut text);
        assert_eq!(report.removed_words, 1);
        assert_eq!(report.removed_bytes, 5);
        assert_eq!(text.body, "Bold text\n\u{c}\nnext\n");
        assert_eq!(sidecar.pages.len(), 2);

        let words = page_words(&sidecar, &text).unwrap();
        let flat: Vec<&str> = words.iter().flatten().map(|w| w.text.as_str()).collect();
        assert_eq!(flat, vec!["Bold", "text", "next"]);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (mut text, mut sidecar) = doubled();
        remove_duplicates(&mut sidecar, &mut text);
        let (text_once, sidecar_once) = (text.clone(), sidecar.clone());

        let report = remove_duplicates(&mut sidecar, &mut text);
        assert_eq!(report, DedupReport::default());
        assert_eq!(text, text_once);
        assert_eq!(sidecar, sidecar_once);
    }

    #[test]
    fn triple_copies_collapse_to_one() {
        let mut w = SidecarWriter::new(Version::V1, "en-US");
        w.push_page(&[
            at("Shadow", 10.0, 10.0, WordFlags::ENDS_WORD),
            at("Shadow", 10.4, 10.2, WordFlags::ENDS_WORD),
            at("Shadow", 10.8, 10.4, WordFlags::ENDS_LINE),
        ]);
        let (mut text, mut sidecar) = w.finish();
        let report = remove_duplicates(&mut sidecar, &mut text);
        assert_eq!(report.removed_words, 2);
        assert_eq!(text.body, "Shadow \n");
        assert_eq!(remove_duplicates(&mut sidecar, &mut text).removed_words, 0);
    }

    #[test]
    fn folder_files_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let (text, sidecar) = doubled();
        text.write(&dir.path().join(CONTENTS_FILE)).unwrap();
        sidecar.write(&dir.path().join(SIDECAR_FILE)).unwrap();

        assert_eq!(clean_overlays(dir.path()).unwrap().removed_words, 1);
        assert_eq!(clean_overlays(dir.path()).unwrap().removed_words, 0);
        let text = TextStream::read(&dir.path().join(CONTENTS_FILE)).unwrap();
        assert_eq!(text.body, "Bold text\n\u{c}\nnext\n");
    }

    #[test]
    fn undecodable_text_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (text, sidecar) = doubled();
        let contents = dir.path().join(CONTENTS_FILE);
        let mut bytes = text.render().into_bytes();
        bytes.extend_from_slice(b"\xfe\xff\n");
        std::fs::write(&contents, &bytes).unwrap();
        sidecar.write(&dir.path().join(SIDECAR_FILE)).unwrap();

        let err = clean_overlays(dir.path()).unwrap_err();
        assert!(matches!(err, WbbError::InvalidText { .. }), "{err}");
        assert_eq!(std::fs::read(&contents).unwrap(), bytes);
        assert_eq!(Sidecar::read(&dir.path().join(SIDECAR_FILE)).unwrap(), sidecar);
    }

    #[test]
    fn missing_files_are_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clean_overlays(dir.path()).unwrap(), DedupReport::default());
    }
}
