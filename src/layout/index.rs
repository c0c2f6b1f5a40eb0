//! `paragraphs.txt`: the per-document paragraph index.
//!
//! One line per paragraph:
//!
//! ```text
//! page start end left top width height chars breaktype fingerprint
//! ```
//!
//! `start`/`end` are byte offsets into the body of `contents.txt`. The
//! fingerprint is the SHA-256 of the paragraph's normalized text; when a
//! paragraph continues the previous one across a column or page break, it is
//! the fingerprint of the joined text instead. The fingerprints of all
//! paragraphs longer than four characters (joined ones counted once) are also
//! stored in the metadata field `paragraph-ids`.

use super::lines::{figure_lines, GapStats, LayoutItem};
use super::paragraphs::{figure_paragraphs, BreakType, Paragraph};
use super::samepara::{merged_text, samepara};
use super::LayoutThresholds;
use crate::error::StageError;
use crate::metadata::{Metadata, METADATA_FILE, PARAGRAPH_IDS};
use folio_wbb::{page_words, Sidecar, TextStream, Word, CONTENTS_FILE, SIDECAR_FILE};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const PARAGRAPHS_FILE: &str = "paragraphs.txt";

/// Advisory lock file taken by out-of-band passes over a document folder.
pub const LOCK_FILE: &str = ".folio-lock";

/// Paragraphs this short are indexed but never fingerprinted into
/// `paragraph-ids`.
const MIN_ID_CHARS: usize = 5;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Hex SHA-256 of `text` lower-cased, with `,` `'` `-` removed and every run
/// of non-word characters collapsed to one space.
pub fn fingerprint(text: &str) -> String {
    let lowered = text.to_lowercase().replace([',', '\'', '-'], "");
    let normalized = NON_WORD.replace_all(&lowered, " ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphIndexEntry {
    /// 0-based page index.
    pub page: usize,
    pub start: usize,
    /// One past the last byte of the paragraph's last word.
    pub end: usize,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub char_count: usize,
    pub breaktype: BreakType,
    pub fingerprint: String,
}

impl fmt::Display for ParagraphIndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:5} {:6} {:6} {:5} {:5} {:5} {:5} {:5} {} {}",
            self.page,
            self.start,
            self.end,
            self.left,
            self.top,
            self.width,
            self.height,
            self.char_count,
            self.breaktype,
            self.fingerprint
        )
    }
}

impl FromStr for ParagraphIndexEntry {
    type Err = StageError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [page, start, end, left, top, width, height, chars, breaktype, fp] = fields[..] else {
            return Err(StageError::Malformed(format!(
                "paragraph index line has {} fields: '{line}'",
                fields.len()
            )));
        };
        fn num<T: FromStr>(s: &str, line: &str) -> Result<T, StageError> {
            s.parse()
                .map_err(|_| StageError::Malformed(format!("bad number '{s}' in '{line}'")))
        }
        Ok(Self {
            page: num(page, line)?,
            start: num(start, line)?,
            end: num(end, line)?,
            left: num(left, line)?,
            top: num(top, line)?,
            width: num(width, line)?,
            height: num(height, line)?,
            char_count: num(chars, line)?,
            breaktype: breaktype.parse()?,
            fingerprint: fp.to_string(),
        })
    }
}

impl ParagraphIndexEntry {
    fn new(page: usize, para: &Paragraph, char_count: usize, fingerprint: String) -> Option<Self> {
        let first = para.first_word()?;
        let last = para.last_word()?;
        let r = para.rect();
        Some(Self {
            page,
            start: first.offset as usize,
            end: last.offset as usize + last.stored_len(),
            left: r.left as i64,
            top: r.top as i64,
            width: r.width() as i64,
            height: r.height() as i64,
            char_count,
            breaktype: para.breaktype,
            fingerprint,
        })
    }
}

/// All entries of one document plus its paragraph ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphIndex {
    pub entries: Vec<ParagraphIndexEntry>,
    pub ids: Vec<String>,
}

impl ParagraphIndex {
    pub fn render(&self) -> String {
        self.entries.iter().map(|e| format!("{e}\n")).collect()
    }

    /// Parse `paragraphs.txt`. Ids are not stored there and come back empty.
    pub fn parse(text: &str) -> Result<Self, StageError> {
        let entries = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            entries,
            ids: Vec::new(),
        })
    }

    pub fn read(path: &Path) -> Result<Self, StageError> {
        let text = std::fs::read_to_string(path).map_err(|e| StageError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn write(&self, path: &Path) -> Result<(), StageError> {
        std::fs::write(path, self.render()).map_err(|e| StageError::io(path, e))
    }
}

/// Run line and paragraph reconstruction over every page of a document and
/// build its index. Paragraph joining carries across pages.
pub fn index_pages(pages: &[Vec<Word>], t: &LayoutThresholds) -> ParagraphIndex {
    let mut index = ParagraphIndex::default();
    let mut stats = GapStats::new();
    let mut lastpara: Option<Paragraph> = None;

    for (page, words) in pages.iter().enumerate() {
        if words.is_empty() {
            continue;
        }
        let lines = figure_lines(words.iter().map(LayoutItem::Word), t, &mut stats);
        let nlines = lines.len();
        let paragraphs = figure_paragraphs(lines, t);
        debug!(page, lines = nlines, paragraphs = paragraphs.len(), "page laid out");

        for para in paragraphs {
            let same = lastpara
                .as_ref()
                .is_some_and(|last| samepara(last, &para, t.join_pages));
            let text = para.text();
            let fp = match (&lastpara, same) {
                (Some(last), true) => fingerprint(&merged_text(last, &para)),
                _ => fingerprint(&text),
            };
            let char_count = text.chars().count();
            let Some(entry) = ParagraphIndexEntry::new(page, &para, char_count, fp.clone()) else {
                continue;
            };
            index.entries.push(entry);

            if char_count >= MIN_ID_CHARS {
                match index.ids.last_mut() {
                    Some(prev) if same => *prev = fp,
                    _ => index.ids.push(fp),
                }
                lastpara = Some(para);
            }
        }
    }
    index
}

/// Rebuild `paragraphs.txt` and `paragraph-ids` for a document folder.
///
/// Returns `Ok(None)` when the folder has no word-box sidecar.
pub fn process_folder(
    folder: &Path,
    t: &LayoutThresholds,
) -> Result<Option<ParagraphIndex>, StageError> {
    let sidecar_path = folder.join(SIDECAR_FILE);
    if !sidecar_path.exists() {
        debug!("no {SIDECAR_FILE} in {}, skipping paragraphs", folder.display());
        return Ok(None);
    }
    let sidecar = Sidecar::read(&sidecar_path)?;
    let text = TextStream::read(&folder.join(CONTENTS_FILE))?;
    let pages = page_words(&sidecar, &text)?;

    let index = index_pages(&pages, t);
    index.write(&folder.join(PARAGRAPHS_FILE))?;
    if !index.ids.is_empty() {
        let path = folder.join(METADATA_FILE);
        let update: Metadata = [(PARAGRAPH_IDS, index.ids.join(", "))].into_iter().collect();
        Metadata::update_file(&path, &update).map_err(|e| StageError::io(&path, e))?;
    }
    info!(
        "indexed {} paragraphs ({} ids) in {}",
        index.entries.len(),
        index.ids.len(),
        folder.display()
    );
    Ok(Some(index))
}

/// An advisory lock on a document folder, released on drop.
#[derive(Debug)]
pub struct FolderLock {
    path: PathBuf,
}

impl FolderLock {
    /// Create the lock file, retrying until `timeout` while another holder
    /// has it.
    pub fn acquire(folder: &Path, timeout: Duration) -> Result<Self, StageError> {
        let path = folder.join(LOCK_FILE);
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(StageError::Locked { path });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(StageError::io(&path, e)),
            }
        }
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}

/// [`process_folder`] under the folder's advisory lock.
pub fn reindex_paragraphs(
    folder: &Path,
    t: &LayoutThresholds,
    lock_timeout: Duration,
) -> Result<Option<ParagraphIndex>, StageError> {
    let _lock = FolderLock::acquire(folder, lock_timeout)?;
    process_folder(folder, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::testutil::{page, page_from};
    use folio_wbb::{ExtractedWord, SidecarWriter, Version};

    fn two_pages() -> Vec<Vec<Word>> {
        vec![
            page(&[
                (10.0, 10.0, "The quick brown fox jumps"),
                (10.0, 26.0, "over the lazy dog and con-"),
            ]),
            page_from(54, &[(10.0, 10.0, "tinued running away.")]),
        ]
    }

    fn extracted(w: &Word) -> ExtractedWord {
        ExtractedWord {
            text: w.text.clone(),
            left: w.bbox.left,
            top: w.bbox.top,
            right: w.bbox.right,
            bottom: w.bbox.bottom,
            baseline: w.bbox.baseline,
            rotation: 0,
            font_type: 0,
            font_name: None,
            font_size: w.bbox.font_size,
            flags: w.bbox.flags,
        }
    }

    #[test]
    fn fingerprint_normalizes_text() {
        assert_eq!(fingerprint("Hello, World!"), fingerprint("hello world"));
        assert_eq!(fingerprint("don't re-enter"), fingerprint("dont reenter"));
        assert_ne!(fingerprint("one"), fingerprint("two"));
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn continued_paragraph_shares_one_id() {
        let index = index_pages(&two_pages(), &LayoutThresholds::default());
        assert_eq!(index.entries.len(), 2);
        let joined =
            fingerprint("The quick brown fox jumps over the lazy dog and continued running away.");
        assert_eq!(index.ids, vec![joined.clone()]);
        assert_eq!(index.entries[1].fingerprint, joined);
        assert_eq!(index.entries[1].breaktype, BreakType::NewPage);

        let first = &index.entries[0];
        assert_eq!((first.page, first.start, first.end), (0, 0, 51));
        assert_eq!((first.left, first.top, first.height), (10, 10, 28));
        let second = &index.entries[1];
        assert_eq!((second.page, second.start, second.end), (1, 54, 74));
    }

    #[test]
    fn without_page_joining_ids_are_separate() {
        let t = LayoutThresholds {
            join_pages: false,
            ..Default::default()
        };
        // the first paragraph ends mid-sentence over two lines, which joins
        // regardless of the page flag
        let index = index_pages(&two_pages(), &t);
        assert_eq!(index.ids.len(), 1);

        let pages = vec![
            page(&[(10.0, 10.0, "a single line")]),
            page_from(15, &[(10.0, 10.0, "lowercase start")]),
        ];
        assert_eq!(index_pages(&pages, &t).ids.len(), 2);
        assert_eq!(index_pages(&pages, &LayoutThresholds::default()).ids.len(), 1);
    }

    #[test]
    fn entry_line_format() {
        let index = index_pages(&two_pages(), &LayoutThresholds::default());
        let text = index.render();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("    0      0     51    10    10"), "got: {first}");
        let parsed = ParagraphIndex::parse(&text).unwrap();
        assert_eq!(parsed.entries, index.entries);
        assert!(ParagraphIndex::parse("1 2 3\n").is_err());
    }

    #[test]
    fn folder_is_indexed_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SidecarWriter::new(Version::V2, "en-US");
        for p in two_pages() {
            writer.push_page(&p.iter().map(extracted).collect::<Vec<_>>());
        }
        writer.write_to(dir.path()).unwrap();

        let t = LayoutThresholds::default();
        let index = process_folder(dir.path(), &t).unwrap().unwrap();
        assert_eq!(index.entries, index_pages(&two_pages(), &t).entries);

        let meta = Metadata::read(&dir.path().join(METADATA_FILE)).unwrap();
        assert_eq!(meta.get(PARAGRAPH_IDS), Some(index.ids[0].as_str()));
        let on_disk = ParagraphIndex::read(&dir.path().join(PARAGRAPHS_FILE)).unwrap();
        assert_eq!(on_disk.entries, index.entries);
    }

    #[test]
    fn folder_without_sidecar_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(process_folder(dir.path(), &LayoutThresholds::default())
            .unwrap()
            .is_none());
        assert!(!dir.path().join(PARAGRAPHS_FILE).exists());
    }

    #[test]
    fn lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let held = FolderLock::acquire(dir.path(), Duration::from_millis(10)).unwrap();
        let err = FolderLock::acquire(dir.path(), Duration::from_millis(60)).unwrap_err();
        assert!(matches!(err, StageError::Locked { .. }));
        drop(held);
        assert!(!dir.path().join(LOCK_FILE).exists());

        let t = LayoutThresholds::default();
        assert!(reindex_paragraphs(dir.path(), &t, Duration::from_millis(10))
            .unwrap()
            .is_none());
        assert!(!dir.path().join(LOCK_FILE).exists());
    }
}
