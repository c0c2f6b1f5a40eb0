//! Builds a text stream and its sidecar together so offsets always agree.

use crate::contents::{TextStream, PAGE_BREAK};
use crate::error::WbbError;
use crate::listing::ExtractedWord;
use crate::record::{WordBox, WordFlags};
use crate::sidecar::{Sidecar, Version};
use crate::{CONTENTS_FILE, SIDECAR_FILE};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, trace};
use unicode_normalization::UnicodeNormalization;

/// Accumulates pages of extracted words into a body text and a sidecar.
///
/// ```
/// use folio_wbb::{SidecarWriter, Version};
///
/// let mut writer = SidecarWriter::new(Version::V2, "en-US");
/// writer.push_page(&[]);
/// let (text, sidecar) = writer.finish();
/// assert_eq!(sidecar.pages.len(), 1);
/// assert_eq!(text.body, "\n");
/// ```
#[derive(Debug)]
pub struct SidecarWriter {
    sidecar: Sidecar,
    body: String,
    language: String,
    skip: BTreeSet<usize>,
    seen_pages: usize,
}

impl SidecarWriter {
    pub fn new(version: Version, language: impl Into<String>) -> Self {
        Self {
            sidecar: Sidecar::new(version),
            body: String::new(),
            language: language.into(),
            skip: BTreeSet::new(),
            seen_pages: 0,
        }
    }

    /// Input pages (1-based) to leave out, e.g. blank pages dropped from the
    /// page images.
    pub fn skip_pages(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        self.skip.extend(pages);
        self
    }

    /// Append one input page.
    pub fn push_page(&mut self, words: &[ExtractedWord]) {
        self.seen_pages += 1;
        if self.skip.contains(&self.seen_pages) {
            debug!("skipping dropped page {}", self.seen_pages);
            return;
        }

        let record_len = self.sidecar.version.record_len();
        if !self.sidecar.pages.is_empty() {
            self.body.push_str(PAGE_BREAK);
        }
        let mut page = Vec::with_capacity(words.len());
        let mut last_written = None;

        for w in words {
            // words made only of control characters carry no text
            if !w.text.chars().any(|c| c as u32 >= 0x20) {
                continue;
            }
            let offset = self.body.len() as u32;
            let ends_line = w.flags.contains(WordFlags::ENDS_LINE);
            let mut fragment = if w.flags.contains(WordFlags::HAS_HYPHEN) && ends_line {
                let mut s = w.text.clone();
                s.pop();
                s
            } else if ends_line {
                format!("{}\n", w.text)
            } else if w.flags.contains(WordFlags::ENDS_WORD) {
                format!("{} ", w.text)
            } else {
                w.text.clone()
            };
            if !fragment.is_empty() {
                fragment = fragment.nfc().collect();
                last_written = fragment.chars().last();
                self.body.push_str(&fragment);
            }
            page.push(WordBox {
                left: w.left,
                top: w.top,
                right: w.right,
                bottom: w.bottom,
                baseline: w.baseline,
                char_count: w.char_count().min(255) as u8,
                font_type: w.font_type,
                rotation: w.rotation,
                font_size: w.font_size,
                flags: w.flags,
                offset,
            });
        }
        if last_written != Some('\n') {
            self.body.push('\n');
        }
        trace!(
            "page {} -> {} boxes ({} bytes of record data)",
            self.seen_pages,
            page.len(),
            page.len() * record_len
        );
        self.sidecar.pages.push(page);
    }

    pub fn finish(self) -> (TextStream, Sidecar) {
        (TextStream::new(self.language, self.body), self.sidecar)
    }

    /// Write `contents.txt` and `wordbboxes` into `folder`.
    pub fn write_to(self, folder: &Path) -> Result<(TextStream, Sidecar), WbbError> {
        let (text, sidecar) = self.finish();
        text.write(&folder.join(CONTENTS_FILE))?;
        sidecar.write(&folder.join(SIDECAR_FILE))?;
        debug!(
            "wrote {} words over {} pages to {}",
            sidecar.word_count(),
            sidecar.pages.len(),
            folder.display()
        );
        Ok((text, sidecar))
    }
}
