//! Pairs each decoded box with its text from the text stream.

use crate::contents::TextStream;
use crate::error::WbbError;
use crate::listing::ExtractedWord;
use crate::record::WordBox;
use crate::sidecar::Sidecar;

/// A word box together with the word it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub bbox: WordBox,
    pub text: String,
}

/// Re-extract a stored word, e.g. to write it into another sidecar. The font
/// name is not stored and comes back empty.
impl From<&Word> for ExtractedWord {
    fn from(w: &Word) -> Self {
        ExtractedWord {
            text: w.text.clone(),
            left: w.bbox.left,
            top: w.bbox.top,
            right: w.bbox.right,
            bottom: w.bbox.bottom,
            baseline: w.bbox.baseline,
            rotation: w.bbox.rotation,
            font_type: w.bbox.font_type,
            font_name: None,
            font_size: w.bbox.font_size,
            flags: w.bbox.flags,
        }
    }
}

/// Resolve the text of every box, page by page.
///
/// Words written with an inserted line-end hyphen had the hyphen removed from
/// the text stream; it is restored here so the word reads as extracted.
pub fn page_words(sidecar: &Sidecar, text: &TextStream) -> Result<Vec<Vec<Word>>, WbbError> {
    let body = text.body.as_str();
    sidecar
        .pages
        .iter()
        .map(|page| {
            page.iter()
                .map(|b| {
                    let start = b.offset as usize;
                    let tail = body.get(start..).ok_or(WbbError::OffsetOutOfRange {
                        offset: b.offset,
                        len: body.len(),
                    })?;
                    let stored = if b.has_hyphen() && b.ends_line() {
                        usize::from(b.char_count).saturating_sub(1)
                    } else {
                        usize::from(b.char_count)
                    };
                    let mut word: String = tail.chars().take(stored).collect();
                    if b.has_hyphen() && b.ends_line() {
                        word.push('-');
                    }
                    Ok(Word { bbox: *b, text: word })
                })
                .collect()
        })
        .collect()
}

/// Byte length the word occupies in the text stream, excluding the space or
/// newline that may follow it.
pub fn stored_len(word: &Word) -> usize {
    if word.bbox.has_hyphen() && word.bbox.ends_line() {
        word.text.len().saturating_sub(1)
    } else {
        word.text.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ExtractedWord;
    use crate::record::WordFlags;
    use crate::sidecar::Version;
    use crate::writer::SidecarWriter;

    fn ew(text: &str, flags: WordFlags) -> ExtractedWord {
        ExtractedWord {
            text: text.into(),
            left: 0.0,
            top: 0.0,
            right: 10.0,
            bottom: 10.0,
            baseline: 9.0,
            rotation: 0,
            font_type: 0,
            font_name: None,
            font_size: 10.0,
            flags,
        }
    }

    #[test]
    fn resolves_text_and_restores_hyphen() {
        let mut w = SidecarWriter::new(Version::V2, "en-US");
        w.push_page(&[
            ew("Ein", WordFlags::ENDS_WORD),
            ew("Über-", WordFlags::ENDS_LINE | WordFlags::HAS_HYPHEN),
            ew("gang", WordFlags::ENDS_LINE),
        ]);
        let (text, sidecar) = w.finish();
        let pages = page_words(&sidecar, &text).unwrap();
        let words: Vec<&str> = pages[0].iter().map(|w| w.text.as_str()).collect();
        assert_eq!(words, vec!["Ein", "Über-", "gang"]);
        assert_eq!(stored_len(&pages[0][1]), "Über".len());
    }

    #[test]
    fn offset_past_end_is_an_error() {
        let sidecar = Sidecar {
            version: Version::V2,
            pages: vec![vec![WordBox {
                offset: 99,
                char_count: 1,
                ..WordBox::default()
            }]],
        };
        let text = TextStream::new("en", "short");
        assert!(matches!(
            page_words(&sidecar, &text),
            Err(WbbError::OffsetOutOfRange { offset: 99, .. })
        ));
    }
}
