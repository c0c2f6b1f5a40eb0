//! Rejoining paragraphs that a column or page break cut in two.

use super::lines::VisualWord;
use super::paragraphs::{BreakType, Paragraph, REFERENCE};

/// Characters that end a sentence (or a quotation/parenthesis around one).
const SENTENCE_END: &str = ".!?*)}]'\"";

/// Reading text of a word sequence. Line-end hyphens are elided except on
/// the very last word.
pub fn figure_text<'a>(words: impl IntoIterator<Item = &'a VisualWord>) -> String {
    let words: Vec<&VisualWord> = words.into_iter().collect();
    let mut t = String::new();
    for (i, w) in words.iter().enumerate() {
        let last = i + 1 == words.len();
        if w.ends_line() {
            if w.has_hyphen() && !last {
                let mut chars = w.text.chars();
                chars.next_back();
                t.push_str(chars.as_str());
            } else {
                t.push_str(&w.text);
                t.push(' ');
            }
        } else if w.ends_word() {
            t.push_str(&w.text);
            t.push(' ');
        } else {
            t.push_str(&w.text);
        }
    }
    t.trim().to_string()
}

/// Text of `first` continued by `second`, read as one paragraph.
pub fn merged_text(first: &Paragraph, second: &Paragraph) -> String {
    figure_text(first.words().chain(second.words()))
}

/// Does `para` continue `last` across a column (`co`) or page (`bp`) break?
pub fn samepara(last: &Paragraph, para: &Paragraph, join_pages: bool) -> bool {
    let Some(first_word) = para.first_word() else {
        return false;
    };
    let Some(first_char) = first_word.text.chars().next() else {
        return false;
    };
    let Some(last_char) = last.last_word().and_then(|w| w.text.chars().next_back()) else {
        return false;
    };

    let lower = first_char.is_lowercase();
    let flush = (para.indent() - para.lastleft()).abs() < para.avg_char_width();
    let reference_continues = last.breaktype == BreakType::Reference
        && (first_char.is_lowercase() || first_char.is_uppercase() || first_char.is_numeric())
        && !REFERENCE.is_match(&first_word.text);

    match para.breaktype {
        BreakType::Column => {
            (first_char.is_alphabetic() && para.lines().len() > 1 && flush)
                || (lower && flush)
                || reference_continues
                || unfinished_sentence(last, last_char)
        }
        BreakType::NewPage => {
            unfinished_sentence(last, last_char)
                || (join_pages
                    && (reference_continues || (lower && flush) || (lower && last_char == '-')))
        }
        _ => false,
    }
}

fn unfinished_sentence(last: &Paragraph, last_char: char) -> bool {
    last.lines().len() > 1 && !SENTENCE_END.contains(last_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::lines::{figure_lines, GapStats, LayoutItem};
    use crate::layout::paragraphs::figure_paragraphs;
    use crate::layout::testutil::{page, page_from};
    use crate::layout::LayoutThresholds;
    use folio_wbb::Word;

    fn paragraphs_of(words: &[Word], stats: &mut GapStats) -> Vec<Paragraph> {
        let t = LayoutThresholds::default();
        let lines = figure_lines(words.iter().map(LayoutItem::Word), &t, stats);
        figure_paragraphs(lines, &t)
    }

    #[test]
    fn lowercase_continuation_on_next_page_joins() {
        let mut stats = GapStats::new();
        let p1 = paragraphs_of(
            &page(&[
                (10.0, 10.0, "The quick brown fox jumps"),
                (10.0, 26.0, "over the lazy dog and con-"),
            ]),
            &mut stats,
        );
        let p2 = paragraphs_of(&page_from(54, &[(10.0, 10.0, "tinued running away.")]), &mut stats);
        assert_eq!(p1.len(), 1);
        assert_eq!(p2[0].breaktype, BreakType::NewPage);

        assert!(samepara(&p1[0], &p2[0], true));
        assert_eq!(
            merged_text(&p1[0], &p2[0]),
            "The quick brown fox jumps over the lazy dog and continued running away."
        );
        assert_eq!(p1[0].text(), "The quick brown fox jumps over the lazy dog and con-");
    }

    #[test]
    fn finished_sentence_and_capital_stays_apart() {
        let mut stats = GapStats::new();
        let p1 = paragraphs_of(
            &page(&[
                (10.0, 10.0, "The quick brown fox jumps"),
                (10.0, 26.0, "over the lazy dog."),
            ]),
            &mut stats,
        );
        let p2 = paragraphs_of(&page(&[(10.0, 10.0, "Another story begins.")]), &mut stats);
        assert!(!samepara(&p1[0], &p2[0], true));
    }

    #[test]
    fn page_joining_can_be_disabled() {
        let mut stats = GapStats::new();
        let p1 = paragraphs_of(&page(&[(10.0, 10.0, "a single line.")]), &mut stats);
        let p2 = paragraphs_of(&page(&[(10.0, 10.0, "lowercase start")]), &mut stats);
        assert!(samepara(&p1[0], &p2[0], true));
        assert!(!samepara(&p1[0], &p2[0], false));
    }

    #[test]
    fn other_breaktypes_never_join() {
        let mut stats = GapStats::new();
        let p1 = paragraphs_of(&page(&[(10.0, 10.0, "unfinished")]), &mut stats);
        let mut p2 = paragraphs_of(&page(&[(10.0, 10.0, "continuation")]), &mut stats);
        p2[0].breaktype = BreakType::Indent;
        assert!(!samepara(&p1[0], &p2[0], true));
    }
}
