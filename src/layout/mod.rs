//! Layout reconstruction: word boxes → lines → paragraphs → paragraph index.
//!
//! ## Pipeline Overview
//!
//! ```text
//! wordbboxes + contents.txt
//!  │
//!  ├─ 1. Words       pair every box with its text (folio_wbb::page_words)
//!  ├─ 2. Lines       glue glyph runs into visual words, break into lines
//!  ├─ 3. Paragraphs  ordered break heuristics, first match wins
//!  ├─ 4. Samepara    rejoin paragraphs split by a column or page break
//!  └─ 5. Index       paragraphs.txt + metadata `paragraph-ids`
//! ```
//!
//! Every empirical constant used by steps 2 and 3 lives in
//! [`LayoutThresholds`]. The defaults are the values the heuristics were
//! tuned with; they are overridable but should only be changed against a
//! reference corpus.
//!
//! Line statistics that span a whole document (the running height-adjusted
//! inter-word gap) are carried in an explicit [`GapStats`] value owned by the
//! caller, so documents processed concurrently never share state.

pub mod geometry;
pub mod index;
pub mod lines;
pub mod paragraphs;
pub mod samepara;

pub use geometry::Rect;
pub use index::{
    fingerprint, index_pages, process_folder, reindex_paragraphs, FolderLock, ParagraphIndex,
    ParagraphIndexEntry, PARAGRAPHS_FILE,
};
pub use lines::{figure_lines, GapStats, LayoutItem, Line, LineBreak, VisualWord};
pub use paragraphs::{figure_paragraphs, is_fancy, BreakType, Fancy, Paragraph};
pub use samepara::{figure_text, merged_text, samepara};

use serde::{Deserialize, Serialize};

/// Tunable constants of the layout heuristics.
///
/// Distances suffixed `_chars` are multiples of an average character width;
/// `_points` are absolute page units; `_factor` and `_ratio` are unitless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutThresholds {
    // ── Word and line grouping ────────────────────────────────────────────
    /// A glyph run further than this from the current visual word starts a
    /// new word. Default: 2.0.
    pub word_gap_chars: f32,

    /// Any horizontal jump wider than this breaks the line. Default: 72.0.
    pub max_gap_points: f32,

    /// Gap that breaks a line holding a single word. Default: 4.0.
    pub single_word_gap_chars: f32,

    /// Gap, relative to the line's average inter-word gap, that breaks a
    /// multi-word line. Default: 3.0.
    pub interword_gap_factor: f32,

    /// Gap, in the line's character widths, that breaks a multi-word line.
    /// Default: 2.0.
    pub line_gap_chars: f32,

    /// Gap, relative to the document-wide height-adjusted inter-word gap,
    /// that breaks a multi-word line. Default: 4.0.
    pub adjusted_gap_factor: f32,

    /// Height ratio between a line and an incoming word treated as a font
    /// size jump. Default: 1.8.
    pub font_jump_ratio: f32,

    /// The font size check only applies once a line holds more characters
    /// than this. Default: 5.
    pub font_jump_min_chars: usize,

    /// Downward step, in word heights, that breaks a line when extractor
    /// newlines are ignored. Default: 0.8.
    pub vertical_step: f32,

    /// Trust the extractor's end-of-line flags when grouping. Default: true.
    pub respect_newlines: bool,

    // ── Paragraph breaking ────────────────────────────────────────────────
    /// Indent that opens a new paragraph (`in`). Default: 1.5.
    pub indent_chars: f32,

    /// Indent after a styled header line (`if`). Default: 2.0.
    pub fancy_indent_chars: f32,

    /// Outdent that opens a new paragraph (`ou`). Default: 5.0.
    pub outdent_points: f32,

    /// Gap, relative to the paragraph's average line spacing, that opens a
    /// new paragraph (`ls`). Default: 1.5.
    pub line_spacing_factor: f32,

    /// Assumed line spacing of a one-line paragraph, as a share of its
    /// tallest line. Default: 0.2.
    pub single_line_spacing: f32,

    /// Relative line height difference that counts as a font change (`lh`,
    /// and the height test of "fancy" styling). Default: 0.3.
    pub line_height_ratio: f32,

    /// First and last lines of a paragraph count as the same height below
    /// this relative difference. Default: 0.1.
    pub fancy_same_height: f32,

    /// Gap to the previous line's right edge that starts a new column
    /// (second `co` test). Default: 5.0.
    pub column_gap_chars: f32,

    /// Width increase after a "By" line that marks the story start (`by`).
    /// Default: 7.0.
    pub byline_width_chars: f32,

    /// Share of a word's area inside the current paragraph below which the
    /// word counts as outside it. Default: 0.001.
    pub overlap_epsilon: f32,

    /// Horizontal slack for reference and bullet marker alignment.
    /// Default: 1.0.
    pub align_tolerance: f32,

    /// Let `samepara` join paragraphs across page breaks. Default: true.
    pub join_pages: bool,
}

impl Default for LayoutThresholds {
    fn default() -> Self {
        Self {
            word_gap_chars: 2.0,
            max_gap_points: 72.0,
            single_word_gap_chars: 4.0,
            interword_gap_factor: 3.0,
            line_gap_chars: 2.0,
            adjusted_gap_factor: 4.0,
            font_jump_ratio: 1.8,
            font_jump_min_chars: 5,
            vertical_step: 0.8,
            respect_newlines: true,
            indent_chars: 1.5,
            fancy_indent_chars: 2.0,
            outdent_points: 5.0,
            line_spacing_factor: 1.5,
            single_line_spacing: 0.2,
            line_height_ratio: 0.3,
            fancy_same_height: 0.1,
            column_gap_chars: 5.0,
            byline_width_chars: 7.0,
            overlap_epsilon: 0.001,
            align_tolerance: 1.0,
            join_pages: true,
        }
    }
}

impl LayoutThresholds {
    /// Read thresholds from a TOML table; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_tuned_values() {
        let t = LayoutThresholds::default();
        assert_eq!(t.indent_chars, 1.5);
        assert_eq!(t.vertical_step, 0.8);
        assert_eq!(t.line_height_ratio, 0.3);
        assert_eq!(t.font_jump_ratio, 1.8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let t = LayoutThresholds::from_toml_str("indent_chars = 2.5\njoin_pages = false\n").unwrap();
        assert_eq!(t.indent_chars, 2.5);
        assert!(!t.join_pages);
        assert_eq!(t.outdent_points, 5.0);
    }
}
