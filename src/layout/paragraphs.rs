//! Lines → paragraphs.
//!
//! Each incoming line is compared against the paragraph being built. The
//! break tests run in a fixed order and the first one that fires closes the
//! paragraph; its [`BreakType`] tags the paragraph that starts with the line.
//! When none fires the line extends the current paragraph. The first
//! paragraph of every page is tagged [`BreakType::NewPage`].

use super::geometry::Rect;
use super::lines::{lineheight_difference, Line, VisualWord};
use super::samepara::figure_text;
use super::LayoutThresholds;
use crate::error::StageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// `[12]`, `12.` or `[Knu84]` at the start of a line.
pub(crate) static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[[0-9]+\]|[0-9]+\.|\[[A-Za-z0-9]+\])").expect("valid regex"));

static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\u{2022}\s+").expect("valid regex"));

/// Why a paragraph boundary was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BreakType {
    /// `bp`: first paragraph on a page
    NewPage,
    /// `co`: a new column
    Column,
    /// `in`
    Indent,
    /// `if`: indented line after a styled header
    IndentAfterFancy,
    /// `ou`
    Outdent,
    /// `rf`: reference list entry
    Reference,
    /// `bu`
    Bullet,
    /// `ls`: unusually wide line spacing
    LineSpacing,
    /// `lh`: line height change
    LineHeight,
    /// `sh`: end of a section header
    SectionHeader,
    /// `vb`: line above the paragraph
    VerticalBreak,
    /// `sb`: line left of the previous one
    SectionBreak,
    /// `lb`: gap taller than either line
    WideGap,
    /// `by`: story start after a byline
    Byline,
    /// `im`: embedded picture
    Image,
}

impl BreakType {
    pub const ALL: [BreakType; 15] = [
        BreakType::NewPage,
        BreakType::Column,
        BreakType::Indent,
        BreakType::IndentAfterFancy,
        BreakType::Outdent,
        BreakType::Reference,
        BreakType::Bullet,
        BreakType::LineSpacing,
        BreakType::LineHeight,
        BreakType::SectionHeader,
        BreakType::VerticalBreak,
        BreakType::SectionBreak,
        BreakType::WideGap,
        BreakType::Byline,
        BreakType::Image,
    ];

    /// The two-letter tag written to `paragraphs.txt`.
    pub fn code(self) -> &'static str {
        match self {
            BreakType::NewPage => "bp",
            BreakType::Column => "co",
            BreakType::Indent => "in",
            BreakType::IndentAfterFancy => "if",
            BreakType::Outdent => "ou",
            BreakType::Reference => "rf",
            BreakType::Bullet => "bu",
            BreakType::LineSpacing => "ls",
            BreakType::LineHeight => "lh",
            BreakType::SectionHeader => "sh",
            BreakType::VerticalBreak => "vb",
            BreakType::SectionBreak => "sb",
            BreakType::WideGap => "lb",
            BreakType::Byline => "by",
            BreakType::Image => "im",
        }
    }
}

impl fmt::Display for BreakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BreakType {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BreakType::ALL
            .into_iter()
            .find(|b| b.code() == s)
            .ok_or_else(|| StageError::Malformed(format!("unknown breaktype '{s}'")))
    }
}

impl From<BreakType> for String {
    fn from(b: BreakType) -> Self {
        b.code().to_string()
    }
}

impl TryFrom<String> for BreakType {
    type Error = StageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Lines grouped into one block, tagged with why the block started.
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub breaktype: BreakType,
    lines: Vec<Line>,
    rect: Rect,
    indent: f32,
    lastleft: f32,
    line_spacing_accum: f32,
    center_accum: f32,
    charwidth_accum: f32,
}

impl Paragraph {
    pub fn new(breaktype: BreakType) -> Self {
        Self {
            breaktype,
            lines: Vec::new(),
            rect: Rect::empty(),
            indent: 0.0,
            lastleft: 0.0,
            line_spacing_accum: 0.0,
            center_accum: 0.0,
            charwidth_accum: 0.0,
        }
    }

    pub fn add(&mut self, line: Line) {
        match self.lines.last() {
            Some(prev) => self.line_spacing_accum += (line.top() - prev.bottom()).max(0.0),
            None => self.indent = line.left(),
        }
        self.lastleft = line.left();
        self.rect.expand(&line.rect());
        self.center_accum += line.rect().center_x();
        self.charwidth_accum += line.avg_char_width();
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn left(&self) -> f32 {
        self.rect.left
    }

    pub fn right(&self) -> f32 {
        self.rect.right
    }

    /// Left edge of the first line.
    pub fn indent(&self) -> f32 {
        self.indent
    }

    /// Left edge of the last line.
    pub fn lastleft(&self) -> f32 {
        self.lastleft
    }

    pub fn first_line(&self) -> Option<&Line> {
        self.lines.first()
    }

    pub fn last_line(&self) -> Option<&Line> {
        self.lines.last()
    }

    pub fn words(&self) -> impl Iterator<Item = &VisualWord> {
        self.lines.iter().flat_map(|l| l.words().iter())
    }

    pub fn first_word(&self) -> Option<&VisualWord> {
        self.lines.first().and_then(|l| l.words().first())
    }

    pub fn last_word(&self) -> Option<&VisualWord> {
        self.lines.last().and_then(|l| l.words().last())
    }

    pub fn nwords(&self) -> usize {
        self.lines.iter().map(|l| l.words().len()).sum()
    }

    /// Mean of the lines' average character widths.
    pub fn avg_char_width(&self) -> f32 {
        match self.lines.len() {
            0 => 0.0,
            n => self.charwidth_accum / n as f32,
        }
    }

    pub fn avg_center_position(&self) -> f32 {
        match self.lines.len() {
            0 => 0.0,
            n => self.center_accum / n as f32,
        }
    }

    pub fn max_line_height(&self) -> f32 {
        self.lines.iter().map(Line::height).fold(0.0, f32::max)
    }

    pub fn avg_line_spacing(&self, t: &LayoutThresholds) -> f32 {
        match self.lines.len() {
            0 | 1 => self.max_line_height() * t.single_line_spacing,
            n => self.line_spacing_accum / (n - 1) as f32,
        }
    }

    pub fn text(&self) -> String {
        figure_text(self.words())
    }

    pub fn all_caps(&self) -> bool {
        all_caps(&self.text())
    }
}

fn all_caps(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_uppercase()) && !text.chars().any(|c| c.is_ascii_lowercase())
}

/// Styling shared by a paragraph's first and last lines but not by a
/// candidate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fancy {
    Italic,
    Bold,
    Caps,
    LineHeight,
}

fn fancy_between(
    first: &Line,
    last: &Line,
    nlines: usize,
    caps: bool,
    line: &Line,
    t: &LayoutThresholds,
) -> Option<Fancy> {
    if first.is_italic() && last.is_italic() && !line.is_italic() {
        Some(Fancy::Italic)
    } else if first.is_bold() && last.is_bold() && !line.is_bold() {
        Some(Fancy::Bold)
    } else if caps && line.text().chars().any(|c| c.is_ascii_lowercase()) {
        Some(Fancy::Caps)
    } else if nlines > 1
        && lineheight_difference(first, last) < t.fancy_same_height
        && lineheight_difference(last, line) > t.line_height_ratio
    {
        Some(Fancy::LineHeight)
    } else {
        None
    }
}

/// Is `para` styled differently from `line`?
pub fn is_fancy(para: &Paragraph, line: &Line, t: &LayoutThresholds) -> Option<Fancy> {
    let (first, last) = (para.first_line()?, para.last_line()?);
    fancy_between(first, last, para.lines.len(), para.all_caps(), line, t)
}

/// Is `line` on its own styled differently from the last line of `para`?
fn is_fancy_line(line: &Line, para: &Paragraph, t: &LayoutThresholds) -> Option<Fancy> {
    let last = para.last_line()?;
    fancy_between(line, line, 1, all_caps(&line.text()), last, t)
}

fn starts_with_capital(w: &VisualWord) -> bool {
    w.text.chars().next().is_some_and(char::is_uppercase)
}

/// First break test that fires for `line` against `current`.
fn classify(
    current: &Paragraph,
    line: &Line,
    column_lines: usize,
    t: &LayoutThresholds,
) -> Option<BreakType> {
    let first_word = line.words().first()?;
    let picture = first_word.is_image.then_some(BreakType::Image);
    let Some(lastline) = current.last_line() else {
        return picture;
    };

    let n = current.lines.len();
    let acw = current.avg_char_width();
    let indent = line.left() - current.lastleft();
    let cocenter = (current.avg_center_position() - line.rect().center_x()).abs();
    let outside = first_word.rect.percentage_overlap(&current.rect()) < t.overlap_epsilon;

    if line.left() > lastline.right() && line.bottom() < lastline.top() && outside {
        return Some(BreakType::Column);
    }
    if indent > t.indent_chars * acw
        && (column_lines < 2 || n > 1)
        && !matches!(current.breaktype, BreakType::Reference | BreakType::Bullet)
        && (current.right() - line.right()).abs() < acw
        && outside
    {
        return Some(BreakType::Indent);
    }
    if indent > t.fancy_indent_chars * acw && is_fancy(current, line, t).is_some() {
        return Some(BreakType::IndentAfterFancy);
    }
    let fancy_line = is_fancy_line(line, current, t).is_some();
    if (current.breaktype == BreakType::Column || cocenter > acw || fancy_line)
        && current.lastleft() - line.left() > t.outdent_points
        && current.left() - line.left() > t.outdent_points
        && (n > 1 || fancy_line)
    {
        return Some(BreakType::Outdent);
    }
    let text = line.text();
    if REFERENCE.is_match(&text)
        && (current
            .first_word()
            .is_some_and(|w| REFERENCE.is_match(&w.text))
            || (current
                .last_word()
                .is_some_and(|w| w.text.to_lowercase().starts_with("reference"))
                && is_fancy(current, line, t).is_some()))
        && line.left() - current.left() < t.align_tolerance
    {
        return Some(BreakType::Reference);
    }
    if BULLET.is_match(&text) && line.left() - current.left() < t.align_tolerance {
        return Some(BreakType::Bullet);
    }
    if n > 1
        && line.top() > lastline.bottom()
        && line.top() - lastline.bottom() > current.avg_line_spacing(t) * t.line_spacing_factor
    {
        return Some(BreakType::LineSpacing);
    }
    if lineheight_difference(line, lastline) > t.line_height_ratio
        && (line.words().len() > 1 || first_word.char_count() > 1)
    {
        return Some(BreakType::LineHeight);
    }
    if current.breaktype != BreakType::Indent
        && (1..=3).contains(&n)
        && current
            .first_line()
            .is_some_and(|l| l.words().len() > 1 || l.words()[0].char_count() > 1)
        && is_fancy(current, line, t).is_some()
    {
        return Some(BreakType::SectionHeader);
    }
    if n > 1 && line.left() - lastline.right() > t.column_gap_chars * acw && outside {
        return Some(BreakType::Column);
    }
    if n > 1 && lastline.top() > line.bottom() && outside {
        return Some(BreakType::VerticalBreak);
    }
    if lastline.left() > line.right() {
        return Some(BreakType::SectionBreak);
    }
    if line.top() - lastline.bottom() > lastline.height().max(line.height()) {
        return Some(BreakType::WideGap);
    }
    if let Some((by, rest)) = lastline.words().split_first() {
        if by.text.to_lowercase() == "by"
            && rest.iter().all(starts_with_capital)
            && line.width() - lastline.width() > t.byline_width_chars * acw
        {
            return Some(BreakType::Byline);
        }
    }
    picture
}

/// Break one page's lines into paragraphs.
pub fn figure_paragraphs(lines: Vec<Line>, t: &LayoutThresholds) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::new(BreakType::NewPage);

    for (column_lines, line) in lines.into_iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        if let Some(breaktype) = classify(&current, &line, column_lines, t) {
            trace!(breaktype = breaktype.code(), line = %line.text(), "paragraph break");
            let done = std::mem::replace(&mut current, Paragraph::new(breaktype));
            if !done.is_empty() {
                paragraphs.push(done);
            }
        }
        current.add(line);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}
