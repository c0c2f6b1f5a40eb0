//! Glyph runs → visual words → lines.
//!
//! A single forward scan over the extractor's boxes. Consecutive runs that sit
//! on the same baseline with no real gap are glued into one [`VisualWord`];
//! each finished word either extends the current [`Line`] or starts a new one
//! for the first matching [`LineBreak`] reason.

use super::geometry::Rect;
use super::LayoutThresholds;
use folio_wbb::{Word, WordFlags};
use tracing::trace;

/// One item of the extractor stream.
#[derive(Debug, Clone, Copy)]
pub enum LayoutItem<'a> {
    Word(&'a Word),
    /// An embedded picture; always a line of its own.
    Image(Rect),
}

/// One or more glyph runs read as a single word.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualWord {
    pub rect: Rect,
    /// Baseline of the last run.
    pub baseline: f32,
    pub text: String,
    /// Flags of the last run.
    pub flags: WordFlags,
    pub font_size: f32,
    /// Text-stream offset of the first run.
    pub offset: u32,
    pub is_image: bool,
}

impl VisualWord {
    pub fn start(word: &Word) -> Self {
        Self {
            rect: Rect::from(&word.bbox),
            baseline: word.bbox.baseline,
            text: word.text.clone(),
            flags: word.bbox.flags,
            font_size: word.bbox.font_size,
            offset: word.bbox.offset,
            is_image: false,
        }
    }

    pub fn image(rect: Rect) -> Self {
        Self {
            rect,
            baseline: rect.bottom,
            text: String::new(),
            flags: WordFlags::ENDS_WORD,
            font_size: 0.0,
            offset: 0,
            is_image: true,
        }
    }

    fn append(&mut self, word: &Word) {
        self.rect.expand(&Rect::from(&word.bbox));
        self.text.push_str(&word.text);
        self.flags = word.bbox.flags;
        self.baseline = word.bbox.baseline;
        self.font_size = word.bbox.font_size;
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn avg_char_width(&self) -> f32 {
        match self.char_count() {
            0 => 0.0,
            n => self.rect.width() / n as f32,
        }
    }

    pub fn ends_word(&self) -> bool {
        self.flags.contains(WordFlags::ENDS_WORD)
    }

    pub fn ends_line(&self) -> bool {
        self.flags.contains(WordFlags::ENDS_LINE)
    }

    pub fn has_hyphen(&self) -> bool {
        self.flags.contains(WordFlags::HAS_HYPHEN)
    }

    pub fn is_italic(&self) -> bool {
        self.flags.contains(WordFlags::ITALIC)
    }

    pub fn is_bold(&self) -> bool {
        self.flags.contains(WordFlags::BOLD)
    }

    /// Bytes the word occupies in the text stream. A line-end hyphen is not
    /// stored there.
    pub fn stored_len(&self) -> usize {
        if self.has_hyphen() && self.ends_line() {
            self.text.len().saturating_sub(1)
        } else {
            self.text.len()
        }
    }
}

/// Running average of inter-word gaps scaled by line height, over every line
/// of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GapStats {
    sum: f64,
    count: usize,
}

impl GapStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, gap: f32, height: f32) {
        if height > 0.0 {
            self.sum += f64::from(gap / height);
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Average adjusted gap rescaled to `height`; `None` until at least two
    /// gaps have been seen.
    pub fn adjusted_gap(&self, height: f32) -> Option<f32> {
        (self.count > 1).then(|| (self.sum / self.count as f64) as f32 * height)
    }
}

/// Why a line was broken before a word. Only used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBreak {
    /// previous word ended in a continuation hyphen
    Hyphen,
    Image,
    AfterImage,
    /// no vertical overlap with the previous word
    NoOverlap,
    VerticalStep,
    HorizontalGap,
    FontSize,
}

impl LineBreak {
    pub fn code(self) -> &'static str {
        match self {
            LineBreak::Hyphen => "hy",
            LineBreak::Image => "im",
            LineBreak::AfterImage => "pi",
            LineBreak::NoOverlap => "nw",
            LineBreak::VerticalStep => "vs",
            LineBreak::HorizontalGap => "hs",
            LineBreak::FontSize => "fs",
        }
    }
}

/// Visual words judged to lie on one text line, kept sorted by left edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    words: Vec<VisualWord>,
    rect: Rect,
    width_accum: f32,
    gap_accum: f32,
}

impl Default for Line {
    fn default() -> Self {
        Self::new()
    }
}

impl Line {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            rect: Rect::empty(),
            width_accum: 0.0,
            gap_accum: 0.0,
        }
    }

    pub fn words(&self) -> &[VisualWord] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
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

    pub fn top(&self) -> f32 {
        self.rect.top
    }

    pub fn bottom(&self) -> f32 {
        self.rect.bottom
    }

    pub fn width(&self) -> f32 {
        self.rect.width()
    }

    pub fn height(&self) -> f32 {
        self.rect.height()
    }

    /// Insert `word` at its left-edge position and fold its gap into the
    /// line and document statistics.
    pub fn add(&mut self, word: VisualWord, stats: &mut GapStats) {
        let pos = self
            .words
            .iter()
            .position(|w| word.rect.left < w.rect.left)
            .unwrap_or(self.words.len());
        self.rect.expand(&word.rect);
        self.width_accum += word.rect.width();
        self.words.insert(pos, word);
        if let [.., prev, last] = self.words.as_slice() {
            let gap = last.rect.left - prev.rect.right;
            self.gap_accum += gap;
            stats.record(gap, self.rect.height());
        }
    }

    pub fn avg_interword_gap(&self) -> f32 {
        match self.words.len() {
            0 | 1 => 0.0,
            n => self.gap_accum / (n - 1) as f32,
        }
    }

    pub fn avg_word_width(&self) -> f32 {
        match self.words.len() {
            0 => 0.0,
            n => self.width_accum / n as f32,
        }
    }

    pub fn avg_char_width(&self) -> f32 {
        let chars = self.char_count();
        if chars == 0 {
            return 0.0;
        }
        self.words.iter().map(|w| w.rect.width()).sum::<f32>() / chars as f32
    }

    pub fn avg_font_size(&self) -> f32 {
        match self.words.len() {
            0 => 0.0,
            n => self.words.iter().map(|w| w.font_size).sum::<f32>() / n as f32,
        }
    }

    /// Word heights weighted by word width.
    pub fn avg_line_height(&self) -> f32 {
        let (weight, sum) = self.words.iter().fold((0.0f32, 0.0f32), |(c, s), w| {
            (c + w.rect.width(), s + w.rect.height() * w.rect.width())
        });
        if weight > 0.0 {
            sum / weight
        } else {
            0.0
        }
    }

    pub fn max_word_height(&self) -> f32 {
        self.words
            .iter()
            .map(|w| w.rect.height())
            .fold(0.0, f32::max)
    }

    /// Most common baseline, weighted by characters; the bottom edge for an
    /// empty line.
    pub fn baseline(&self) -> f32 {
        let mut tally: Vec<(f32, usize)> = Vec::new();
        for w in &self.words {
            match tally.iter_mut().find(|(b, _)| *b == w.baseline) {
                Some((_, n)) => *n += w.char_count(),
                None => tally.push((w.baseline, w.char_count())),
            }
        }
        let mut best: Option<(f32, usize)> = None;
        for (b, n) in tally {
            if best.is_none_or(|(_, m)| n > m) {
                best = Some((b, n));
            }
        }
        best.map(|(b, _)| b).unwrap_or(self.rect.bottom)
    }

    pub fn char_count(&self) -> usize {
        self.words.iter().map(VisualWord::char_count).sum()
    }

    pub fn is_italic(&self) -> bool {
        self.words.iter().all(VisualWord::is_italic)
    }

    pub fn is_bold(&self) -> bool {
        self.words.iter().all(VisualWord::is_bold)
    }

    pub fn text(&self) -> String {
        let mut t = String::new();
        let n = self.words.len();
        for (i, w) in self.words.iter().enumerate() {
            t.push_str(&w.text);
            if w.ends_line() && i + 1 < n {
                if !w.has_hyphen() || w.text == "-" {
                    t.push(' ');
                }
            } else if w.ends_word() {
                t.push(' ');
            }
        }
        t
    }
}

/// Relative difference between two lines' average heights; zero when either
/// is flat.
pub fn lineheight_difference(a: &Line, b: &Line) -> f32 {
    let (h1, h2) = (a.avg_line_height(), b.avg_line_height());
    let lo = h1.min(h2);
    if lo.abs() < 1e-7 {
        0.0
    } else {
        h1.max(h2) / lo - 1.0
    }
}

struct LineBuilder<'a> {
    t: &'a LayoutThresholds,
    stats: &'a mut GapStats,
    lines: Vec<Line>,
    current: Option<Line>,
    last_word: Option<VisualWord>,
}

impl LineBuilder<'_> {
    fn break_reason(&self, word: &VisualWord) -> Option<LineBreak> {
        let t = self.t;
        let Some(last) = &self.last_word else {
            return Some(LineBreak::NoOverlap);
        };
        let mut reason = None;
        if last.has_hyphen() {
            reason = Some(LineBreak::Hyphen);
        }
        if word.is_image {
            reason = Some(LineBreak::Image);
        }
        if last.is_image {
            reason = Some(LineBreak::AfterImage);
        }

        let gap = word.rect.left - last.rect.right;
        if !word.rect.y_overlaps(&last.rect) {
            return Some(LineBreak::NoOverlap);
        }
        if !t.respect_newlines && word.rect.top - last.rect.top >= t.vertical_step * word.rect.height()
        {
            return Some(LineBreak::VerticalStep);
        }
        let line = self.current.as_ref();
        let wide = gap > t.max_gap_points
            || last.rect.left - word.rect.right > t.max_gap_points
            || line.is_some_and(|l| match l.words.len() {
                0 => false,
                1 => gap > t.single_word_gap_chars * l.avg_char_width(),
                _ => {
                    gap > t.interword_gap_factor * l.avg_interword_gap()
                        || gap > t.line_gap_chars * l.avg_char_width()
                        || self
                            .stats
                            .adjusted_gap(l.height())
                            .is_some_and(|a| gap > t.adjusted_gap_factor * a)
                }
            });
        if wide {
            return Some(LineBreak::HorizontalGap);
        }
        let font_jump = line.is_some_and(|l| {
            let lh = l.avg_line_height();
            let wh = word.rect.height();
            l.char_count() > t.font_jump_min_chars
                && (lh > t.font_jump_ratio * wh || lh * t.font_jump_ratio < wh)
                && l.text().chars().count() > 1
        });
        if font_jump {
            return Some(LineBreak::FontSize);
        }
        reason
    }

    fn finish_word(&mut self, word: VisualWord) {
        if let Some(reason) = self.break_reason(&word) {
            trace!(reason = reason.code(), word = %word.text, "line break");
            if let Some(line) = self.current.take() {
                if !line.is_empty() {
                    self.lines.push(line);
                }
            }
        }
        let line = self.current.get_or_insert_with(Line::new);
        line.add(word.clone(), self.stats);
        self.last_word = Some(word);
    }

    /// A run cut off by a glyph run that does not continue it joins the
    /// current line without a break check; breaks are decided only for runs
    /// that end at a word boundary. It is not compared against later words
    /// unless it is the first word seen.
    fn attach_cut_run(&mut self, word: VisualWord) {
        let line = self.current.get_or_insert_with(Line::new);
        line.add(word.clone(), self.stats);
        if self.last_word.is_none() {
            self.last_word = Some(word);
        }
    }

    fn into_lines(mut self) -> Vec<Line> {
        if let Some(line) = self.current.take() {
            if !line.is_empty() {
                self.lines.push(line);
            }
        }
        self.lines
    }
}

/// Group one page of extractor output into lines, in stream order.
pub fn figure_lines<'a>(
    items: impl IntoIterator<Item = LayoutItem<'a>>,
    t: &LayoutThresholds,
    stats: &mut GapStats,
) -> Vec<Line> {
    let mut b = LineBuilder {
        t,
        stats,
        lines: Vec::new(),
        current: None,
        last_word: None,
    };
    let mut pending: Option<VisualWord> = None;

    for item in items {
        let word = match item {
            LayoutItem::Word(w) => w,
            LayoutItem::Image(rect) => {
                if let Some(w) = pending.take() {
                    b.finish_word(w);
                }
                b.finish_word(VisualWord::image(rect));
                continue;
            }
        };
        let run = Rect::from(&word.bbox);

        let split = pending.as_ref().is_some_and(|cw| {
            !run.y_overlaps(&cw.rect)
                || run.left < cw.rect.right
                || run.left - cw.rect.right > t.word_gap_chars * cw.avg_char_width()
        });
        if split {
            if let Some(w) = pending.take() {
                b.attach_cut_run(w);
            }
        }
        match pending.as_mut() {
            Some(cw) => cw.append(word),
            None => pending = Some(VisualWord::start(word)),
        }

        let bbox = &word.bbox;
        let complete = (t.respect_newlines && bbox.ends_line())
            || bbox.ends_word()
            || bbox.has_hyphen()
            || b.current
                .as_ref()
                .is_some_and(|l| !l.is_empty() && run.left < l.right());
        if complete {
            if let Some(w) = pending.take() {
                b.finish_word(w);
            }
        }
    }
    if let Some(w) = pending.take() {
        b.finish_word(w);
    }
    b.into_lines()
}
