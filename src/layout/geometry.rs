//! Axis-aligned rectangles in page coordinates (origin top-left, y down).

use folio_wbb::WordBox;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// An inverted rectangle that any [`Rect::expand`] replaces.
    pub fn empty() -> Self {
        Self::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN)
    }

    pub fn is_empty(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    pub fn width(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.right - self.left
        }
    }

    pub fn height(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.bottom - self.top
        }
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn expand(&mut self, other: &Rect) {
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    pub fn y_overlaps(&self, other: &Rect) -> bool {
        self.top < other.bottom && other.top < self.bottom
    }

    pub fn x_overlaps(&self, other: &Rect) -> bool {
        self.left < other.right && other.left < self.right
    }

    /// Share of this rectangle's area that lies inside `other`. A degenerate
    /// rectangle touching `other` counts as fully inside.
    pub fn percentage_overlap(&self, other: &Rect) -> f32 {
        if !(self.x_overlaps(other) && self.y_overlaps(other)) {
            return 0.0;
        }
        if self.width() <= 0.0 || self.height() <= 0.0 {
            return 1.0;
        }
        let w = self.right.min(other.right) - self.left.max(other.left);
        let h = self.bottom.min(other.bottom) - self.top.max(other.top);
        (w * h) / (self.width() * self.height())
    }
}

impl From<&WordBox> for Rect {
    fn from(b: &WordBox) -> Self {
        Rect::new(b.left, b.top, b.right, b.bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_relative_to_self() {
        let small = Rect::new(0.0, 0.0, 10.0, 10.0);
        let big = Rect::new(5.0, 0.0, 100.0, 100.0);
        assert!((small.percentage_overlap(&big) - 0.5).abs() < 1e-6);
        assert!(big.percentage_overlap(&small) < 0.01);
        let apart = Rect::new(200.0, 200.0, 210.0, 210.0);
        assert_eq!(small.percentage_overlap(&apart), 0.0);
    }

    #[test]
    fn empty_expands_to_first() {
        let mut r = Rect::empty();
        assert!(r.is_empty());
        assert_eq!(r.width(), 0.0);
        r.expand(&Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(r, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
