//! One word's geometry record and its typographic flag byte.

use bitflags::bitflags;

bitflags! {
    /// The flag byte stored in every record.
    ///
    /// Bit order is fixed by the on-disk format: fixed-width is the high bit,
    /// inserted-hyphen the low bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WordFlags: u8 {
        const FIXED_WIDTH = 1 << 7;
        const SERIF       = 1 << 6;
        const SYMBOLIC    = 1 << 5;
        const ITALIC      = 1 << 4;
        const BOLD        = 1 << 3;
        /// The word is the last one on its text line.
        const ENDS_LINE   = 1 << 2;
        /// A space follows the word in the text stream.
        const ENDS_WORD   = 1 << 1;
        /// The word ends with a hyphen the extractor inserted at a line break.
        const HAS_HYPHEN  = 1;
    }
}

/// Geometry and typography of one extracted word.
///
/// Coordinates are in points with the origin at the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WordBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    /// Baseline y. Version 1 files carry none; decoding uses `bottom`.
    pub baseline: f32,
    /// Number of characters in the word (saturates at 255 on disk).
    pub char_count: u8,
    /// Extractor font classification, 0–63.
    pub font_type: u8,
    /// Quarter-turn rotation, 0–3. Only version 2 stores it.
    pub rotation: u8,
    /// Font size in points, stored at half-point resolution.
    pub font_size: f32,
    pub flags: WordFlags,
    /// Byte offset of the word's text in the text body.
    pub offset: u32,
}

impl WordBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn ends_line(&self) -> bool {
        self.flags.contains(WordFlags::ENDS_LINE)
    }

    pub fn ends_word(&self) -> bool {
        self.flags.contains(WordFlags::ENDS_WORD)
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

    /// Fraction of this box's area covered by `other`.
    ///
    /// A degenerate (zero-width or zero-height) box that touches `other`
    /// counts as fully covered.
    pub fn percentage_overlap(&self, other: &WordBox) -> f32 {
        let w = self.right.min(other.right) - self.left.max(other.left);
        let h = self.bottom.min(other.bottom) - self.top.max(other.top);
        if w < 0.0 || h < 0.0 {
            return 0.0;
        }
        let area = self.width() * self.height();
        if area <= 0.0 {
            return 1.0;
        }
        (w * h) / area
    }

    /// Serialize into `out` using the given record layout.
    pub(crate) fn write_record(&self, version2: bool, out: &mut Vec<u8>) {
        out.push(self.char_count);
        if version2 {
            out.push(((self.rotation & 0x03) << 6) | (self.font_type & 0x3F));
        } else {
            out.push(self.font_type);
        }
        out.push(((self.font_size * 2.0) as u32 & 0xFF) as u8);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.left.to_be_bytes());
        out.extend_from_slice(&self.top.to_be_bytes());
        out.extend_from_slice(&self.right.to_be_bytes());
        out.extend_from_slice(&self.bottom.to_be_bytes());
        if version2 {
            out.extend_from_slice(&self.baseline.to_be_bytes());
        }
        out.extend_from_slice(&self.offset.to_be_bytes());
    }

    /// Parse one record. `bytes` must be exactly one record long.
    pub(crate) fn read_record(version2: bool, bytes: &[u8]) -> WordBox {
        let f = |at: usize| f32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let (rotation, font_type) = if version2 {
            (bytes[1] >> 6, bytes[1] & 0x3F)
        } else {
            (0, bytes[1])
        };
        let bottom = f(16);
        let (baseline, offset_at) = if version2 { (f(20), 24) } else { (bottom, 20) };
        WordBox {
            char_count: bytes[0],
            font_type,
            rotation,
            font_size: f32::from(bytes[2]) / 2.0,
            flags: WordFlags::from_bits_retain(bytes[3]),
            left: f(4),
            top: f(8),
            right: f(12),
            bottom,
            baseline,
            offset: u32::from_be_bytes([
                bytes[offset_at],
                bytes[offset_at + 1],
                bytes[offset_at + 2],
                bytes[offset_at + 3],
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(left: f32, top: f32, right: f32, bottom: f32) -> WordBox {
        WordBox {
            left,
            top,
            right,
            bottom,
            baseline: bottom,
            ..WordBox::default()
        }
    }

    #[test]
    fn flag_bits_match_disk_layout() {
        assert_eq!(WordFlags::FIXED_WIDTH.bits(), 0x80);
        assert_eq!(WordFlags::ENDS_LINE.bits(), 0x04);
        assert_eq!(WordFlags::HAS_HYPHEN.bits(), 0x01);
    }

    #[test]
    fn v2_record_is_28_bytes_with_rotation_packed() {
        let b = WordBox {
            rotation: 2,
            font_type: 5,
            font_size: 10.5,
            char_count: 4,
            offset: 0x0102_0304,
            ..boxed(1.0, 2.0, 3.0, 4.0)
        };
        let mut out = Vec::new();
        b.write_record(true, &mut out);
        assert_eq!(out.len(), 28);
        assert_eq!(out[1], (2 << 6) | 5);
        assert_eq!(out[2], 21);
        assert_eq!(&out[24..], &[1, 2, 3, 4]);
        assert_eq!(WordBox::read_record(true, &out), b);
    }

    #[test]
    fn v1_record_has_no_baseline() {
        let b = boxed(10.0, 20.0, 30.0, 40.0);
        let mut out = Vec::new();
        b.write_record(false, &mut out);
        assert_eq!(out.len(), 24);
        let back = WordBox::read_record(false, &out);
        assert_eq!(back.baseline, 40.0);
    }

    #[test]
    fn overlap_is_relative_to_own_area() {
        let a = boxed(0.0, 0.0, 10.0, 10.0);
        let b = boxed(5.0, 0.0, 15.0, 10.0);
        assert!((a.percentage_overlap(&b) - 0.5).abs() < 1e-6);
        let far = boxed(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.percentage_overlap(&far), 0.0);
        let flat = boxed(2.0, 5.0, 4.0, 5.0);
        assert_eq!(flat.percentage_overlap(&a), 1.0);
    }
}
