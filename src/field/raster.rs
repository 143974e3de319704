//! Glyph rasterization into binary coverage masks.

use crate::error::FieldError;

/// Coverage above this alpha counts as ink.
pub const COVERAGE_THRESHOLD: u8 = 128;

/// Ink bounding box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extent {
    pub width: f32,
    pub height: f32,
}

/// Square binary coverage mask, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    size: u32,
    coverage: Vec<u8>,
}

impl GlyphMask {
    pub fn empty(size: u32) -> Self {
        Self {
            size,
            coverage: vec![0; (size * size) as usize],
        }
    }

    /// Threshold 8-bit alpha into a mask.
    pub fn from_alpha(size: u32, alpha: &[u8]) -> Self {
        Self {
            size,
            coverage: alpha
                .iter()
                .map(|&a| u8::from(a > COVERAGE_THRESHOLD))
                .collect(),
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// One byte per texel, 0 or 1.
    pub fn coverage(&self) -> &[u8] {
        &self.coverage
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.coverage[(y * self.size + x) as usize] != 0
    }

    pub fn set(&mut self, x: u32, y: u32) {
        self.coverage[(y * self.size + x) as usize] = 1;
    }

    pub fn covered(&self) -> usize {
        self.coverage.iter().filter(|&&c| c != 0).count()
    }

    /// 0 or 255 per texel, for uploading as an 8-bit texture.
    pub fn to_alpha(&self) -> Vec<u8> {
        self.coverage.iter().map(|&c| c * 255).collect()
    }
}

/// Turns a string into ink.
///
/// Font layout is opaque to the field; it only needs the ink extent at a
/// given size and a mask with that ink centered in the square.
pub trait TextRasterizer {
    fn name(&self) -> &'static str;

    /// Ink bounding box of `text` at `font_size`.
    fn measure(&mut self, text: &str, font_size: f32) -> Result<Extent, FieldError>;

    /// Mask of edge `size` with the ink of `text` centered.
    fn rasterize(&mut self, text: &str, font_size: f32, size: u32) -> Result<GlyphMask, FieldError>;
}

/// Rows of a 5x7 glyph, bit 4 is the leftmost column.
type Glyph = [u8; 7];

const GLYPH_COLUMNS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
/// Horizontal cells per character including one column of spacing.
const ADVANCE: u32 = 6;
/// Cells per em; one row of the em is leading.
const EM_CELLS: f32 = 8.0;

fn glyph(c: char) -> Glyph {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

/// Built-in 5x7 bitmap font scaled to any size.
///
/// Every character occupies the same advance, so the ink box of an
/// `n`-character string is `(6n - 1) x 7` cells of `font_size / 8` pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFont;

impl BlockFont {
    fn cell(font_size: f32) -> f32 {
        font_size / EM_CELLS
    }

    fn extent(text: &str, font_size: f32) -> Extent {
        let n = text.chars().count() as u32;
        if n == 0 {
            return Extent::default();
        }
        let cell = Self::cell(font_size);
        Extent {
            width: (n * ADVANCE - 1) as f32 * cell,
            height: GLYPH_ROWS as f32 * cell,
        }
    }
}

impl TextRasterizer for BlockFont {
    fn name(&self) -> &'static str {
        "block"
    }

    fn measure(&mut self, text: &str, font_size: f32) -> Result<Extent, FieldError> {
        Ok(Self::extent(text, font_size))
    }

    fn rasterize(&mut self, text: &str, font_size: f32, size: u32) -> Result<GlyphMask, FieldError> {
        let glyphs: Vec<Glyph> = text.chars().map(glyph).collect();
        let mut mask = GlyphMask::empty(size);
        if glyphs.is_empty() || font_size <= 0.0 {
            return Ok(mask);
        }

        let cell = Self::cell(font_size);
        let extent = Self::extent(text, font_size);
        let origin_x = (size as f32 - extent.width) * 0.5;
        let origin_y = (size as f32 - extent.height) * 0.5;

        let x0 = origin_x.floor().max(0.0) as u32;
        let y0 = origin_y.floor().max(0.0) as u32;
        let x1 = ((origin_x + extent.width).ceil() as u32).min(size);
        let y1 = ((origin_y + extent.height).ceil() as u32).min(size);

        for y in y0..y1 {
            let ly = (y as f32 + 0.5 - origin_y) / cell;
            if ly < 0.0 || ly >= GLYPH_ROWS as f32 {
                continue;
            }
            let row = ly as usize;
            for x in x0..x1 {
                let lx = (x as f32 + 0.5 - origin_x) / cell;
                if lx < 0.0 {
                    continue;
                }
                let column = lx as u32;
                let index = (column / ADVANCE) as usize;
                let within = column % ADVANCE;
                if within >= GLYPH_COLUMNS {
                    continue;
                }
                let Some(rows) = glyphs.get(index) else {
                    continue;
                };
                if rows[row] >> (GLYPH_COLUMNS - 1 - within) & 1 == 1 {
                    mask.set(x, y);
                }
            }
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strictly_above_128() {
        let mask = GlyphMask::from_alpha(2, &[128, 129, 0, 255]);
        assert_eq!(mask.coverage(), &[0, 1, 0, 1]);
        assert_eq!(mask.covered(), 2);
        assert_eq!(mask.to_alpha(), vec![0, 255, 0, 255]);
    }

    #[test]
    fn test_block_extent_scales_linearly() {
        let mut font = BlockFont;
        let a = font.measure("AB", 16.0).unwrap();
        let b = font.measure("AB", 32.0).unwrap();
        assert_eq!(a.width, 11.0 * 2.0);
        assert_eq!(a.height, 14.0);
        assert_eq!(b.width, a.width * 2.0);
        assert_eq!(font.measure("", 16.0).unwrap(), Extent::default());
    }

    #[test]
    fn test_block_mask_is_centered() {
        let mut font = BlockFont;
        let mask = font.rasterize("I", 64.0, 64).unwrap();
        assert!(mask.covered() > 0);
        // "I" is symmetric: its ink mirrors about the vertical center line.
        for y in 0..64 {
            for x in 0..32 {
                assert_eq!(mask.get(x, y), mask.get(63 - x, y), "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_block_mask_differs_per_text() {
        let mut font = BlockFont;
        let a = font.rasterize("AB", 40.0, 128).unwrap();
        let b = font.rasterize("XYZ", 40.0, 128).unwrap();
        assert_ne!(a, b);
    }
}
