//! Largest font size whose ink fits the field square.

use super::raster::{Extent, TextRasterizer};
use crate::error::FieldError;

/// Padding in pixels at the reference field size.
pub const BASE_PADDING: f32 = 30.0;
/// Smallest font size at the reference field size.
pub const BASE_MIN_FONT_SIZE: f32 = 10.0;
/// Field edge the base constants are expressed for.
pub const REFERENCE_SIZE: f32 = 256.0;
/// Fraction of the available area the ink may cover during bisection.
pub const FIT_FACTOR: f32 = 0.98;
pub const MAX_ITERATIONS: u32 = 30;
/// Bisection stops once the interval is narrower than this.
pub const CONVERGENCE: f32 = 0.5;
/// Step of the overflow fallback.
pub const FALLBACK_STEP: f32 = 0.5;

/// Result of [`fit_font_size`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontFit {
    pub size: f32,
    /// Bisection rounds actually run.
    pub iterations: u32,
    /// Measured ink box at `size`.
    pub extent: Extent,
}

/// Padding on every side of a field of edge `size`.
pub fn padding(size: u32) -> f32 {
    (BASE_PADDING * size as f32 / REFERENCE_SIZE).max(4.0)
}

/// Font size floor for a field of edge `size`.
pub fn min_font_size(size: u32) -> f32 {
    (BASE_MIN_FONT_SIZE * size as f32 / REFERENCE_SIZE).max(4.0)
}

/// Side of the square the ink must stay inside.
pub fn available(size: u32) -> f32 {
    size as f32 - 2.0 * padding(size)
}

/// Bisect on font size for the largest size whose ink fits.
///
/// Terminates within [`MAX_ITERATIONS`] rounds. A converged size that still
/// overflows the available square is walked down in [`FALLBACK_STEP`]s, never
/// below [`min_font_size`].
pub fn fit_font_size(
    rasterizer: &mut dyn TextRasterizer,
    text: &str,
    size: u32,
) -> Result<FontFit, FieldError> {
    let avail = available(size);
    let floor = min_font_size(size);
    let fits = |e: Extent, limit: f32| e.width <= limit && e.height <= limit;

    let mut lo = floor;
    let mut hi = (size as f32).max(floor);
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS && hi - lo >= CONVERGENCE {
        let mid = (lo + hi) * 0.5;
        if fits(rasterizer.measure(text, mid)?, FIT_FACTOR * avail) {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }

    let mut font_size = lo;
    let mut extent = rasterizer.measure(text, font_size)?;
    while !fits(extent, avail) && font_size > floor {
        font_size = (font_size - FALLBACK_STEP).max(floor);
        extent = rasterizer.measure(text, font_size)?;
    }

    Ok(FontFit {
        size: font_size,
        iterations,
        extent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::raster::BlockFont;

    #[test]
    fn test_padding_scales_with_size() {
        assert_eq!(padding(256), 30.0);
        assert_eq!(padding(512), 60.0);
        assert_eq!(padding(16), 4.0);
        assert_eq!(min_font_size(256), 10.0);
        assert_eq!(available(256), 196.0);
    }

    #[test]
    fn test_single_char_grows_to_fill() {
        let fit = fit_font_size(&mut BlockFont, "A", 256).unwrap();
        let limit = FIT_FACTOR * available(256);
        assert!(fit.extent.height <= limit);
        // Height is the binding side for one block glyph; within one step of the limit.
        let next = BlockFont::default().measure("A", fit.size + 1.0).unwrap();
        assert!(next.height > limit);
        assert!(fit.iterations <= MAX_ITERATIONS);
    }

    #[test]
    fn test_longer_text_gets_smaller() {
        let short = fit_font_size(&mut BlockFont, "AB", 256).unwrap();
        let long = fit_font_size(&mut BlockFont, "ABCDEFGH", 256).unwrap();
        assert!(long.size < short.size);
    }

    /// Reports a fixed overflow at every size to exercise the fallback floor.
    struct Oversized;

    impl TextRasterizer for Oversized {
        fn name(&self) -> &'static str {
            "oversized"
        }

        fn measure(&mut self, _text: &str, _font_size: f32) -> Result<Extent, FieldError> {
            Ok(Extent {
                width: 10_000.0,
                height: 10.0,
            })
        }

        fn rasterize(&mut self, _: &str, _: f32, size: u32) -> Result<crate::field::GlyphMask, FieldError> {
            Ok(crate::field::GlyphMask::empty(size))
        }
    }

    #[test]
    fn test_unfittable_text_stops_at_floor() {
        let fit = fit_font_size(&mut Oversized, "X", 256).unwrap();
        assert_eq!(fit.size, min_font_size(256));
        assert!(fit.iterations <= MAX_ITERATIONS);
    }
}
