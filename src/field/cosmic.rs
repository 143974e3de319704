//! System font rasterizer backed by cosmic-text.

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache, Weight};
use log::{info, warn};

use super::raster::{BlockFont, Extent, GlyphMask, TextRasterizer, COVERAGE_THRESHOLD};
use crate::config::RasterizerKind;
use crate::error::FieldError;

/// One drawn span: pixel origin, width, height and alpha.
type Span = (i32, i32, u32, u32, u8);

/// Bold sans-serif text through the system font database.
pub struct CosmicRasterizer {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl CosmicRasterizer {
    /// Fails when the system has no fonts at all.
    pub fn new() -> Result<Self, FieldError> {
        let font_system = FontSystem::new();
        let faces = font_system.db().faces().count();
        if faces == 0 {
            return Err(FieldError::Rasterizer("no system fonts found".to_string()));
        }
        info!("Loaded {} system font faces", faces);
        Ok(Self {
            font_system,
            swash_cache: SwashCache::new(),
        })
    }

    /// Draw `text` at the origin and collect every inked span.
    fn draw(&mut self, text: &str, font_size: f32) -> Vec<Span> {
        let metrics = Metrics::new(font_size, (font_size * 1.2).ceil());
        let mut buffer = Buffer::new(&mut self.font_system, metrics);
        buffer.set_size(&mut self.font_system, None, None);
        let attrs = Attrs::new().family(Family::SansSerif).weight(Weight::BOLD);
        buffer.set_text(&mut self.font_system, text, attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        let mut spans = Vec::new();
        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            Color::rgb(255, 255, 255),
            |x, y, w, h, color| {
                if color.a() > COVERAGE_THRESHOLD {
                    spans.push((x, y, w, h, color.a()));
                }
            },
        );
        spans
    }
}

/// Bounding box of inked spans as `(min_x, min_y, max_x, max_y)`.
fn ink_bounds(spans: &[Span]) -> Option<(i32, i32, i32, i32)> {
    spans.iter().fold(None, |acc, &(x, y, w, h, _)| {
        let (x1, y1) = (x + w as i32, y + h as i32);
        Some(match acc {
            None => (x, y, x1, y1),
            Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x1), d.max(y1)),
        })
    })
}

impl TextRasterizer for CosmicRasterizer {
    fn name(&self) -> &'static str {
        "cosmic-text"
    }

    fn measure(&mut self, text: &str, font_size: f32) -> Result<Extent, FieldError> {
        let spans = self.draw(text, font_size);
        Ok(match ink_bounds(&spans) {
            Some((x0, y0, x1, y1)) => Extent {
                width: (x1 - x0) as f32,
                height: (y1 - y0) as f32,
            },
            None => Extent::default(),
        })
    }

    fn rasterize(&mut self, text: &str, font_size: f32, size: u32) -> Result<GlyphMask, FieldError> {
        let spans = self.draw(text, font_size);
        let mut mask = GlyphMask::empty(size);
        let Some((x0, y0, x1, y1)) = ink_bounds(&spans) else {
            return Ok(mask);
        };

        let offset_x = (size as i32 - (x1 - x0)) / 2 - x0;
        let offset_y = (size as i32 - (y1 - y0)) / 2 - y0;
        for (x, y, w, h, _) in spans {
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let px = x + dx + offset_x;
                    let py = y + dy + offset_y;
                    if (0..size as i32).contains(&px) && (0..size as i32).contains(&py) {
                        mask.set(px as u32, py as u32);
                    }
                }
            }
        }
        Ok(mask)
    }
}

/// Rasterizer for `kind`, falling back to [`BlockFont`] when no fonts load.
pub fn make_rasterizer(kind: RasterizerKind) -> Box<dyn TextRasterizer> {
    match kind {
        RasterizerKind::Block => Box::new(BlockFont),
        RasterizerKind::System => match CosmicRasterizer::new() {
            Ok(rasterizer) => Box::new(rasterizer),
            Err(e) => {
                warn!("{}; using the block font", e);
                Box::new(BlockFont)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ink_bounds() {
        assert_eq!(ink_bounds(&[]), None);
        let spans = [(2, 3, 1, 1, 255), (-1, 10, 4, 2, 200)];
        assert_eq!(ink_bounds(&spans), Some((-1, 3, 3, 12)));
    }

    #[test]
    fn test_block_kind_never_loads_fonts() {
        assert_eq!(make_rasterizer(RasterizerKind::Block).name(), "block");
    }

    #[test]
    fn test_system_fonts_when_available() {
        let Ok(mut rasterizer) = CosmicRasterizer::new() else {
            return;
        };
        let small = rasterizer.measure("HELLO", 20.0).unwrap();
        let large = rasterizer.measure("HELLO", 40.0).unwrap();
        if small.width == 0.0 {
            // Fonts exist but none cover Latin.
            return;
        }
        assert!(large.width > small.width);
        let mask = rasterizer.rasterize("HELLO", 40.0, 256).unwrap();
        assert!(mask.covered() > 0);
    }
}
