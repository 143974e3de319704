//! Text attraction field generation.
//!
//! A string becomes a directional field in five stages:
//!
//! 1. rasterize a binary glyph mask at the largest font size that fits,
//! 2. Sobel edge detection,
//! 3. a cascade of separable Gaussian blurs at descending resolutions,
//! 4. a weighted blend of the cascade into an approximate distance field,
//! 5. a normal map of that field's gradient.
//!
//! [`TextFieldGenerator`] owns the state machine and drives a [`FieldBackend`],
//! which holds every intermediate texture. [`cpu::CpuFieldBackend`] runs the
//! stages as plain kernels; `gpu::text_field::GpuFieldBackend` runs them as
//! render passes.
//!
//! ```ignore
//! let mut field = TextFieldGenerator::new(CpuFieldBackend::new(256)?, Box::new(BlockFont));
//! field.update_text("HELLO")?;
//! let normals = field.normal_map()?;
//! ```

pub mod cosmic;
pub mod cpu;
pub mod fit;
pub mod kernels;
pub mod raster;

use std::path::Path;

use glam::{Vec2, Vec4};
use image::RgbaImage;
use log::{debug, info, warn};

use crate::error::FieldError;
use crate::physics::AttractionField;

pub use fit::{fit_font_size, FontFit};
pub use raster::{BlockFont, Extent, GlyphMask, TextRasterizer};

/// Smallest accepted field edge length.
pub const MIN_FIELD_SIZE: u32 = 16;
/// Largest accepted field edge length.
pub const MAX_FIELD_SIZE: u32 = 2048;
/// Number of blur levels in the cascade.
pub const CASCADE_LEVELS: usize = 4;
/// Gaussian radius of each cascade level, in texels of that level.
pub const BLUR_RADII: [u32; CASCADE_LEVELS] = [2, 4, 8, 16];
/// Blend weight of each cascade level. Hand-tuned, roughly doubling.
pub const BLEND_WEIGHTS: [f32; CASCADE_LEVELS] = [0.355, 0.75, 1.5, 3.0];
/// No cascade level is smaller than this.
pub const MIN_LEVEL_SIZE: u32 = 16;
/// Gradients at or below this length encode as "no direction".
pub const MIN_GRADIENT: f32 = 1e-5;

/// Edge length of every cascade level for a field of edge `size`.
///
/// Level `i` is `size >> i`, floored at [`MIN_LEVEL_SIZE`].
pub fn level_sizes(size: u32) -> [u32; CASCADE_LEVELS] {
    let mut sizes = [0; CASCADE_LEVELS];
    for (i, s) in sizes.iter_mut().enumerate() {
        *s = (size >> i).max(MIN_LEVEL_SIZE);
    }
    sizes
}

/// Texture dimensions of a generator, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub size: u32,
    pub levels: [u32; CASCADE_LEVELS],
}

impl FieldLayout {
    pub fn new(size: u32) -> Result<Self, FieldError> {
        if !(MIN_FIELD_SIZE..=MAX_FIELD_SIZE).contains(&size) {
            return Err(FieldError::InvalidSize(size));
        }
        Ok(Self {
            size,
            levels: level_sizes(size),
        })
    }

    pub fn texel_count(&self) -> usize {
        (self.size * self.size) as usize
    }
}

/// Progress of the generator through one regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldStage {
    Uninitialized,
    BaseRasterized,
    EdgeDetected,
    BlurCascadeComputed,
    Blended,
    NormalMapped,
    Ready,
}

impl FieldStage {
    /// Stages a regeneration passes through, in order.
    pub const PIPELINE: [FieldStage; 6] = [
        FieldStage::BaseRasterized,
        FieldStage::EdgeDetected,
        FieldStage::BlurCascadeComputed,
        FieldStage::Blended,
        FieldStage::NormalMapped,
        FieldStage::Ready,
    ];

    /// Texture holding the output of this stage.
    pub fn target(self) -> Option<FieldTarget> {
        match self {
            FieldStage::Uninitialized => None,
            FieldStage::BaseRasterized => Some(FieldTarget::Mask),
            FieldStage::EdgeDetected => Some(FieldTarget::Edge),
            FieldStage::BlurCascadeComputed => Some(FieldTarget::Blur(CASCADE_LEVELS - 1)),
            FieldStage::Blended => Some(FieldTarget::Result),
            FieldStage::NormalMapped | FieldStage::Ready => Some(FieldTarget::NormalMap),
        }
    }
}

/// One of the generator's textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Mask,
    Edge,
    /// Output of cascade level `i`.
    Blur(usize),
    Result,
    NormalMap,
}

/// Outcome of [`TextFieldGenerator::update_text`].
#[derive(Debug, Clone, PartialEq)]
pub enum TextUpdate {
    /// Blank text; the previous field is kept.
    Rejected,
    /// Every stage ran for this text.
    Regenerated { font_size: f32 },
}

/// RGBA8 field texture with row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTexture {
    size: u32,
    texels: Vec<[u8; 4]>,
}

/// Texel meaning "no direction, full distance".
pub const NEUTRAL_TEXEL: [u8; 4] = [128, 128, 255, 255];

impl FieldTexture {
    /// Field with no direction anywhere.
    pub fn neutral(size: u32) -> Self {
        Self {
            size,
            texels: vec![NEUTRAL_TEXEL; (size * size) as usize],
        }
    }

    /// Build from tightly packed RGBA8 bytes.
    pub fn from_rgba(size: u32, bytes: &[u8]) -> Self {
        let texels = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self { size, texels }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn texels(&self) -> &[[u8; 4]] {
        &self.texels
    }

    pub(crate) fn texels_mut(&mut self) -> &mut [[u8; 4]] {
        &mut self.texels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Texel with coordinates clamped to the edge.
    #[inline]
    pub fn texel(&self, x: i32, y: i32) -> Vec4 {
        let max = self.size as i32 - 1;
        let idx = (y.clamp(0, max) * self.size as i32 + x.clamp(0, max)) as usize;
        let [r, g, b, a] = self.texels[idx];
        Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
    }

    /// Bilinear sample, clamp to edge.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let t = uv * self.size as f32 - Vec2::splat(0.5);
        let base = t.floor();
        let f = t - base;
        let (x, y) = (base.x as i32, base.y as i32);
        let top = self.texel(x, y).lerp(self.texel(x + 1, y), f.x);
        let bottom = self.texel(x, y + 1).lerp(self.texel(x + 1, y + 1), f.x);
        top.lerp(bottom, f.y)
    }

    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.size, self.size, self.as_bytes().to_vec())
            .unwrap_or_else(|| RgbaImage::new(self.size, self.size))
    }
}

impl AttractionField for FieldTexture {
    fn sample(&self, uv: Vec2) -> Vec4 {
        FieldTexture::sample(self, uv)
    }
}

/// Storage and execution of the field stages.
///
/// A backend allocates every texture once for its [`FieldLayout`] and
/// overwrites them on each call. Calls arrive in pipeline order.
pub trait FieldBackend {
    fn layout(&self) -> FieldLayout;

    fn upload_mask(&mut self, mask: &GlyphMask) -> Result<(), FieldError>;

    fn edge_detect(&mut self) -> Result<(), FieldError>;

    /// Horizontal then vertical blur into cascade level `level`.
    fn blur_level(&mut self, level: usize) -> Result<(), FieldError>;

    fn blend(&mut self) -> Result<(), FieldError>;

    fn encode_normal_map(&mut self) -> Result<(), FieldError>;

    /// Block until all submitted stage work has completed.
    fn finish(&mut self) -> Result<(), FieldError> {
        Ok(())
    }

    /// Copy of the normal map.
    fn read_normal_map(&self) -> Result<FieldTexture, FieldError>;

    /// Copy of any texture as an image, for debugging.
    fn read_target(&self, target: FieldTarget) -> Result<RgbaImage, FieldError>;
}

/// Drives a [`FieldBackend`] through the stages for each text update.
pub struct TextFieldGenerator<B: FieldBackend> {
    backend: B,
    rasterizer: Box<dyn TextRasterizer>,
    layout: FieldLayout,
    stage: FieldStage,
    text: Option<String>,
    fit: Option<FontFit>,
}

impl<B: FieldBackend> TextFieldGenerator<B> {
    pub fn new(backend: B, rasterizer: Box<dyn TextRasterizer>) -> Self {
        let layout = backend.layout();
        info!(
            "Text field {}x{} with cascade {:?} ({} rasterizer)",
            layout.size,
            layout.size,
            layout.levels,
            rasterizer.name()
        );
        Self {
            backend,
            rasterizer,
            layout,
            stage: FieldStage::Uninitialized,
            text: None,
            fit: None,
        }
    }

    #[inline]
    pub fn stage(&self) -> FieldStage {
        self.stage
    }

    /// Text of the current field, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn font_size(&self) -> Option<f32> {
        self.fit.map(|f| f.size)
    }

    pub fn font_fit(&self) -> Option<&FontFit> {
        self.fit.as_ref()
    }

    #[inline]
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn enter(&mut self, stage: FieldStage) {
        debug!("Text field {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Regenerate the field for `text`, running every stage before returning.
    ///
    /// Blank text is rejected and leaves the current field untouched.
    pub fn update_text(&mut self, text: &str) -> Result<TextUpdate, FieldError> {
        let text = text.trim();
        if text.is_empty() {
            warn!("Rejected blank text for the attraction field");
            return Ok(TextUpdate::Rejected);
        }

        let size = self.layout.size;
        let fit = fit_font_size(self.rasterizer.as_mut(), text, size)?;
        let mask = self.rasterizer.rasterize(text, fit.size, size)?;

        self.backend.upload_mask(&mask)?;
        self.enter(FieldStage::BaseRasterized);

        self.backend.edge_detect()?;
        self.enter(FieldStage::EdgeDetected);

        for level in 0..CASCADE_LEVELS {
            self.backend.blur_level(level)?;
        }
        self.enter(FieldStage::BlurCascadeComputed);

        self.backend.blend()?;
        self.enter(FieldStage::Blended);

        self.backend.encode_normal_map()?;
        self.enter(FieldStage::NormalMapped);

        self.backend.finish()?;
        self.enter(FieldStage::Ready);

        info!(
            "Text field ready for '{}' at font size {:.1} ({} fit iterations)",
            text, fit.size, fit.iterations
        );
        self.text = Some(text.to_string());
        self.fit = Some(fit);
        Ok(TextUpdate::Regenerated { font_size: fit.size })
    }

    /// The final artifact; neutral before the first successful update.
    pub fn normal_map(&self) -> Result<FieldTexture, FieldError> {
        if self.stage == FieldStage::Uninitialized {
            return Ok(FieldTexture::neutral(self.layout.size));
        }
        self.backend.read_normal_map()
    }

    /// Write the output texture of `stage` as a PNG.
    pub fn save_stage_png(&self, stage: FieldStage, path: impl AsRef<Path>) -> Result<(), FieldError> {
        match stage.target() {
            Some(target) => self.save_target_png(target, path),
            None => Ok(()),
        }
    }

    pub fn save_target_png(&self, target: FieldTarget, path: impl AsRef<Path>) -> Result<(), FieldError> {
        let image = self.backend.read_target(target)?;
        image.save(path.as_ref())?;
        debug!("Saved {:?} to {}", target, path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_sizes_descend_with_floor() {
        assert_eq!(level_sizes(256), [256, 128, 64, 32]);
        assert_eq!(level_sizes(64), [64, 32, 16, 16]);
        assert_eq!(level_sizes(16), [16, 16, 16, 16]);
        for size in MIN_FIELD_SIZE..=MAX_FIELD_SIZE {
            let levels = level_sizes(size);
            for pair in levels.windows(2) {
                assert!(pair[1] <= pair[0]);
                assert!(pair[1] >= MIN_LEVEL_SIZE);
            }
        }
    }

    #[test]
    fn test_layout_rejects_bad_sizes() {
        assert!(matches!(FieldLayout::new(8), Err(FieldError::InvalidSize(8))));
        assert!(matches!(FieldLayout::new(4096), Err(FieldError::InvalidSize(4096))));
        assert_eq!(FieldLayout::new(128).map(|l| l.texel_count()).ok(), Some(128 * 128));
    }

    #[test]
    fn test_neutral_texture_has_no_direction() {
        let field = FieldTexture::neutral(16);
        let s = field.sample(Vec2::new(0.3, 0.7));
        let d = Vec2::new(s.x * 2.0 - 1.0, s.y * 2.0 - 1.0);
        assert!(d.length() < crate::physics::DIRECTION_DEAD_ZONE);
    }

    #[test]
    fn test_bilinear_sample_interpolates_and_clamps() {
        let mut bytes = vec![0u8; 2 * 2 * 4];
        // Texel (1, 0) red = 255.
        bytes[4] = 255;
        let field = FieldTexture::from_rgba(2, &bytes);
        // Between texel centers 0 and 1 on the top row.
        let mid = field.sample(Vec2::new(0.5, 0.25));
        assert!((mid.x - 0.5).abs() < 1e-6);
        // Past the right edge clamps to the last texel.
        let edge = field.sample(Vec2::new(1.5, 0.25));
        assert!((edge.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stage_order() {
        let stages = FieldStage::PIPELINE;
        for pair in stages.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(FieldStage::Uninitialized.target(), None);
        assert_eq!(FieldStage::Ready.target(), Some(FieldTarget::NormalMap));
    }
}
