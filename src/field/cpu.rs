//! Field backend that runs every stage on the CPU.

use glam::Vec2;
use image::{Rgba, RgbaImage};

use super::kernels::{self, Plane};
use super::{FieldBackend, FieldLayout, FieldTarget, FieldTexture, GlyphMask, BLUR_RADII, CASCADE_LEVELS};
use crate::error::FieldError;

/// All intermediate textures as float planes, allocated once.
#[derive(Debug, Clone)]
pub struct CpuFieldBackend {
    layout: FieldLayout,
    mask: Plane,
    edge: Plane,
    temps: [Plane; CASCADE_LEVELS],
    levels: [Plane; CASCADE_LEVELS],
    result: Plane,
    normal: FieldTexture,
}

impl CpuFieldBackend {
    pub fn new(size: u32) -> Result<Self, FieldError> {
        let layout = FieldLayout::new(size)?;
        Ok(Self {
            layout,
            mask: Plane::new(size),
            edge: Plane::new(size),
            temps: layout.levels.map(Plane::new),
            levels: layout.levels.map(Plane::new),
            result: Plane::new(size),
            normal: FieldTexture::neutral(size),
        })
    }

    /// Borrow the normal map without copying.
    pub fn normal_map(&self) -> &FieldTexture {
        &self.normal
    }

    pub fn level(&self, index: usize) -> Option<&Plane> {
        self.levels.get(index)
    }

    fn plane(&self, target: FieldTarget) -> Option<&Plane> {
        match target {
            FieldTarget::Mask => Some(&self.mask),
            FieldTarget::Edge => Some(&self.edge),
            FieldTarget::Blur(i) => self.levels.get(i),
            FieldTarget::Result => Some(&self.result),
            FieldTarget::NormalMap => None,
        }
    }
}

impl FieldBackend for CpuFieldBackend {
    fn layout(&self) -> FieldLayout {
        self.layout
    }

    fn upload_mask(&mut self, mask: &GlyphMask) -> Result<(), FieldError> {
        if mask.size() != self.layout.size {
            return Err(FieldError::Rasterizer(format!(
                "mask is {}x{}, field is {}x{}",
                mask.size(),
                mask.size(),
                self.layout.size,
                self.layout.size
            )));
        }
        self.mask.fill_from(mask.coverage().iter().map(|&c| c as f32));
        Ok(())
    }

    fn edge_detect(&mut self) -> Result<(), FieldError> {
        kernels::sobel(&self.mask, &mut self.edge);
        Ok(())
    }

    fn blur_level(&mut self, level: usize) -> Result<(), FieldError> {
        let radius = BLUR_RADII[level];
        if level == 0 {
            kernels::blur_level(&self.edge, &mut self.temps[0], &mut self.levels[0], radius);
        } else {
            let (done, rest) = self.levels.split_at_mut(level);
            kernels::blur_level(&done[level - 1], &mut self.temps[level], &mut rest[0], radius);
        }
        Ok(())
    }

    fn blend(&mut self) -> Result<(), FieldError> {
        kernels::blend(&self.levels, &mut self.result);
        Ok(())
    }

    fn encode_normal_map(&mut self) -> Result<(), FieldError> {
        kernels::normal_map(&self.result, &mut self.normal);
        Ok(())
    }

    fn read_normal_map(&self) -> Result<FieldTexture, FieldError> {
        Ok(self.normal.clone())
    }

    fn read_target(&self, target: FieldTarget) -> Result<RgbaImage, FieldError> {
        if target == FieldTarget::NormalMap {
            return Ok(self.normal.to_image());
        }
        let plane = self
            .plane(target)
            .ok_or_else(|| FieldError::Rasterizer(format!("no texture for {:?}", target)))?;
        let gray = plane.to_gray_bytes();
        let size = plane.size();
        Ok(RgbaImage::from_fn(size, size, |x, y| {
            let v = gray[(y * size + x) as usize];
            Rgba([v, v, v, 255])
        }))
    }
}

/// Sample the CPU normal map directly as an attraction field.
impl crate::physics::AttractionField for CpuFieldBackend {
    fn sample(&self, uv: Vec2) -> glam::Vec4 {
        self.normal.sample(uv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BlockFont, FieldStage, TextFieldGenerator, TextUpdate};

    fn generator(size: u32) -> TextFieldGenerator<CpuFieldBackend> {
        TextFieldGenerator::new(CpuFieldBackend::new(size).unwrap(), Box::new(BlockFont))
    }

    #[test]
    fn test_update_runs_every_stage() {
        let mut field = generator(64);
        assert_eq!(field.stage(), FieldStage::Uninitialized);
        let update = field.update_text("HI").unwrap();
        assert!(matches!(update, TextUpdate::Regenerated { .. }));
        assert_eq!(field.stage(), FieldStage::Ready);
        assert_eq!(field.text(), Some("HI"));
        assert!(field.backend().level(3).unwrap().data().iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_blank_text_keeps_previous_field() {
        let mut field = generator(64);
        field.update_text("A").unwrap();
        let before = field.normal_map().unwrap();
        assert_eq!(field.update_text("  \t").unwrap(), TextUpdate::Rejected);
        assert_eq!(field.text(), Some("A"));
        assert_eq!(field.stage(), FieldStage::Ready);
        assert_eq!(field.normal_map().unwrap(), before);
    }

    #[test]
    fn test_mask_size_mismatch_is_an_error() {
        let mut backend = CpuFieldBackend::new(32).unwrap();
        assert!(backend.upload_mask(&GlyphMask::empty(16)).is_err());
    }

    #[test]
    fn test_field_points_toward_text() {
        let mut field = generator(64);
        field.update_text("I").unwrap();
        let normals = field.normal_map().unwrap();
        // Left of the glyph the direction has a positive x component.
        let probe = normals.sample(Vec2::new(0.3, 0.5));
        assert!(probe.x > 0.5, "{:?}", probe);
    }

    #[test]
    fn test_stage_images_have_level_sizes() {
        let mut field = generator(64);
        field.update_text("OK").unwrap();
        let backend = field.backend();
        assert_eq!(backend.read_target(FieldTarget::Blur(2)).unwrap().width(), 16);
        assert_eq!(backend.read_target(FieldTarget::NormalMap).unwrap().width(), 64);
    }
}
