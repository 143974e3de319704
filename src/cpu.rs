//! Software rendition of the whole frame: ping-pong step plus point splats.
//!
//! Runs the same per-particle update as the compute shader and the same
//! field stages as the GPU passes, so the orchestrator can be driven without
//! a device.

use glam::Vec2;
use image::RgbaImage;
use log::debug;
use rayon::prelude::*;

use crate::buffers::{BufferRoles, PingPong};
use crate::config::SimConfig;
use crate::error::EngineError;
use crate::field::cosmic::make_rasterizer;
use crate::field::cpu::CpuFieldBackend;
use crate::field::{TextFieldGenerator, TextRasterizer, TextUpdate};
use crate::orchestrator::{FramePipeline, PipelineRequest};
use crate::particle::{ParticleRecord, PARTICLE_ALPHA};
use crate::physics::{integrate, PhysicsParams, StepInputs};
use crate::spawn::spawn_population;

/// Pixel center of a simulation-space position.
pub fn project(position: Vec2, view_scale: f32, width: u32, height: u32) -> Vec2 {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let clip = Vec2::new(position.x / aspect, position.y) * view_scale;
    Vec2::new(
        (clip.x * 0.5 + 0.5) * width as f32,
        (0.5 - clip.y * 0.5) * height as f32,
    )
}

/// Additively splat a `point_size` square centered at `center` (pixels).
///
/// Covers the pixels whose centers fall inside the square, like the
/// rasterized quad does.
pub fn splat(image: &mut RgbaImage, center: Vec2, point_size: f32, color: [f32; 3]) {
    let half = point_size * 0.5;
    let x0 = (center.x - half - 0.5).ceil().max(0.0) as i64;
    let y0 = (center.y - half - 0.5).ceil().max(0.0) as i64;
    let x1 = ((center.x + half - 0.5).ceil() as i64).min(image.width() as i64);
    let y1 = ((center.y + half - 0.5).ceil() as i64).min(image.height() as i64);
    let add = color.map(|c| (c.clamp(0.0, 1.0) * PARTICLE_ALPHA * 255.0).round() as u8);
    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for (channel, a) in pixel.0.iter_mut().zip(add) {
                *channel = channel.saturating_add(a);
            }
            pixel.0[3] = pixel.0[3].saturating_add((PARTICLE_ALPHA * 255.0) as u8);
        }
    }
}

/// Frame pipeline running entirely on the host.
pub struct CpuPipeline<P: ParticleRecord> {
    particles: PingPong<Vec<P>>,
    field: TextFieldGenerator<CpuFieldBackend>,
    physics: PhysicsParams,
    point_size: f32,
    view_scale: f32,
    frame: RgbaImage,
}

impl<P: ParticleRecord> CpuPipeline<P> {
    pub fn new(config: &SimConfig, request: &PipelineRequest) -> Result<Self, EngineError> {
        Self::with_rasterizer(config, request, make_rasterizer(config.field.rasterizer))
    }

    pub fn with_rasterizer(
        config: &SimConfig,
        request: &PipelineRequest,
        rasterizer: Box<dyn TextRasterizer>,
    ) -> Result<Self, EngineError> {
        let count = request.particle_count;
        let initial: Vec<P> = spawn_population(count, &config.spawn, config.seed);
        let zeroed = vec![<P as bytemuck::Zeroable>::zeroed(); count as usize];
        let field = TextFieldGenerator::new(CpuFieldBackend::new(config.field.size)?, rasterizer);
        debug!("CPU pipeline with {} {} particles", count, P::NAME);
        Ok(Self {
            particles: PingPong::new(initial, zeroed),
            field,
            physics: config.physics,
            point_size: config.display.point_size,
            view_scale: config.display.view_scale,
            frame: RgbaImage::new(request.width.max(1), request.height.max(1)),
        })
    }

    /// Authoritative particle state.
    pub fn particles(&self) -> &[P] {
        self.particles.read()
    }

    pub fn field(&self) -> &TextFieldGenerator<CpuFieldBackend> {
        &self.field
    }

    /// Last rendered frame.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }
}

impl<P: ParticleRecord> FramePipeline for CpuPipeline<P> {
    fn particle_count(&self) -> u32 {
        self.particles.read().len() as u32
    }

    fn roles(&self) -> BufferRoles {
        self.particles.roles()
    }

    fn simulate(&mut self, inputs: &StepInputs) -> Result<(), EngineError> {
        let physics = &self.physics;
        let field = self.field.backend();
        let (src, dst) = self.particles.split();
        dst.par_iter_mut()
            .zip(src.par_iter())
            .enumerate()
            .for_each(|(index, (out, particle))| {
                *out = integrate(particle, index as u32, inputs, physics, field);
            });
        self.particles.swap();
        Ok(())
    }

    fn render(&mut self) -> Result<bool, EngineError> {
        let (width, height) = self.frame.dimensions();
        for pixel in self.frame.pixels_mut() {
            pixel.0 = [0, 0, 0, 255];
        }
        for particle in self.particles.read() {
            let center = project(particle.position(), self.view_scale, width, height);
            splat(&mut self.frame, center, self.point_size, particle.color());
        }
        Ok(true)
    }

    fn update_text(&mut self, text: &str) -> Result<TextUpdate, EngineError> {
        Ok(self.field.update_text(text)?)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width > 0 && height > 0 {
            self.frame = RgbaImage::new(width, height);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RasterizerKind;
    use crate::particle::ColorParticle;
    use crate::physics::PointerState;

    fn pipeline(count: u32) -> CpuPipeline<ColorParticle> {
        let config = SimConfig::new().with_rasterizer(RasterizerKind::Block).with_field_size(64);
        let request = PipelineRequest {
            particle_count: count,
            width: 64,
            height: 64,
        };
        CpuPipeline::new(&config, &request).unwrap()
    }

    #[test]
    fn test_project_center_and_corners() {
        assert_eq!(project(Vec2::ZERO, 1.0, 200, 100), Vec2::new(100.0, 50.0));
        // y = 1 is the top edge, x = aspect the right edge.
        assert_eq!(project(Vec2::new(2.0, 1.0), 1.0, 200, 100), Vec2::new(200.0, 0.0));
    }

    #[test]
    fn test_splat_is_additive_and_saturates() {
        let mut image = RgbaImage::new(4, 4);
        splat(&mut image, Vec2::new(1.5, 1.5), 1.0, [1.0, 0.0, 0.0]);
        let once = image.get_pixel(1, 1).0[0];
        assert_eq!(once, (PARTICLE_ALPHA * 255.0).round() as u8);
        assert_eq!(image.get_pixel(2, 1).0[0], 0);
        for _ in 0..10 {
            splat(&mut image, Vec2::new(1.5, 1.5), 1.0, [1.0, 0.0, 0.0]);
        }
        assert_eq!(image.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn test_splat_clips_at_the_border() {
        let mut image = RgbaImage::new(4, 4);
        splat(&mut image, Vec2::new(-0.2, 3.9), 3.0, [0.0, 1.0, 0.0]);
        assert!(image.get_pixel(0, 3).0[1] > 0);
    }

    #[test]
    fn test_step_swaps_and_keeps_count() {
        let mut cpu = pipeline(1000);
        let before = cpu.roles();
        cpu.simulate(&StepInputs::new(0.016, 0.0)).unwrap();
        assert_eq!(cpu.roles().read, before.write);
        assert_eq!(cpu.particle_count(), 1000);
        assert_eq!(cpu.particles().len(), 1000);
    }

    #[test]
    fn test_step_matches_integrating_each_particle() {
        let mut cpu = pipeline(5000);
        let inputs = StepInputs::new(0.016, 2.0)
            .with_pointer(PointerState::Active(Vec2::new(0.2, -0.1)))
            .with_attraction(1.5);
        let physics = cpu.physics;
        let expected: Vec<ColorParticle> = cpu
            .particles()
            .iter()
            .enumerate()
            .map(|(i, p)| integrate(p, i as u32, &inputs, &physics, cpu.field.backend()))
            .collect();

        cpu.simulate(&inputs).unwrap();
        assert_eq!(cpu.particles(), expected.as_slice());
    }

    #[test]
    fn test_pointer_pushes_particles_away() {
        let mut cpu = pipeline(2000);
        let near = |cpu: &CpuPipeline<ColorParticle>| {
            cpu.particles()
                .iter()
                .filter(|p| p.position().length() < 0.1)
                .count()
        };
        let start = near(&cpu);
        assert!(start > 0);
        let inputs = StepInputs::new(0.016, 0.0).with_pointer(PointerState::Active(Vec2::ZERO));
        for _ in 0..60 {
            cpu.simulate(&inputs).unwrap();
        }
        assert!(near(&cpu) < start);
    }

    #[test]
    fn test_render_draws_something() {
        let mut cpu = pipeline(1000);
        assert!(cpu.render().unwrap());
        assert!(cpu.frame().pixels().any(|p| p.0[0] > 0 || p.0[1] > 0 || p.0[2] > 0));
    }
}
