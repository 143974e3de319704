//! The wgpu frame pipeline: particle buffers, both stages and the text field.

use std::sync::Arc;

use log::debug;

use super::particles::ParticleBuffers;
use super::render::{RenderStage, RenderUniforms};
use super::simulate::SimulateStage;
use super::text_field::GpuFieldBackend;
use super::{GpuContext, RenderTarget};
use crate::buffers::BufferRoles;
use crate::config::{DisplayConfig, SimConfig};
use crate::error::EngineError;
use crate::field::cosmic::make_rasterizer;
use crate::field::{TextFieldGenerator, TextRasterizer, TextUpdate};
use crate::orchestrator::FramePipeline;
use crate::particle::ParticleRecord;
use crate::physics::{PhysicsParams, StepInputs, StepUniforms};
use crate::spawn::spawn_population;

/// Everything bound to one particle count.
///
/// Dropping the pipeline releases both particle buffers and every resource
/// that referenced them.
pub struct GpuPipeline<P: ParticleRecord> {
    ctx: Arc<GpuContext>,
    target: RenderTarget,
    particles: ParticleBuffers<P>,
    simulate: SimulateStage<P>,
    render: RenderStage<P>,
    field: TextFieldGenerator<GpuFieldBackend>,
    physics: PhysicsParams,
    display: DisplayConfig,
    /// Compute work recorded by `simulate`, submitted with the next render.
    pending: Option<wgpu::CommandEncoder>,
}

impl<P: ParticleRecord> GpuPipeline<P> {
    pub fn new(
        ctx: Arc<GpuContext>,
        target: RenderTarget,
        config: &SimConfig,
        particle_count: u32,
    ) -> Result<Self, EngineError> {
        let rasterizer = make_rasterizer(config.field.rasterizer);
        Self::with_rasterizer(ctx, target, config, particle_count, rasterizer)
    }

    pub fn with_rasterizer(
        ctx: Arc<GpuContext>,
        target: RenderTarget,
        config: &SimConfig,
        particle_count: u32,
        rasterizer: Box<dyn TextRasterizer>,
    ) -> Result<Self, EngineError> {
        let initial: Vec<P> = spawn_population(particle_count, &config.spawn, config.seed);
        let particles = ParticleBuffers::new(&ctx, &initial)?;

        let backend = GpuFieldBackend::new(Arc::clone(&ctx), config.field.size)?;
        let simulate = SimulateStage::new(&ctx, &particles, backend.normal_map_view())?;
        let field = TextFieldGenerator::new(backend, rasterizer);

        let (width, height) = target.size();
        let uniforms = RenderUniforms::new(
            config.display.point_size,
            config.display.view_scale,
            width,
            height,
        );
        let render = RenderStage::new(&ctx, target.format(), &uniforms)?;

        debug!(
            "GPU pipeline: {} {} particles, {}x{} {:?} target",
            particle_count,
            P::NAME,
            width,
            height,
            target.format()
        );

        Ok(Self {
            ctx,
            target,
            particles,
            simulate,
            render,
            field,
            physics: config.physics,
            display: config.display,
            pending: None,
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn particles(&self) -> &ParticleBuffers<P> {
        &self.particles
    }

    pub fn field(&self) -> &TextFieldGenerator<GpuFieldBackend> {
        &self.field
    }

    /// Copy the authoritative particle buffer back to the host.
    pub fn read_particles(&mut self) -> Result<Vec<P>, EngineError> {
        self.submit_pending();
        Ok(self.particles.read_back(&self.ctx)?)
    }

    /// Pixels of the last frame when drawing offscreen.
    pub fn read_pixels(&self) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.target.read_pixels(&self.ctx)?)
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.pending.take() {
            self.ctx.queue.submit(Some(encoder.finish()));
        }
    }
}

impl<P: ParticleRecord> FramePipeline for GpuPipeline<P> {
    fn particle_count(&self) -> u32 {
        self.particles.count()
    }

    fn roles(&self) -> BufferRoles {
        self.particles.roles()
    }

    fn simulate(&mut self, inputs: &StepInputs) -> Result<(), EngineError> {
        // The uniform write below must not overtake an unsubmitted step.
        self.submit_pending();

        let uniforms = StepUniforms::new(inputs, &self.physics, self.particles.count());
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.simulate
            .encode(&self.ctx.queue, &mut encoder, &self.particles, &uniforms);
        self.particles.swap();
        self.pending = Some(encoder);
        Ok(())
    }

    fn render(&mut self) -> Result<bool, EngineError> {
        let Some(frame) = self.target.acquire(&self.ctx)? else {
            // Keep the simulation moving even when nothing can be shown.
            self.submit_pending();
            return Ok(false);
        };

        let mut encoder = self.pending.take().unwrap_or_else(|| {
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });
        self.render.encode(&mut encoder, &frame.view, &self.particles);
        self.ctx.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(true)
    }

    fn update_text(&mut self, text: &str) -> Result<TextUpdate, EngineError> {
        self.submit_pending();
        Ok(self.field.update_text(text)?)
    }

    fn sync(&mut self) -> Result<(), EngineError> {
        self.submit_pending();
        self.ctx.wait_idle();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.target.resize(&self.ctx, width, height)?;
        let uniforms = RenderUniforms::new(
            self.display.point_size,
            self.display.view_scale,
            width,
            height,
        );
        self.render.update_uniforms(&self.ctx.queue, &uniforms);
        Ok(())
    }
}
