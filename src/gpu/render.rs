//! Render stage: instanced additive point sprites.

use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::particles::ParticleBuffers;
use super::shaders::render_shader;
use super::{additive_blend, GpuContext};
use crate::error::{GpuError, ResourceKind};
use crate::particle::{ParticleRecord, MOTION_FLOATS};

/// Vertices per particle quad (two triangles).
pub const QUAD_VERTICES: u32 = 6;

/// Uniform block of the render shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct RenderUniforms {
    /// Sprite edge in pixels.
    pub point_size: f32,
    pub aspect_ratio: f32,
    pub view_scale: f32,
    pub viewport_height: f32,
}

impl RenderUniforms {
    pub fn new(point_size: f32, view_scale: f32, width: u32, height: u32) -> Self {
        let height = height.max(1);
        Self {
            point_size,
            aspect_ratio: width.max(1) as f32 / height as f32,
            view_scale,
            viewport_height: height as f32,
        }
    }
}

pub struct RenderStage<P: ParticleRecord> {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    _record: PhantomData<P>,
}

impl<P: ParticleRecord> RenderStage<P> {
    pub fn new(
        ctx: &GpuContext,
        format: wgpu::TextureFormat,
        uniforms: &RenderUniforms,
    ) -> Result<Self, GpuError> {
        let shader = ctx.create_shader("Render Shader", render_shader::<P>())?;

        let uniform_buffer = ctx.scoped(ResourceKind::Buffer, "Render Uniforms", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Render Uniforms"),
                contents: bytemuck::bytes_of(uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        })?;

        let uniform_bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Render Uniform Layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let uniform_bind_group = ctx.scoped(ResourceKind::BindGroup, "Render Uniforms", |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Render Uniform Bind Group"),
                layout: &uniform_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            })
        })?;

        let render_pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Render Pipeline Layout"),
                    bind_group_layouts: &[&uniform_bind_group_layout],
                    push_constant_ranges: &[],
                });

        let vertex_attributes = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2, // position
            },
            wgpu::VertexAttribute {
                offset: (MOTION_FLOATS * 4) as wgpu::BufferAddress,
                shader_location: 1,
                format: P::PAYLOAD_FORMAT,
            },
        ];

        let pipeline = ctx.scoped(ResourceKind::Pipeline, "Render Pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: P::STRIDE as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &vertex_attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(additive_blend()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            _record: PhantomData,
        })
    }

    pub fn update_uniforms(&self, queue: &wgpu::Queue, uniforms: &RenderUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Clear `view` to black and draw every particle of the read slot.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        particles: &ParticleBuffers<P>,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_vertex_buffer(0, particles.read().slice(..));
        render_pass.draw(0..QUAD_VERTICES, 0..particles.count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uniforms_layout() {
        assert_eq!(std::mem::size_of::<RenderUniforms>(), 16);
        let u = RenderUniforms::new(1.5, 1.0, 1280, 720);
        assert!((u.aspect_ratio - 1280.0 / 720.0).abs() < 1e-6);
        assert_eq!(u.viewport_height, 720.0);
    }

    #[test]
    fn test_render_uniforms_guard_zero_height() {
        let u = RenderUniforms::new(1.5, 1.0, 0, 0);
        assert_eq!(u.aspect_ratio, 1.0);
        assert_eq!(u.viewport_height, 1.0);
    }
}
