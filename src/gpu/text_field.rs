//! Field stages as fullscreen render passes.
//!
//! Every texture, uniform buffer and bind group is allocated once in
//! [`GpuFieldBackend::new`]. A regeneration records all passes into one
//! encoder and submits it in [`FieldBackend::finish`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use image::{Rgba, RgbaImage};
use wgpu::util::DeviceExt;

use super::shaders::{blend_shader, blur_shader, edge_shader, normal_shader};
use super::GpuContext;
use crate::error::{FieldError, GpuError, ResourceKind};
use crate::field::{
    FieldBackend, FieldLayout, FieldTarget, FieldTexture, GlyphMask, BLEND_WEIGHTS, BLUR_RADII,
    CASCADE_LEVELS, NEUTRAL_TEXEL,
};

/// Format of every intermediate target.
pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Uniform block shared by the field passes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PassUniforms {
    /// Blur direction in target texels; zero for non-blur passes.
    pub direction: [f32; 2],
    pub target_size: f32,
    pub radius: f32,
    pub weights: [f32; 4],
}

/// A render target and the view passes draw into or sample from.
struct FieldImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl FieldImage {
    fn new(ctx: &GpuContext, label: &str, size: u32) -> Result<Self, GpuError> {
        let texture = ctx.create_target_texture(
            label,
            FIELD_FORMAT,
            size,
            size,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self { texture, view })
    }
}

/// One fullscreen pass: pipeline, bind group and destination.
struct FieldPass {
    label: &'static str,
    pipeline: Arc<wgpu::RenderPipeline>,
    bind_group: wgpu::BindGroup,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Fullscreen-triangle pipeline writing [`FIELD_FORMAT`].
fn pass_pipeline(
    ctx: &GpuContext,
    label: &str,
    source: String,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> Result<(Arc<wgpu::RenderPipeline>, wgpu::BindGroupLayout), GpuError> {
    let shader = ctx.create_shader(label, source)?;
    let bind_group_layout = ctx
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
    let pipeline = ctx.scoped(ResourceKind::Pipeline, label, |device| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: FIELD_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })?;
    Ok((Arc::new(pipeline), bind_group_layout))
}

fn uniform_buffer(ctx: &GpuContext, label: &str, uniforms: PassUniforms) -> Result<wgpu::Buffer, GpuError> {
    ctx.scoped(ResourceKind::Buffer, label, |device| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    })
}

/// Field backend running each stage on the GPU.
pub struct GpuFieldBackend {
    ctx: Arc<GpuContext>,
    layout: FieldLayout,
    mask: wgpu::Texture,
    edge: FieldImage,
    temps: Vec<FieldImage>,
    levels: Vec<FieldImage>,
    result: FieldImage,
    normal: FieldImage,
    edge_pass: FieldPass,
    /// Horizontal then vertical pass per level.
    blur_passes: Vec<[FieldPass; 2]>,
    blend_pass: FieldPass,
    normal_pass: FieldPass,
    encoder: Option<wgpu::CommandEncoder>,
}

impl GpuFieldBackend {
    pub fn new(ctx: Arc<GpuContext>, size: u32) -> Result<Self, FieldError> {
        let layout = FieldLayout::new(size)?;
        let extent = wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        };

        let mask = ctx.scoped(ResourceKind::Texture, "Field Mask", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Field Mask"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: MASK_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        let mask_view = mask.create_view(&wgpu::TextureViewDescriptor::default());

        let edge = FieldImage::new(&ctx, "Field Edge", size)?;
        let mut temps = Vec::with_capacity(CASCADE_LEVELS);
        let mut levels = Vec::with_capacity(CASCADE_LEVELS);
        for (i, &level_size) in layout.levels.iter().enumerate() {
            temps.push(FieldImage::new(&ctx, &format!("Field Blur Temp {}", i), level_size)?);
            levels.push(FieldImage::new(&ctx, &format!("Field Blur {}", i), level_size)?);
        }
        let result = FieldImage::new(&ctx, "Field Result", size)?;
        let normal = FieldImage::new(&ctx, "Field Normal Map", size)?;

        let sampler = ctx.scoped(ResourceKind::Sampler, "Field Pass Sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Field Pass Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            })
        })?;

        // Edge pass.
        let (edge_pipeline, edge_layout) =
            pass_pipeline(&ctx, "Field Edge Pass", edge_shader(), &[texture_entry(0)])?;
        let edge_pass = FieldPass {
            label: "Field Edge Pass",
            bind_group: ctx.scoped(ResourceKind::BindGroup, "Field Edge Pass", |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Field Edge Pass"),
                    layout: &edge_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&mask_view),
                    }],
                })
            })?,
            pipeline: edge_pipeline,
        };

        // Blur passes; level 0 reads the edges, level i reads level i - 1.
        let (blur_pipeline, blur_layout) = pass_pipeline(
            &ctx,
            "Field Blur Pass",
            blur_shader(),
            &[texture_entry(0), sampler_entry(1), uniform_entry(2)],
        )?;
        let mut blur_passes = Vec::with_capacity(CASCADE_LEVELS);
        for level in 0..CASCADE_LEVELS {
            let source = if level == 0 { &edge.view } else { &levels[level - 1].view };
            let radius = BLUR_RADII[level] as f32;
            let target_size = layout.levels[level] as f32;
            let make = |label: &'static str, view: &wgpu::TextureView, direction: [f32; 2]| {
                let uniforms = uniform_buffer(
                    &ctx,
                    label,
                    PassUniforms {
                        direction,
                        target_size,
                        radius,
                        weights: [0.0; 4],
                    },
                )?;
                let bind_group = ctx.scoped(ResourceKind::BindGroup, label, |device| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(label),
                        layout: &blur_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(&sampler),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: uniforms.as_entire_binding(),
                            },
                        ],
                    })
                })?;
                Ok::<_, GpuError>(FieldPass {
                    label,
                    pipeline: Arc::clone(&blur_pipeline),
                    bind_group,
                })
            };
            let horizontal = make("Field Blur Horizontal", source, [1.0, 0.0])?;
            let vertical = make("Field Blur Vertical", &temps[level].view, [0.0, 1.0])?;
            blur_passes.push([horizontal, vertical]);
        }

        // Blend pass.
        let (blend_pipeline, blend_layout) = pass_pipeline(
            &ctx,
            "Field Blend Pass",
            blend_shader(),
            &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                sampler_entry(4),
                uniform_entry(5),
            ],
        )?;
        let blend_uniforms = uniform_buffer(
            &ctx,
            "Field Blend Uniforms",
            PassUniforms {
                direction: [0.0; 2],
                target_size: size as f32,
                radius: 0.0,
                weights: BLEND_WEIGHTS,
            },
        )?;
        let blend_pass = FieldPass {
            label: "Field Blend Pass",
            bind_group: ctx.scoped(ResourceKind::BindGroup, "Field Blend Pass", |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Field Blend Pass"),
                    layout: &blend_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&levels[0].view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&levels[1].view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&levels[2].view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&levels[3].view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: blend_uniforms.as_entire_binding(),
                        },
                    ],
                })
            })?,
            pipeline: blend_pipeline,
        };

        // Normal map pass.
        let (normal_pipeline, normal_layout) =
            pass_pipeline(&ctx, "Field Normal Pass", normal_shader(), &[texture_entry(0)])?;
        let normal_pass = FieldPass {
            label: "Field Normal Pass",
            bind_group: ctx.scoped(ResourceKind::BindGroup, "Field Normal Pass", |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Field Normal Pass"),
                    layout: &normal_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&result.view),
                    }],
                })
            })?,
            pipeline: normal_pipeline,
        };

        // Until the first text arrives the field attracts nowhere.
        let neutral = FieldTexture::neutral(size);
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &normal.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            neutral.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size * NEUTRAL_TEXEL.len() as u32),
                rows_per_image: Some(size),
            },
            extent,
        );

        Ok(Self {
            ctx,
            layout,
            mask,
            edge,
            temps,
            levels,
            result,
            normal,
            edge_pass,
            blur_passes,
            blend_pass,
            normal_pass,
            encoder: None,
        })
    }

    /// View of the normal map, bound by the simulation stage.
    pub fn normal_map_view(&self) -> &wgpu::TextureView {
        &self.normal.view
    }

    fn record(&mut self, pass: Pass) {
        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Field Encoder"),
                })
        });
        let (field_pass, target) = match pass {
            Pass::Edge => (&self.edge_pass, &self.edge.view),
            Pass::BlurHorizontal(level) => (&self.blur_passes[level][0], &self.temps[level].view),
            Pass::BlurVertical(level) => (&self.blur_passes[level][1], &self.levels[level].view),
            Pass::Blend => (&self.blend_pass, &self.result.view),
            Pass::Normal => (&self.normal_pass, &self.normal.view),
        };
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(field_pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
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
            render_pass.set_pipeline(&field_pass.pipeline);
            render_pass.set_bind_group(0, &field_pass.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.encoder = Some(encoder);
    }

    fn texture(&self, target: FieldTarget) -> Option<&wgpu::Texture> {
        match target {
            FieldTarget::Mask => Some(&self.mask),
            FieldTarget::Edge => Some(&self.edge.texture),
            FieldTarget::Blur(i) => self.levels.get(i).map(|l| &l.texture),
            FieldTarget::Result => Some(&self.result.texture),
            FieldTarget::NormalMap => Some(&self.normal.texture),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Edge,
    BlurHorizontal(usize),
    BlurVertical(usize),
    Blend,
    Normal,
}

impl FieldBackend for GpuFieldBackend {
    fn layout(&self) -> FieldLayout {
        self.layout
    }

    fn upload_mask(&mut self, mask: &GlyphMask) -> Result<(), FieldError> {
        let size = self.layout.size;
        if mask.size() != size {
            return Err(FieldError::Rasterizer(format!(
                "mask is {}x{}, field is {}x{}",
                mask.size(),
                mask.size(),
                size,
                size
            )));
        }
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.mask,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &mask.to_alpha(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn edge_detect(&mut self) -> Result<(), FieldError> {
        self.record(Pass::Edge);
        Ok(())
    }

    fn blur_level(&mut self, level: usize) -> Result<(), FieldError> {
        self.record(Pass::BlurHorizontal(level));
        self.record(Pass::BlurVertical(level));
        Ok(())
    }

    fn blend(&mut self) -> Result<(), FieldError> {
        self.record(Pass::Blend);
        Ok(())
    }

    fn encode_normal_map(&mut self) -> Result<(), FieldError> {
        self.record(Pass::Normal);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FieldError> {
        if let Some(encoder) = self.encoder.take() {
            self.ctx.queue.submit(Some(encoder.finish()));
            self.ctx.wait_idle();
        }
        Ok(())
    }

    fn read_normal_map(&self) -> Result<FieldTexture, FieldError> {
        let bytes = self.ctx.read_texture(&self.normal.texture, 4)?;
        Ok(FieldTexture::from_rgba(self.layout.size, &bytes))
    }

    fn read_target(&self, target: FieldTarget) -> Result<RgbaImage, FieldError> {
        let texture = self
            .texture(target)
            .ok_or_else(|| FieldError::Rasterizer(format!("no texture for {:?}", target)))?;
        let (width, height) = (texture.width(), texture.height());
        if target == FieldTarget::Mask {
            let gray = self.ctx.read_texture(texture, 1)?;
            return Ok(RgbaImage::from_fn(width, height, |x, y| {
                let v = gray[(y * width + x) as usize];
                Rgba([v, v, v, 255])
            }));
        }
        let bytes = self.ctx.read_texture(texture, 4)?;
        RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| FieldError::Rasterizer(format!("short readback for {:?}", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 32);
    }
}
