//! Compute stage: one dispatch advances every particle by one step.

use std::marker::PhantomData;

use wgpu::util::DeviceExt;

use super::particles::ParticleBuffers;
use super::shaders::simulation_shader;
use super::{GpuContext, WORKGROUP_SIZE};
use crate::error::{GpuError, ResourceKind};
use crate::particle::ParticleRecord;
use crate::physics::StepUniforms;

pub struct SimulateStage<P: ParticleRecord> {
    pipeline: wgpu::ComputePipeline,
    uniform_buffer: wgpu::Buffer,
    /// `bind_groups[i]` reads slot `i` and writes the other slot.
    bind_groups: [wgpu::BindGroup; 2],
    _record: PhantomData<P>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl<P: ParticleRecord> SimulateStage<P> {
    pub fn new(
        ctx: &GpuContext,
        particles: &ParticleBuffers<P>,
        field_view: &wgpu::TextureView,
    ) -> Result<Self, GpuError> {
        let shader = ctx.create_shader("Simulation Shader", simulation_shader::<P>())?;

        let initial = StepUniforms {
            particle_count: particles.count(),
            ..bytemuck::Zeroable::zeroed()
        };
        let uniform_buffer = ctx.scoped(ResourceKind::Buffer, "Step Uniforms", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Step Uniforms"),
                contents: bytemuck::bytes_of(&initial),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        })?;

        let sampler = ctx.scoped(ResourceKind::Sampler, "Field Sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Field Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            })
        })?;

        let layout = ctx.scoped(ResourceKind::BindGroup, "Simulation Layout", |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Simulation Bind Group Layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            })
        })?;

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Simulation Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx.scoped(ResourceKind::Pipeline, "Simulation Pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Simulation Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let bind_groups = [
            Self::bind_group(ctx, &layout, particles, 0, &uniform_buffer, field_view, &sampler)?,
            Self::bind_group(ctx, &layout, particles, 1, &uniform_buffer, field_view, &sampler)?,
        ];

        Ok(Self {
            pipeline,
            uniform_buffer,
            bind_groups,
            _record: PhantomData,
        })
    }

    fn bind_group(
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        particles: &ParticleBuffers<P>,
        read: usize,
        uniforms: &wgpu::Buffer,
        field_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> Result<wgpu::BindGroup, GpuError> {
        let label = if read == 0 { "Simulation A->B" } else { "Simulation B->A" };
        ctx.scoped(ResourceKind::BindGroup, label, |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: particles.slot(read).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: particles.slot(1 - read).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(field_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }

    /// Upload this step's uniforms and record the dispatch.
    ///
    /// The caller swaps the buffer roles after encoding.
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        particles: &ParticleBuffers<P>,
        uniforms: &StepUniforms,
    ) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Simulation Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipeline);
        compute_pass.set_bind_group(0, &self.bind_groups[particles.roles().read], &[]);
        let workgroups = particles.count().div_ceil(WORKGROUP_SIZE);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
    }
}
