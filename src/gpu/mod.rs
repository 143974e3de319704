//! GPU device, render targets and resource creation helpers.
//!
//! Every wgpu resource is created through [`GpuContext::scoped`], which wraps
//! the call in validation and out-of-memory error scopes so a failed
//! allocation surfaces as a [`GpuError::Resource`] naming the resource
//! instead of a later panic.

pub mod particles;
pub mod pipeline;
pub mod render;
pub mod shaders;
pub mod simulate;
pub mod text_field;

use std::sync::Arc;

use log::{info, warn};

use crate::error::{GpuError, ResourceKind, TargetIncomplete};

pub use pipeline::GpuPipeline;

/// Threads per compute workgroup.
pub const WORKGROUP_SIZE: u32 = 256;

/// Color format of offscreen targets.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Copies to buffers need rows padded to this many bytes.
pub const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Adapter, device and queue shared by every stage.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Request an adapter (compatible with `surface` when given) and a device.
    pub async fn new(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        Self::with_adapter(instance, surface, false).await
    }

    async fn with_adapter(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        force_fallback_adapter: bool,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn new_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    /// Context without a surface, for offscreen rendering and tests.
    ///
    /// Falls back to a software adapter when no hardware adapter is found.
    pub fn headless() -> Result<Self, GpuError> {
        match pollster::block_on(Self::new(Self::new_instance(), None)) {
            Err(GpuError::NoAdapter) => {
                warn!("No hardware adapter, requesting the fallback adapter");
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::all(),
                    ..Default::default()
                });
                pollster::block_on(Self::with_adapter(instance, None, true))
            }
            other => other,
        }
    }

    /// Largest 2D texture edge the device accepts.
    pub fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Run `create` inside error scopes and report any error as a failure of
    /// the named resource.
    pub fn scoped<T>(
        &self,
        kind: ResourceKind,
        label: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            None => Ok(value),
            Some(error) => Err(GpuError::Resource {
                kind,
                label: label.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    /// Check that a texture can be drawn into before creating it.
    pub fn check_render_target(
        &self,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> Result<(), GpuError> {
        let incomplete = |reason| GpuError::IncompleteTarget {
            label: label.to_string(),
            reason,
        };
        let max = self.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(incomplete(TargetIncomplete::Dimensions { width, height, max }));
        }
        if !usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(incomplete(TargetIncomplete::MissingAttachmentUsage));
        }
        let features = self.adapter.get_texture_format_features(format);
        if !features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            return Err(incomplete(TargetIncomplete::UnsupportedFormat(format)));
        }
        Ok(())
    }

    /// Validated creation of a 2D texture that is rendered into.
    pub fn create_target_texture(
        &self,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> Result<wgpu::Texture, GpuError> {
        self.check_render_target(label, format, width, height, usage)?;
        self.scoped(ResourceKind::Texture, label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        })
    }

    pub fn create_shader(&self, label: &str, source: String) -> Result<wgpu::ShaderModule, GpuError> {
        self.scoped(ResourceKind::Shader, label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
    }

    /// Block until every submitted command has finished.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Copy a texture into host memory, tightly packed.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        bytes_per_texel: u32,
    ) -> Result<Vec<u8>, GpuError> {
        let (width, height) = (texture.width(), texture.height());
        let unpadded = width * bytes_per_texel;
        let padded = unpadded.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;

        let staging = self.scoped(ResourceKind::Buffer, "Texture Readback", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Texture Readback"),
                size: (padded * height) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        })?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let data = self.map_read(&staging)?;
        let mut out = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize).take(height as usize) {
            out.extend_from_slice(&row[..unpadded as usize]);
        }
        Ok(out)
    }

    /// Map a `MAP_READ` buffer and copy its contents out.
    pub fn map_read(&self, buffer: &wgpu::Buffer) -> Result<Vec<u8>, GpuError> {
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait_idle();
        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }
}

/// Additive blending: `src * alpha + dst`.
pub fn additive_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// Texture view acquired for one frame.
pub struct FrameTarget {
    pub view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl FrameTarget {
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

/// Where frames are drawn.
pub enum RenderTarget {
    Surface {
        surface: Arc<wgpu::Surface<'static>>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

impl RenderTarget {
    /// Configure `surface` for the device at the given size.
    pub fn surface(
        ctx: &GpuContext,
        surface: Arc<wgpu::Surface<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::IncompleteTarget {
                label: "Surface".to_string(),
                reason: TargetIncomplete::MissingAttachmentUsage,
            })?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);
        Ok(RenderTarget::Surface { surface, config })
    }

    /// Offscreen color target that can be copied back.
    pub fn offscreen(ctx: &GpuContext, width: u32, height: u32) -> Result<Self, GpuError> {
        let texture = ctx.create_target_texture(
            "Offscreen Target",
            OFFSCREEN_FORMAT,
            width,
            height,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(RenderTarget::Offscreen { texture, view })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            RenderTarget::Surface { config, .. } => config.format,
            RenderTarget::Offscreen { texture, .. } => texture.format(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            RenderTarget::Surface { config, .. } => (config.width, config.height),
            RenderTarget::Offscreen { texture, .. } => (texture.width(), texture.height()),
        }
    }

    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        match self {
            RenderTarget::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&ctx.device, config);
            }
            RenderTarget::Offscreen { .. } => {
                *self = RenderTarget::offscreen(ctx, width, height)?;
            }
        }
        Ok(())
    }

    /// View to draw this frame into; `None` when the frame should be skipped.
    pub fn acquire(&self, ctx: &GpuContext) -> Result<Option<FrameTarget>, GpuError> {
        match self {
            RenderTarget::Offscreen { texture, .. } => Ok(Some(FrameTarget {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                surface_texture: None,
            })),
            RenderTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(frame) => Ok(Some(FrameTarget {
                    view: frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                    surface_texture: Some(frame),
                })),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    warn!("Surface lost or outdated, reconfiguring");
                    surface.configure(&ctx.device, config);
                    Ok(None)
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("Surface timeout, skipping frame");
                    Ok(None)
                }
                Err(e) => Err(GpuError::Surface(e)),
            },
        }
    }

    /// Pixels of an offscreen target as RGBA8 rows.
    pub fn read_pixels(&self, ctx: &GpuContext) -> Result<Option<Vec<u8>>, GpuError> {
        match self {
            RenderTarget::Offscreen { texture, .. } => ctx.read_texture(texture, 4).map(Some),
            RenderTarget::Surface { .. } => Ok(None),
        }
    }
}
