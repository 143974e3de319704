//! Error types for textswarm.
//!
//! GPU resource creation, text field generation and the frame loop each have
//! their own error enum. Construction failures are fatal to the pipeline that
//! was being built; nothing here is retried.

use std::fmt;

use thiserror::Error;

/// Kind of GPU resource whose creation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    Pipeline,
    BindGroup,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Shader => "shader module",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::BindGroup => "bind group",
        };
        f.write_str(name)
    }
}

/// Why a render target cannot be drawn into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetIncomplete {
    /// The texture format cannot be used as a color attachment.
    UnsupportedFormat(wgpu::TextureFormat),
    /// Width or height is zero or exceeds the device limit.
    Dimensions { width: u32, height: u32, max: u32 },
    /// The texture was created without `RENDER_ATTACHMENT` usage.
    MissingAttachmentUsage,
}

impl fmt::Display for TargetIncomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetIncomplete::UnsupportedFormat(format) => {
                write!(f, "format {:?} is not renderable", format)
            }
            TargetIncomplete::Dimensions { width, height, max } => {
                write!(f, "dimensions {}x{} outside 1..={}", width, height, max)
            }
            TargetIncomplete::MissingAttachmentUsage => {
                f.write_str("texture lacks RENDER_ATTACHMENT usage")
            }
        }
    }
}

/// Errors raised while talking to the GPU.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    /// Acquiring the next surface texture failed.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    /// A buffer, texture, pipeline or bind group could not be created.
    #[error("failed to create {kind} '{label}': {reason}")]
    Resource {
        kind: ResourceKind,
        label: String,
        reason: String,
    },
    /// A render target failed its completeness check.
    #[error("render target '{label}' incomplete: {reason}")]
    IncompleteTarget {
        label: String,
        reason: TargetIncomplete,
    },
    /// Failed to map buffer for reading.
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(String),
}

/// Errors raised by the text field generator.
#[derive(Debug, Error)]
pub enum FieldError {
    /// Texture edge length outside the supported range.
    #[error("text field size {0} outside supported range 16..=2048")]
    InvalidSize(u32),
    /// The glyph rasterizer could not produce a mask.
    #[error("text rasterizer failed: {0}")]
    Rasterizer(String),
    /// A debug dump of a stage texture could not be written.
    #[error("failed to save field texture: {0}")]
    Image(#[from] image::ImageError),
    /// A dump directory could not be created.
    #[error("failed to write field dump: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors raised by the frame orchestrator and the window loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Field(#[from] FieldError),
    /// Failed to create event loop.
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// Failed to create window.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// A frame was requested while the pipeline is torn down.
    #[error("pipeline has not been built")]
    NotBuilt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_names_resource() {
        let err = GpuError::Resource {
            kind: ResourceKind::Buffer,
            label: "Particle Buffer A".into(),
            reason: "out of memory".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("buffer"));
        assert!(msg.contains("Particle Buffer A"));
        assert!(msg.contains("out of memory"));
    }

    #[test]
    fn test_incomplete_target_reports_reason() {
        let err = GpuError::IncompleteTarget {
            label: "Blur Level 2".into(),
            reason: TargetIncomplete::Dimensions {
                width: 0,
                height: 64,
                max: 8192,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Blur Level 2"));
        assert!(msg.contains("0x64"));
    }

    #[test]
    fn test_field_error_wraps_gpu() {
        let err: FieldError = GpuError::NoAdapter.into();
        assert!(matches!(err, FieldError::Gpu(GpuError::NoAdapter)));
        let engine: EngineError = err.into();
        assert!(engine.to_string().contains("adapter"));
    }
}
