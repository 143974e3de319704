//! # textswarm
//!
//! GPU particle swarm that flows into the shape of text.
//!
//! Hundreds of thousands of particles live in two GPU buffers used in
//! ping-pong fashion: each frame a compute pass reads one buffer and writes
//! the next state into the other, then a render pass draws the fresh state
//! as additive point sprites. Particles are steered by an attraction field
//! generated from a string: the text is rasterized, edge detected, blurred
//! through a cascade of resolutions, blended into an approximate distance
//! field and encoded as a normal map.
//!
//! ## Quick Start
//!
//! ```ignore
//! use textswarm::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = SimConfig::new()
//!         .with_particle_count(500_000)
//!         .with_text("hello");
//!     textswarm::run(config)
//! }
//! ```
//!
//! ## Headless use
//!
//! Every stage has a CPU rendition with the same semantics, so the frame
//! loop runs without a GPU:
//!
//! ```ignore
//! let config = SimConfig::new().with_rasterizer(RasterizerKind::Block);
//! let builder_config = config.clone();
//! let builder: PipelineBuilder<CpuPipeline<ColorParticle>> =
//!     Box::new(move |request| CpuPipeline::new(&builder_config, request));
//! let mut orchestrator = FrameOrchestrator::new(&config, builder);
//! orchestrator.start()?;
//! orchestrator.frame_with_delta(1.0 / 60.0)?;
//! ```
//!
//! ## Controls
//!
//! | Key | Action |
//! |-----|--------|
//! | Up / Down | More / fewer particles |
//! | Tab | Toggle attraction |
//! | F1 / F2 / F3 | Rotating words / clock / static text |
//! | Letters, Enter | Type and show new text |
//! | P | Pause |
//! | Escape | Quit |

pub mod buffers;
pub mod config;
pub mod controls;
pub mod cpu;
pub mod error;
pub mod field;
pub mod gpu;
pub mod input;
pub mod orchestrator;
pub mod particle;
pub mod physics;
pub mod spawn;
pub mod time;
mod window;

pub use bytemuck;
pub use glam::{Vec2, Vec4};
pub use window::{run, App};

/// Common imports for applications and tests.
pub mod prelude {
    pub use crate::buffers::{BufferRoles, PingPong};
    pub use crate::config::{ParticleLayout, RasterizerKind, SimConfig};
    pub use crate::controls::{ControlCommand, ControlEffect, Controls, TextMode};
    pub use crate::cpu::CpuPipeline;
    pub use crate::error::{EngineError, FieldError, GpuError};
    pub use crate::field::{
        BlockFont, FieldBackend, FieldStage, TextFieldGenerator, TextRasterizer, TextUpdate,
    };
    pub use crate::gpu::{GpuContext, GpuPipeline, RenderTarget};
    pub use crate::orchestrator::{
        FrameOrchestrator, FrameOutcome, FramePipeline, PipelineBuilder, PipelineRequest,
    };
    pub use crate::particle::{ColorParticle, ParticleRecord, TypedParticle};
    pub use crate::physics::{PhysicsParams, PointerState, StepInputs};
    pub use crate::spawn::SpawnPattern;
    pub use glam::{Vec2, Vec4};
}
