//! textswarm - particles that flow into text.
//!
//! Usage:
//!   textswarm [--particles N] [--text WORD] [--layout color|typed] [--dump-field DIR]

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use log::info;
use textswarm::config::{ParticleLayout, RasterizerKind, SimConfig};
use textswarm::error::{EngineError, FieldError};
use textswarm::field::cosmic::make_rasterizer;
use textswarm::field::cpu::CpuFieldBackend;
use textswarm::field::{FieldStage, TextFieldGenerator};
use textswarm::spawn::SpawnPattern;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    /// Per-particle RGB color
    Color,
    /// Three particle types with a fixed palette
    Typed,
}

#[derive(Parser)]
#[command(name = "textswarm")]
#[command(about = "GPU particle swarm steered by text-derived attraction fields")]
struct Args {
    /// Number of particles (clamped to 10000..=2000000)
    #[arg(long, default_value_t = 250_000)]
    particles: u32,

    /// Initial text
    #[arg(long, default_value = "RUST")]
    text: String,

    /// Particle record layout
    #[arg(long, value_enum, default_value = "color")]
    layout: Layout,

    /// Edge length of the text field textures
    #[arg(long, default_value_t = 256)]
    field_size: u32,

    /// Use the built-in block font instead of system fonts
    #[arg(long)]
    block_font: bool,

    /// Point sprite size in pixels
    #[arg(long, default_value_t = 1.5)]
    point_size: f32,

    /// Zoom applied to the simulation region
    #[arg(long, default_value_t = 1.0)]
    view_scale: f32,

    /// Spawn with a Gaussian of this sigma instead of a grid
    #[arg(long)]
    gaussian: Option<f32>,

    /// Seed of the initial distribution
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Comma-separated words cycled in rotate mode (F1)
    #[arg(long, value_delimiter = ',')]
    rotate: Vec<String>,

    /// Seconds between rotation words
    #[arg(long, default_value_t = 2.0)]
    interval: f32,

    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Write every text field stage as PNG into this directory and exit
    #[arg(long)]
    dump_field: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> SimConfig {
        let mut config = SimConfig::new()
            .with_particle_count(self.particles)
            .with_text(self.text.clone())
            .with_layout(match self.layout {
                Layout::Color => ParticleLayout::Color,
                Layout::Typed => ParticleLayout::Typed,
            })
            .with_field_size(self.field_size)
            .with_rasterizer(if self.block_font {
                RasterizerKind::Block
            } else {
                RasterizerKind::System
            })
            .with_point_size(self.point_size)
            .with_view_scale(self.view_scale)
            .with_seed(self.seed)
            .with_window_size(self.width, self.height);
        if let Some(sigma) = self.gaussian {
            config = config.with_spawn(SpawnPattern::Gaussian { sigma });
        }
        if !self.rotate.is_empty() {
            config = config.with_rotation(self.rotate.clone(), self.interval);
        }
        config
    }
}

/// Run the field stages on the CPU and save each one.
fn dump_field(config: &SimConfig, dir: &Path) -> Result<(), FieldError> {
    std::fs::create_dir_all(dir)?;
    let backend = CpuFieldBackend::new(config.field.size)?;
    let mut field = TextFieldGenerator::new(backend, make_rasterizer(config.field.rasterizer));
    field.update_text(&config.text)?;
    for (i, stage) in FieldStage::PIPELINE.iter().enumerate() {
        let path = dir.join(format!("{}_{:?}.png", i, stage).to_lowercase());
        field.save_stage_png(*stage, &path)?;
    }
    info!("Wrote field stages for '{}' to {}", config.text, dir.display());
    Ok(())
}

fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();

    if let Some(dir) = &args.dump_field {
        return Ok(dump_field(&config, dir)?);
    }

    info!(
        "{} {:?} particles, text '{}', field {}x{}",
        config.particle_count, config.layout, config.text, config.field.size, config.field.size
    );
    textswarm::run(config)
}
