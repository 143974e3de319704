//! Builder-style configuration for a simulation run.
//!
//! ```ignore
//! let config = SimConfig::new()
//!     .with_particle_count(500_000)
//!     .with_layout(ParticleLayout::Typed)
//!     .with_text("hello")
//!     .with_field_size(512);
//! ```

use crate::controls::{clamp_particle_count, DEFAULT_PARTICLES, DEFAULT_ROTATION_INTERVAL};
use crate::physics::PhysicsParams;
use crate::spawn::SpawnPattern;

/// Which particle record the pipeline stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleLayout {
    /// Position, velocity and an RGB color.
    #[default]
    Color,
    /// Position, velocity and a type index into a three-color palette.
    Typed,
}

/// Which glyph rasterizer draws the text mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterizerKind {
    /// Built-in 5x7 block font; deterministic and always available.
    Block,
    /// System fonts through cosmic-text, falling back to the block font.
    #[default]
    System,
}

/// Text field generator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    /// Edge length of every full-resolution field texture.
    pub size: u32,
    pub rasterizer: RasterizerKind,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            size: 256,
            rasterizer: RasterizerKind::default(),
        }
    }
}

/// Render settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfig {
    /// Point sprite edge in pixels.
    pub point_size: f32,
    /// Zoom applied to simulation coordinates before projection.
    pub view_scale: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            point_size: 1.5,
            view_scale: 1.0,
            width: 1280,
            height: 720,
        }
    }
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub particle_count: u32,
    pub layout: ParticleLayout,
    pub spawn: SpawnPattern,
    pub seed: u64,
    pub physics: PhysicsParams,
    pub field: FieldConfig,
    pub display: DisplayConfig,
    pub text: String,
    pub rotation_words: Vec<String>,
    pub rotation_interval: f32,
}

impl SimConfig {
    pub fn new() -> Self {
        Self {
            particle_count: DEFAULT_PARTICLES,
            layout: ParticleLayout::default(),
            spawn: SpawnPattern::default(),
            seed: 0x5eed,
            physics: PhysicsParams::default(),
            field: FieldConfig::default(),
            display: DisplayConfig::default(),
            text: "RUST".to_string(),
            rotation_words: ["RUST", "WGPU", "SWARM", "TEXT"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
        }
    }

    /// Set the number of particles (clamped to the supported range).
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = clamp_particle_count(count);
        self
    }

    pub fn with_layout(mut self, layout: ParticleLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_spawn(mut self, pattern: SpawnPattern) -> Self {
        self.spawn = pattern;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsParams) -> Self {
        self.physics = physics;
        self
    }

    /// Edge length of the text field textures.
    pub fn with_field_size(mut self, size: u32) -> Self {
        self.field.size = size;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: RasterizerKind) -> Self {
        self.field.rasterizer = rasterizer;
        self
    }

    pub fn with_point_size(mut self, size: f32) -> Self {
        self.display.point_size = size.max(1.0);
        self
    }

    pub fn with_view_scale(mut self, scale: f32) -> Self {
        self.display.view_scale = scale;
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.display.width = width.max(1);
        self.display.height = height.max(1);
        self
    }

    /// Initial text (normalized when the orchestrator starts).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Words cycled in rotate mode and the seconds between them.
    pub fn with_rotation<I, S>(mut self, words: I, interval: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rotation_words = words.into_iter().map(Into::into).collect();
        self.rotation_interval = interval;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{MAX_PARTICLES, MIN_PARTICLES};

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.particle_count, 250_000);
        assert_eq!(config.field.size, 256);
        assert_eq!(config.display.point_size, 1.5);
        assert_eq!(config.spawn, SpawnPattern::GridJitter { extent: 2.0, jitter: 0.0 });
    }

    #[test]
    fn test_builder_clamps_count() {
        assert_eq!(SimConfig::new().with_particle_count(1).particle_count, MIN_PARTICLES);
        assert_eq!(
            SimConfig::new().with_particle_count(u32::MAX).particle_count,
            MAX_PARTICLES
        );
    }

    #[test]
    fn test_builder_chains() {
        let config = SimConfig::new()
            .with_layout(ParticleLayout::Typed)
            .with_seed(9)
            .with_field_size(128)
            .with_rasterizer(RasterizerKind::Block)
            .with_rotation(["a", "b"], 3.0);
        assert_eq!(config.layout, ParticleLayout::Typed);
        assert_eq!(config.seed, 9);
        assert_eq!(config.field.size, 128);
        assert_eq!(config.field.rasterizer, RasterizerKind::Block);
        assert_eq!(config.rotation_words, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.rotation_interval, 3.0);
    }
}
