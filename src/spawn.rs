//! Initial particle distributions.
//!
//! Every slot `i` gets its state from a [`SpawnContext`] seeded by the run
//! seed and the slot index, so a population is reproducible for a given seed
//! regardless of how many particles are spawned.
//!
//! ```ignore
//! let particles: Vec<ColorParticle> =
//!     spawn_population(250_000, &SpawnPattern::default(), 7);
//! ```

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::particle::ParticleRecord;

/// Magnitude of the random initial velocity on each axis.
pub const INITIAL_SPEED: f32 = 0.001;

/// How the initial positions are laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnPattern {
    /// Row-major square grid covering `[-extent, extent]²`, one particle per
    /// cell center, displaced by up to `jitter` cells.
    GridJitter { extent: f32, jitter: f32 },
    /// Normally distributed about the origin.
    Gaussian { sigma: f32 },
}

impl Default for SpawnPattern {
    fn default() -> Self {
        SpawnPattern::GridJitter {
            extent: 2.0,
            jitter: 0.0,
        }
    }
}

impl SpawnPattern {
    /// Half-size of the square that contains (almost) every spawned particle.
    pub fn extent(&self) -> f32 {
        match *self {
            SpawnPattern::GridJitter { extent, .. } => extent,
            SpawnPattern::Gaussian { sigma } => sigma * 3.0,
        }
    }
}

/// Per-slot context handed to spawners.
pub struct SpawnContext {
    /// Index of the particle being spawned (0 to count-1).
    pub index: u32,
    /// Total number of particles being spawned.
    pub count: u32,
    rng: SmallRng,
}

impl SpawnContext {
    pub fn new(index: u32, count: u32, seed: u64) -> Self {
        let mixed = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            index,
            count,
            rng: SmallRng::seed_from_u64(mixed),
        }
    }

    /// Normalized progress through the spawn (0.0 to 1.0).
    #[inline]
    pub fn progress(&self) -> f32 {
        self.index as f32 / self.count.max(1) as f32
    }

    /// Random f32 between 0.0 and 1.0.
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Random f32 in the given range.
    #[inline]
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        self.rng.gen_range(min..max)
    }

    /// Random u32 in `[min, max)`.
    #[inline]
    pub fn random_uint(&mut self, min: u32, max: u32) -> u32 {
        self.rng.gen_range(min..max)
    }

    /// Center of this slot's cell in a square grid over `[-extent, extent]²`.
    pub fn grid_cell(&self, extent: f32) -> (Vec2, f32) {
        let grid = (self.count.max(1) as f64).sqrt().ceil() as u32;
        let spacing = 2.0 * extent / grid as f32;
        let gx = self.index % grid;
        let gy = self.index / grid;
        let center = Vec2::new(
            -extent + gx as f32 * spacing + spacing * 0.5,
            -extent + gy as f32 * spacing + spacing * 0.5,
        );
        (center, spacing)
    }

    /// Standard normal sample pair (Box-Muller).
    pub fn random_gaussian(&mut self) -> Vec2 {
        let u1: f32 = self.rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = self.rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = TAU * u2;
        Vec2::new(r * theta.cos(), r * theta.sin())
    }

    /// Small random initial velocity.
    pub fn drift_velocity(&mut self) -> Vec2 {
        Vec2::new(
            self.random_range(-1.0, 1.0) * INITIAL_SPEED,
            self.random_range(-1.0, 1.0) * INITIAL_SPEED,
        )
    }
}

/// Initial state of slot `index` for the given pattern.
pub fn spawn_particle<P: ParticleRecord>(
    index: u32,
    count: u32,
    pattern: &SpawnPattern,
    seed: u64,
) -> P {
    let mut ctx = SpawnContext::new(index, count, seed);
    let position = match *pattern {
        SpawnPattern::GridJitter { extent, jitter } => {
            let (center, spacing) = ctx.grid_cell(extent);
            if jitter > 0.0 {
                let offset = Vec2::new(ctx.random() - 0.5, ctx.random() - 0.5);
                center + offset * spacing * jitter
            } else {
                center
            }
        }
        SpawnPattern::Gaussian { sigma } => ctx.random_gaussian() * sigma,
    };
    let velocity = ctx.drift_velocity();
    P::spawn(&mut ctx, position, velocity)
}

/// Spawn all `count` slots in order.
pub fn spawn_population<P: ParticleRecord>(count: u32, pattern: &SpawnPattern, seed: u64) -> Vec<P> {
    (0..count)
        .map(|i| spawn_particle(i, count, pattern, seed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{ColorParticle, TypedParticle};

    #[test]
    fn test_spawn_context_progress() {
        let ctx = SpawnContext::new(50, 100, 1);
        assert!((ctx.progress() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_grid_covers_domain_in_row_major_order() {
        let pattern = SpawnPattern::GridJitter {
            extent: 2.0,
            jitter: 0.0,
        };
        let particles: Vec<ColorParticle> = spawn_population(100, &pattern, 3);
        // 10x10 grid, spacing 0.4, first cell center at -1.8.
        assert!((particles[0].position[0] - (-1.8)).abs() < 1e-5);
        assert!((particles[0].position[1] - (-1.8)).abs() < 1e-5);
        assert!((particles[1].position[0] - (-1.4)).abs() < 1e-5);
        assert_eq!(particles[1].position[1], particles[0].position[1]);
        assert!((particles[10].position[1] - (-1.4)).abs() < 1e-5);
        for p in &particles {
            assert!(p.position[0].abs() < 2.0 && p.position[1].abs() < 2.0);
            assert!(p.velocity[0].abs() <= INITIAL_SPEED);
            assert!(p.velocity[1].abs() <= INITIAL_SPEED);
            assert!(p.color.iter().all(|c| (0.0..1.0).contains(c)));
        }
    }

    #[test]
    fn test_jitter_stays_inside_cell() {
        let pattern = SpawnPattern::GridJitter {
            extent: 1.0,
            jitter: 1.0,
        };
        let particles: Vec<TypedParticle> = spawn_population(400, &pattern, 9);
        for (i, p) in particles.iter().enumerate() {
            let ctx = SpawnContext::new(i as u32, 400, 9);
            let (center, spacing) = ctx.grid_cell(1.0);
            assert!((p.position[0] - center.x).abs() <= spacing * 0.5 + 1e-6);
            assert!((p.position[1] - center.y).abs() <= spacing * 0.5 + 1e-6);
            assert!([0.0, 1.0, 2.0].contains(&p.kind));
        }
    }

    #[test]
    fn test_spawn_is_reproducible_per_seed() {
        let pattern = SpawnPattern::Gaussian { sigma: 0.5 };
        let a: Vec<ColorParticle> = spawn_population(64, &pattern, 42);
        let b: Vec<ColorParticle> = spawn_population(64, &pattern, 42);
        let c: Vec<ColorParticle> = spawn_population(64, &pattern, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_gaussian_is_centered() {
        let pattern = SpawnPattern::Gaussian { sigma: 0.5 };
        let particles: Vec<TypedParticle> = spawn_population(20_000, &pattern, 1);
        let mean = particles
            .iter()
            .fold(Vec2::ZERO, |acc, p| acc + Vec2::from_array(p.position))
            / particles.len() as f32;
        assert!(mean.length() < 0.03, "mean {:?}", mean);
    }
}
