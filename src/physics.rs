//! Per-particle update rule and the inputs it consumes.
//!
//! [`integrate`] is the CPU statement of exactly what the compute shader in
//! [`crate::gpu::shaders`] does to one particle. It reads nothing but the
//! particle's own record, its slot index and the shared [`StepInputs`], so
//! slots can be processed in any order or in parallel.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::particle::ParticleRecord;

/// Upper bound of the integration step in seconds.
pub const MAX_DELTA: f32 = 0.016;

/// Uniform value meaning "no pointer".
pub const POINTER_SENTINEL: Vec2 = Vec2::new(1000.0, 1000.0);

/// Pointer coordinates at or beyond this magnitude are treated as inactive.
pub const POINTER_ACTIVE_LIMIT: f32 = 100.0;

/// Decoded field directions shorter than this are treated as zero. The
/// 8-bit encoding cannot represent an exact zero direction.
pub const DIRECTION_DEAD_ZONE: f32 = 0.02;

/// Integration step, clamped to `[0, MAX_DELTA]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct DeltaTime(f32);

impl DeltaTime {
    /// Clamp a raw frame delta. Negative and NaN deltas become zero.
    pub fn clamped(raw_seconds: f32) -> Self {
        if raw_seconds.is_nan() {
            return Self(0.0);
        }
        Self(raw_seconds.clamp(0.0, MAX_DELTA))
    }

    #[inline]
    pub fn seconds(self) -> f32 {
        self.0
    }
}

/// Pointer state as seen by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PointerState {
    #[default]
    Inactive,
    /// Pointer position in simulation space.
    Active(Vec2),
}

impl PointerState {
    /// Value uploaded to the GPU; inactive maps to [`POINTER_SENTINEL`].
    pub fn encode(self) -> Vec2 {
        match self {
            PointerState::Inactive => POINTER_SENTINEL,
            PointerState::Active(p) => p,
        }
    }
}

/// 1.0 when an encoded pointer is live, 0.0 for the sentinel range.
#[inline]
pub fn pointer_activity(encoded: Vec2) -> f32 {
    let live = encoded.x.abs() < POINTER_ACTIVE_LIMIT && encoded.y.abs() < POINTER_ACTIVE_LIMIT;
    if live {
        1.0
    } else {
        0.0
    }
}

/// Tunable constants of the update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsParams {
    /// Attraction gain used while attraction is enabled.
    pub attraction_strength: f32,
    /// Half-size of the square region covered by the attraction field.
    pub field_extent: f32,
    pub pointer_radius: f32,
    pub pointer_strength: f32,
    /// Fraction of velocity removed per second.
    pub damping: f32,
    /// Amplitude of the per-step random acceleration.
    pub jitter: f32,
    pub max_speed: f32,
    /// Half-size of the soft containment box.
    pub bounds: f32,
    pub boundary_stiffness: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            attraction_strength: 2.5,
            field_extent: 1.0,
            pointer_radius: 0.35,
            pointer_strength: 6.0,
            damping: 1.6,
            jitter: 0.02,
            max_speed: 3.0,
            bounds: 2.0,
            boundary_stiffness: 4.0,
        }
    }
}

/// Everything that changes from one step to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInputs {
    pub delta: DeltaTime,
    /// Seconds since the loop started.
    pub elapsed: f32,
    pub pointer: PointerState,
    /// Zero while attraction is disabled.
    pub attraction_strength: f32,
}

impl StepInputs {
    pub fn new(raw_delta: f32, elapsed: f32) -> Self {
        Self {
            delta: DeltaTime::clamped(raw_delta),
            elapsed,
            pointer: PointerState::Inactive,
            attraction_strength: 0.0,
        }
    }

    pub fn with_pointer(mut self, pointer: PointerState) -> Self {
        self.pointer = pointer;
        self
    }

    pub fn with_attraction(mut self, strength: f32) -> Self {
        self.attraction_strength = strength;
        self
    }
}

/// Uniform block of the simulation compute shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct StepUniforms {
    pub delta_time: f32,
    pub elapsed_time: f32,
    pub pointer: [f32; 2],
    pub attraction_strength: f32,
    pub field_extent: f32,
    pub pointer_radius: f32,
    pub pointer_strength: f32,
    pub damping: f32,
    pub jitter: f32,
    pub max_speed: f32,
    pub bounds: f32,
    pub boundary_stiffness: f32,
    pub particle_count: u32,
    pub _pad: [f32; 2],
}

impl StepUniforms {
    pub fn new(inputs: &StepInputs, params: &PhysicsParams, particle_count: u32) -> Self {
        Self {
            delta_time: inputs.delta.seconds(),
            elapsed_time: inputs.elapsed,
            pointer: inputs.pointer.encode().to_array(),
            attraction_strength: inputs.attraction_strength,
            field_extent: params.field_extent,
            pointer_radius: params.pointer_radius,
            pointer_strength: params.pointer_strength,
            damping: params.damping,
            jitter: params.jitter,
            max_speed: params.max_speed,
            bounds: params.bounds,
            boundary_stiffness: params.boundary_stiffness,
            particle_count,
            _pad: [0.0; 2],
        }
    }
}

/// A sampled attraction field: RGBA in `[0, 1]` at a texture coordinate.
pub trait AttractionField {
    fn sample(&self, uv: Vec2) -> Vec4;
}

/// Field that never attracts (encoded zero direction).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoField;

impl AttractionField for NoField {
    fn sample(&self, _uv: Vec2) -> Vec4 {
        Vec4::new(0.5, 0.5, 0.0, 1.0)
    }
}

/// Simulation space to field texture coordinates (row 0 at the top).
#[inline]
pub fn field_uv(position: Vec2, extent: f32) -> Vec2 {
    Vec2::new(
        0.5 + position.x / (2.0 * extent),
        0.5 - position.y / (2.0 * extent),
    )
}

/// Hash used for per-particle jitter; same constants as the WGSL `hash`.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Random float in `[0, 1]` from a seed.
#[inline]
pub fn rand01(seed: u32) -> f32 {
    hash(seed) as f32 / 4_294_967_295.0
}

/// Advance one particle by one step.
pub fn integrate<P, F>(
    particle: &P,
    index: u32,
    inputs: &StepInputs,
    params: &PhysicsParams,
    field: &F,
) -> P
where
    P: ParticleRecord,
    F: AttractionField + ?Sized,
{
    let dt = inputs.delta.seconds();
    let pos = particle.position();
    let mut vel = particle.velocity();

    // Attraction along the decoded field direction.
    let texel = field.sample(field_uv(pos, params.field_extent));
    let encoded = Vec2::new(texel.x * 2.0 - 1.0, texel.y * 2.0 - 1.0);
    let live = if encoded.length() >= DIRECTION_DEAD_ZONE { 1.0 } else { 0.0 };
    let direction = Vec2::new(encoded.x, -encoded.y) * live;
    let attraction = direction * inputs.attraction_strength * texel.z;

    // Pointer repulsion, exactly zero outside the radius or when inactive.
    let pointer = inputs.pointer.encode();
    let away = pos - pointer;
    let dist = away.length().max(1e-4);
    let falloff = (1.0 - dist / params.pointer_radius).max(0.0);
    let repulsion =
        away / dist * params.pointer_strength * falloff * falloff * pointer_activity(pointer);

    let seed = index ^ hash(inputs.elapsed.to_bits());
    let jitter = Vec2::new(rand01(seed) - 0.5, rand01(seed.wrapping_add(1)) - 0.5)
        * (2.0 * params.jitter);

    let outside = pos - pos.clamp(Vec2::splat(-params.bounds), Vec2::splat(params.bounds));
    let containment = -outside * params.boundary_stiffness;

    let accel = attraction + repulsion + jitter + containment;
    vel += accel * dt;
    vel *= (1.0 - params.damping * dt).max(0.0);
    let speed = vel.length().max(1e-6);
    vel *= (params.max_speed / speed).min(1.0);

    particle.with_motion(pos + vel * dt, vel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ColorParticle;

    fn particle(x: f32, y: f32) -> ColorParticle {
        ColorParticle {
            position: [x, y],
            velocity: [0.0, 0.0],
            color: [0.2, 0.4, 0.6],
        }
    }

    /// Field pointing every sample toward +x in simulation space.
    struct EastField;

    impl AttractionField for EastField {
        fn sample(&self, _uv: Vec2) -> Vec4 {
            Vec4::new(1.0, 0.5, 1.0, 1.0)
        }
    }

    #[test]
    fn test_delta_clamp() {
        assert_eq!(DeltaTime::clamped(0.5).seconds(), MAX_DELTA);
        assert_eq!(DeltaTime::clamped(-1.0).seconds(), 0.0);
        assert_eq!(DeltaTime::clamped(f32::NAN).seconds(), 0.0);
        assert_eq!(DeltaTime::clamped(f32::INFINITY).seconds(), MAX_DELTA);
        assert_eq!(DeltaTime::clamped(0.01).seconds(), 0.01);
    }

    #[test]
    fn test_large_delta_matches_max_delta() {
        let params = PhysicsParams::default();
        let p = particle(0.3, -0.2);
        let slow = StepInputs::new(0.25, 1.0).with_attraction(2.0);
        let capped = StepInputs::new(MAX_DELTA, 1.0).with_attraction(2.0);
        for index in 0..32 {
            let a = integrate(&p, index, &slow, &params, &EastField);
            let b = integrate(&p, index, &capped, &params, &EastField);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_far_pointer_equals_inactive() {
        let params = PhysicsParams::default();
        let mut a = particle(0.1, 0.1);
        let mut b = a;
        let far = PointerState::Active(Vec2::new(50.0, -50.0));
        for step in 0..200 {
            let elapsed = step as f32 / 60.0;
            let base = StepInputs::new(1.0 / 60.0, elapsed);
            a = integrate(&a, 7, &base.with_pointer(far), &params, &NoField);
            b = integrate(&b, 7, &base.with_pointer(PointerState::Inactive), &params, &NoField);
            assert_eq!(a, b, "diverged at step {}", step);
        }
    }

    #[test]
    fn test_pointer_repels_nearby_particle() {
        let params = PhysicsParams {
            jitter: 0.0,
            ..Default::default()
        };
        let p = particle(0.1, 0.0);
        let inputs = StepInputs::new(MAX_DELTA, 0.0)
            .with_pointer(PointerState::Active(Vec2::ZERO));
        let next = integrate(&p, 0, &inputs, &params, &NoField);
        assert!(next.velocity[0] > 0.0);
        assert_eq!(next.velocity[1], 0.0);
    }

    #[test]
    fn test_attraction_follows_field_and_scales_with_strength() {
        let params = PhysicsParams {
            jitter: 0.0,
            ..Default::default()
        };
        let p = particle(0.0, 0.0);
        let weak = StepInputs::new(MAX_DELTA, 0.0).with_attraction(1.0);
        let strong = StepInputs::new(MAX_DELTA, 0.0).with_attraction(2.0);
        let a = integrate(&p, 0, &weak, &params, &EastField);
        let b = integrate(&p, 0, &strong, &params, &EastField);
        assert!(a.velocity[0] > 0.0);
        assert!(b.velocity[0] > a.velocity[0]);

        let off = StepInputs::new(MAX_DELTA, 0.0);
        let c = integrate(&p, 0, &off, &params, &EastField);
        assert_eq!(c.velocity, [0.0, 0.0]);
    }

    #[test]
    fn test_payload_is_copied_through() {
        let params = PhysicsParams::default();
        let p = particle(1.0, 1.0);
        let next = integrate(&p, 3, &StepInputs::new(0.016, 2.0), &params, &NoField);
        assert_eq!(next.color, p.color);
    }

    #[test]
    fn test_containment_pulls_back_inside() {
        let params = PhysicsParams {
            jitter: 0.0,
            ..Default::default()
        };
        let p = particle(3.0, 0.0);
        let next = integrate(&p, 0, &StepInputs::new(MAX_DELTA, 0.0), &params, &NoField);
        assert!(next.velocity[0] < 0.0);
    }

    #[test]
    fn test_field_uv_maps_extent_to_unit_square() {
        assert_eq!(field_uv(Vec2::ZERO, 1.0), Vec2::new(0.5, 0.5));
        assert_eq!(field_uv(Vec2::new(-1.0, 1.0), 1.0), Vec2::new(0.0, 0.0));
        assert_eq!(field_uv(Vec2::new(2.0, -2.0), 2.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(std::mem::size_of::<StepUniforms>(), 64);
        let inputs = StepInputs::new(0.01, 0.0);
        let u = StepUniforms::new(&inputs, &PhysicsParams::default(), 10);
        assert_eq!(u.pointer, [1000.0, 1000.0]);
        assert_eq!(u.particle_count, 10);
    }
}
