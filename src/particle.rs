//! Fixed-layout particle records.
//!
//! A record is `position`, `velocity` and a payload (either an RGB color or a
//! categorical type). Records are tightly packed `f32`s so a buffer of `N`
//! particles is exactly `N * STRIDE` bytes on both the CPU and the GPU. The
//! compute shader addresses the buffer as `array<f32>` using [`ParticleRecord::FLOATS`],
//! which avoids the struct padding WGSL would otherwise insert after a `vec3`.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::spawn::SpawnContext;

/// Number of floats every record starts with (position + velocity).
pub const MOTION_FLOATS: usize = 4;

/// Alpha every particle is blended with.
pub const PARTICLE_ALPHA: f32 = 0.6;

/// Colors used for [`TypedParticle`] kinds 0, 1 and 2.
pub const TYPE_PALETTE: [[f32; 3]; 3] = [
    [1.0, 0.35, 0.3],
    [0.3, 0.8, 1.0],
    [1.0, 0.85, 0.3],
];

/// A particle layout usable by the CPU and GPU pipelines.
pub trait ParticleRecord: Pod + Zeroable + Copy + Send + Sync + 'static {
    /// Human-readable layout name.
    const NAME: &'static str;
    /// Record size in `f32` units.
    const FLOATS: usize;
    /// Record size in bytes.
    const STRIDE: usize = Self::FLOATS * 4;
    /// Vertex format of the payload attribute (shader location 1).
    const PAYLOAD_FORMAT: wgpu::VertexFormat;
    /// WGSL type of the payload attribute.
    const PAYLOAD_WGSL: &'static str;
    /// WGSL function `payload_color(payload) -> vec3<f32>`.
    const COLOR_WGSL: &'static str;

    fn position(&self) -> Vec2;
    fn velocity(&self) -> Vec2;

    /// Replace position and velocity, keeping the payload.
    fn with_motion(self, position: Vec2, velocity: Vec2) -> Self;

    /// Build a record with a freshly drawn payload.
    fn spawn(ctx: &mut SpawnContext, position: Vec2, velocity: Vec2) -> Self;

    /// Display color of this record.
    fn color(&self) -> [f32; 3];

    /// Bytes needed to hold `count` records.
    fn buffer_size(count: u32) -> u64 {
        count as u64 * Self::STRIDE as u64
    }
}

/// Particle carrying its own RGB color.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ColorParticle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: [f32; 3],
}

/// Particle with a categorical type (0, 1 or 2) mapped through [`TYPE_PALETTE`].
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TypedParticle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub kind: f32,
}

const _: () = assert!(std::mem::size_of::<ColorParticle>() == 7 * 4);
const _: () = assert!(std::mem::size_of::<TypedParticle>() == 5 * 4);

impl ParticleRecord for ColorParticle {
    const NAME: &'static str = "color";
    const FLOATS: usize = 7;
    const PAYLOAD_FORMAT: wgpu::VertexFormat = wgpu::VertexFormat::Float32x3;
    const PAYLOAD_WGSL: &'static str = "vec3<f32>";
    const COLOR_WGSL: &'static str = r#"
fn payload_color(payload: vec3<f32>) -> vec3<f32> {
    return payload;
}
"#;

    fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }

    fn velocity(&self) -> Vec2 {
        Vec2::from_array(self.velocity)
    }

    fn with_motion(self, position: Vec2, velocity: Vec2) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
            ..self
        }
    }

    fn spawn(ctx: &mut SpawnContext, position: Vec2, velocity: Vec2) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
            color: [ctx.random(), ctx.random(), ctx.random()],
        }
    }

    fn color(&self) -> [f32; 3] {
        self.color
    }
}

impl ParticleRecord for TypedParticle {
    const NAME: &'static str = "typed";
    const FLOATS: usize = 5;
    const PAYLOAD_FORMAT: wgpu::VertexFormat = wgpu::VertexFormat::Float32;
    const PAYLOAD_WGSL: &'static str = "f32";
    const COLOR_WGSL: &'static str = r#"
fn payload_color(payload: f32) -> vec3<f32> {
    var palette = array<vec3<f32>, 3>(
        vec3<f32>(1.0, 0.35, 0.3),
        vec3<f32>(0.3, 0.8, 1.0),
        vec3<f32>(1.0, 0.85, 0.3),
    );
    let kind = u32(clamp(round(payload), 0.0, 2.0));
    return palette[kind];
}
"#;

    fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }

    fn velocity(&self) -> Vec2 {
        Vec2::from_array(self.velocity)
    }

    fn with_motion(self, position: Vec2, velocity: Vec2) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
            ..self
        }
    }

    fn spawn(ctx: &mut SpawnContext, position: Vec2, velocity: Vec2) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
            kind: ctx.random_uint(0, 3) as f32,
        }
    }

    fn color(&self) -> [f32; 3] {
        let kind = self.kind.round().clamp(0.0, 2.0) as usize;
        TYPE_PALETTE[kind]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_matches_struct_size() {
        assert_eq!(ColorParticle::STRIDE, std::mem::size_of::<ColorParticle>());
        assert_eq!(TypedParticle::STRIDE, std::mem::size_of::<TypedParticle>());
    }

    #[test]
    fn test_buffer_size_has_no_padding_drift() {
        for count in [10_000u32, 123_457] {
            let colored = vec![ColorParticle::zeroed(); count as usize];
            let bytes: &[u8] = bytemuck::cast_slice(&colored);
            assert_eq!(bytes.len() as u64, ColorParticle::buffer_size(count));

            let typed = vec![TypedParticle::zeroed(); count as usize];
            let bytes: &[u8] = bytemuck::cast_slice(&typed);
            assert_eq!(bytes.len() as u64, TypedParticle::buffer_size(count));
        }
        assert_eq!(ColorParticle::buffer_size(2_000_000), 56_000_000);
        assert_eq!(TypedParticle::buffer_size(2_000_000), 40_000_000);
    }

    #[test]
    fn test_with_motion_keeps_payload() {
        let p = ColorParticle {
            position: [0.0, 0.0],
            velocity: [0.0, 0.0],
            color: [0.1, 0.2, 0.3],
        };
        let moved = p.with_motion(Vec2::new(1.0, 2.0), Vec2::new(-1.0, 0.5));
        assert_eq!(moved.color, [0.1, 0.2, 0.3]);
        assert_eq!(moved.position(), Vec2::new(1.0, 2.0));
        assert_eq!(moved.velocity(), Vec2::new(-1.0, 0.5));

        let t = TypedParticle {
            position: [0.0; 2],
            velocity: [0.0; 2],
            kind: 2.0,
        };
        assert_eq!(t.with_motion(Vec2::ONE, Vec2::ZERO).kind, 2.0);
        assert_eq!(t.color(), TYPE_PALETTE[2]);
    }

    #[test]
    fn test_motion_occupies_leading_floats() {
        let p = TypedParticle {
            position: [1.0, 2.0],
            velocity: [3.0, 4.0],
            kind: 1.0,
        };
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&p));
        assert_eq!(&floats[..MOTION_FLOATS], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(floats.len(), TypedParticle::FLOATS);
    }
}
