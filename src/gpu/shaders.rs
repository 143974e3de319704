//! WGSL sources for every GPU pass.
//!
//! The simulation and render shaders are generated per particle layout; the
//! field passes share a fullscreen-triangle vertex stage and a small uniform
//! block.

use crate::field::MIN_GRADIENT;
use crate::gpu::WORKGROUP_SIZE;
use crate::particle::{ParticleRecord, MOTION_FLOATS, PARTICLE_ALPHA};
use crate::physics::{DIRECTION_DEAD_ZONE, POINTER_ACTIVE_LIMIT};

/// Same mixing function as [`crate::physics::hash`].
pub const HASH_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn rand01(seed: u32) -> f32 {
    return f32(hash(seed)) / 4294967295.0;
}
"#;

/// Compute shader advancing every particle by one step.
///
/// Reads `src`, writes `dst`; both are flat `f32` arrays with one record
/// every `P::FLOATS` floats.
pub fn simulation_shader<P: ParticleRecord>() -> String {
    format!(
        r#"
struct StepUniforms {{
    delta_time: f32,
    elapsed_time: f32,
    pointer: vec2<f32>,
    attraction_strength: f32,
    field_extent: f32,
    pointer_radius: f32,
    pointer_strength: f32,
    damping: f32,
    jitter: f32,
    max_speed: f32,
    bounds: f32,
    boundary_stiffness: f32,
    particle_count: u32,
    pad0: f32,
    pad1: f32,
}};

const STRIDE: u32 = {stride}u;

@group(0) @binding(0) var<storage, read> src: array<f32>;
@group(0) @binding(1) var<storage, read_write> dst: array<f32>;
@group(0) @binding(2) var<uniform> step: StepUniforms;
@group(0) @binding(3) var field_texture: texture_2d<f32>;
@group(0) @binding(4) var field_sampler: sampler;

{hash}

@compute @workgroup_size({workgroup})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if (index >= step.particle_count) {{
        return;
    }}
    let base = index * STRIDE;
    var pos = vec2<f32>(src[base], src[base + 1u]);
    var vel = vec2<f32>(src[base + 2u], src[base + 3u]);
    let dt = step.delta_time;

    // Attraction along the decoded field direction.
    let uv = vec2<f32>(
        0.5 + pos.x / (2.0 * step.field_extent),
        0.5 - pos.y / (2.0 * step.field_extent),
    );
    let texel = textureSampleLevel(field_texture, field_sampler, uv, 0.0);
    let encoded = texel.rg * 2.0 - 1.0;
    let live = select(0.0, 1.0, length(encoded) >= {dead_zone:?});
    let direction = vec2<f32>(encoded.x, -encoded.y) * live;
    let attraction = direction * step.attraction_strength * texel.b;

    // Pointer repulsion; the sentinel position disables it.
    let away = pos - step.pointer;
    let dist = max(length(away), 0.0001);
    let falloff = max(0.0, 1.0 - dist / step.pointer_radius);
    let pointer_on = select(0.0, 1.0, abs(step.pointer.x) < {pointer_limit:?} && abs(step.pointer.y) < {pointer_limit:?});
    let repulsion = away / dist * step.pointer_strength * falloff * falloff * pointer_on;

    let seed = index ^ hash(bitcast<u32>(step.elapsed_time));
    let jitter = (vec2<f32>(rand01(seed), rand01(seed + 1u)) - 0.5) * (2.0 * step.jitter);

    let outside = pos - clamp(pos, vec2<f32>(-step.bounds), vec2<f32>(step.bounds));
    let containment = -outside * step.boundary_stiffness;

    let accel = attraction + repulsion + jitter + containment;
    vel += accel * dt;
    vel *= max(0.0, 1.0 - step.damping * dt);
    let speed = max(length(vel), 0.000001);
    vel *= min(1.0, step.max_speed / speed);
    pos += vel * dt;

    dst[base] = pos.x;
    dst[base + 1u] = pos.y;
    dst[base + 2u] = vel.x;
    dst[base + 3u] = vel.y;
    for (var i = {motion}u; i < STRIDE; i++) {{
        dst[base + i] = src[base + i];
    }}
}}
"#,
        stride = P::FLOATS,
        hash = HASH_WGSL,
        workgroup = WORKGROUP_SIZE,
        dead_zone = DIRECTION_DEAD_ZONE,
        pointer_limit = POINTER_ACTIVE_LIMIT,
        motion = MOTION_FLOATS,
    )
}

/// Instanced point-sprite shader; one quad of six vertices per particle.
pub fn render_shader<P: ParticleRecord>() -> String {
    format!(
        r#"
struct RenderUniforms {{
    point_size: f32,
    aspect_ratio: f32,
    view_scale: f32,
    viewport_height: f32,
}};

struct VertexOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}};

@group(0) @binding(0) var<uniform> view: RenderUniforms;

{color}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) position: vec2<f32>,
    @location(1) payload: {payload},
) -> VertexOutput {{
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let center = vec2<f32>(position.x / view.aspect_ratio, position.y) * view.view_scale;
    let half_size = view.point_size / view.viewport_height;
    let offset = corners[vertex_index] * vec2<f32>(half_size / view.aspect_ratio, half_size);

    var out: VertexOutput;
    out.clip_position = vec4<f32>(center + offset, 0.0, 1.0);
    out.color = payload_color(payload);
    return out;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    return vec4<f32>(in.color, {alpha:?});
}}
"#,
        color = P::COLOR_WGSL,
        payload = P::PAYLOAD_WGSL,
        alpha = PARTICLE_ALPHA,
    )
}

/// Uniform block shared by the field passes, and the fullscreen triangle.
const FIELD_COMMON: &str = r#"
struct PassUniforms {
    direction: vec2<f32>,
    target_size: f32,
    radius: f32,
    weights: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var out: VertexOutput;
    out.clip_position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    return out;
}
"#;

/// Sobel magnitude of the glyph mask.
pub fn edge_shader() -> String {
    format!(
        r#"{common}
@group(0) @binding(0) var source: texture_2d<f32>;

fn fetch(p: vec2<i32>) -> f32 {{
    let size = vec2<i32>(textureDimensions(source));
    return textureLoad(source, clamp(p, vec2<i32>(0), size - 1), 0).r;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let p = vec2<i32>(floor(in.clip_position.xy));
    let tl = fetch(p + vec2<i32>(-1, -1));
    let t = fetch(p + vec2<i32>(0, -1));
    let tr = fetch(p + vec2<i32>(1, -1));
    let l = fetch(p + vec2<i32>(-1, 0));
    let r = fetch(p + vec2<i32>(1, 0));
    let bl = fetch(p + vec2<i32>(-1, 1));
    let b = fetch(p + vec2<i32>(0, 1));
    let br = fetch(p + vec2<i32>(1, 1));
    let gx = (tr + 2.0 * r + br) - (tl + 2.0 * l + bl);
    let gy = (bl + 2.0 * b + br) - (tl + 2.0 * t + tr);
    let edge = clamp(sqrt(gx * gx + gy * gy), 0.0, 1.0);
    return vec4<f32>(edge, edge, edge, 1.0);
}}
"#,
        common = FIELD_COMMON
    )
}

/// One direction of the separable Gaussian, resampling into the target size.
pub fn blur_shader() -> String {
    format!(
        r#"{common}
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> pass_params: PassUniforms;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let uv = in.clip_position.xy / pass_params.target_size;
    let texel_step = pass_params.direction / pass_params.target_size;
    let radius = i32(pass_params.radius);
    let sigma = max(pass_params.radius * 0.5, 0.5);
    var total = 0.0;
    var weight_sum = 0.0;
    for (var k = -radius; k <= radius; k++) {{
        let w = exp(-f32(k * k) / (2.0 * sigma * sigma));
        total += w * textureSampleLevel(source, source_sampler, uv + texel_step * f32(k), 0.0).r;
        weight_sum += w;
    }}
    let value = total / weight_sum;
    return vec4<f32>(value, value, value, 1.0);
}}
"#,
        common = FIELD_COMMON
    )
}

/// Weighted sum of the four cascade levels.
pub fn blend_shader() -> String {
    format!(
        r#"{common}
@group(0) @binding(0) var level0: texture_2d<f32>;
@group(0) @binding(1) var level1: texture_2d<f32>;
@group(0) @binding(2) var level2: texture_2d<f32>;
@group(0) @binding(3) var level3: texture_2d<f32>;
@group(0) @binding(4) var level_sampler: sampler;
@group(0) @binding(5) var<uniform> pass_params: PassUniforms;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let uv = in.clip_position.xy / pass_params.target_size;
    let w = pass_params.weights;
    let closeness = clamp(
        w.x * textureSampleLevel(level0, level_sampler, uv, 0.0).r
            + w.y * textureSampleLevel(level1, level_sampler, uv, 0.0).r
            + w.z * textureSampleLevel(level2, level_sampler, uv, 0.0).r
            + w.w * textureSampleLevel(level3, level_sampler, uv, 0.0).r,
        0.0,
        1.0,
    );
    return vec4<f32>(closeness, closeness, closeness, 1.0);
}}
"#,
        common = FIELD_COMMON
    )
}

/// Gradient direction and distance proxy of the blended field.
pub fn normal_shader() -> String {
    format!(
        r#"{common}
@group(0) @binding(0) var source: texture_2d<f32>;

fn fetch(p: vec2<i32>) -> f32 {{
    let size = vec2<i32>(textureDimensions(source));
    return textureLoad(source, clamp(p, vec2<i32>(0), size - 1), 0).r;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let p = vec2<i32>(floor(in.clip_position.xy));
    let gradient = vec2<f32>(
        fetch(p + vec2<i32>(1, 0)) - fetch(p + vec2<i32>(-1, 0)),
        fetch(p + vec2<i32>(0, 1)) - fetch(p + vec2<i32>(0, -1)),
    );
    let len = length(gradient);
    var dir = vec2<f32>(0.0);
    if (len > {min_gradient:?}) {{
        dir = gradient / len;
    }}
    let closeness = fetch(p);
    return vec4<f32>(dir * 0.5 + 0.5, 1.0 - closeness, 1.0);
}}
"#,
        common = FIELD_COMMON,
        min_gradient = MIN_GRADIENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{ColorParticle, TypedParticle};

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn test_simulation_shader_validates_for_both_layouts() {
        validate_wgsl(&simulation_shader::<ColorParticle>()).expect("color layout");
        validate_wgsl(&simulation_shader::<TypedParticle>()).expect("typed layout");
    }

    #[test]
    fn test_shaders_avoid_reserved_words_as_names() {
        let reserved = ["active", "filter", "handle", "module", "self", "target", "type", "new"];
        let sources = [
            simulation_shader::<ColorParticle>(),
            render_shader::<ColorParticle>(),
            edge_shader(),
            blur_shader(),
            blend_shader(),
            normal_shader(),
        ];
        for code in &sources {
            for word in reserved {
                for binding in ["let", "var"] {
                    let decl = format!("{} {} ", binding, word);
                    assert!(!code.contains(&decl), "`{}` declared in\n{}", word, code);
                }
            }
        }
        assert!(simulation_shader::<ColorParticle>().contains("* pointer_on;"));
    }

    #[test]
    fn test_simulation_shader_uses_record_stride() {
        assert!(simulation_shader::<ColorParticle>().contains("const STRIDE: u32 = 7u;"));
        assert!(simulation_shader::<TypedParticle>().contains("const STRIDE: u32 = 5u;"));
    }

    #[test]
    fn test_render_shader_validates_for_both_layouts() {
        validate_wgsl(&render_shader::<ColorParticle>()).expect("color layout");
        let typed = render_shader::<TypedParticle>();
        validate_wgsl(&typed).expect("typed layout");
        assert!(typed.contains("@location(1) payload: f32"));
    }

    #[test]
    fn test_field_pass_shaders_validate() {
        validate_wgsl(&edge_shader()).expect("edge");
        validate_wgsl(&blur_shader()).expect("blur");
        validate_wgsl(&blend_shader()).expect("blend");
        validate_wgsl(&normal_shader()).expect("normal");
    }

    #[test]
    fn test_float_constants_are_wgsl_literals() {
        // Debug formatting keeps a decimal point, which WGSL needs for f32.
        let sim = simulation_shader::<ColorParticle>();
        assert!(sim.contains(">= 0.02"));
        assert!(sim.contains("< 100.0"));
        assert!(render_shader::<ColorParticle>().contains("0.6)"));
    }
}
