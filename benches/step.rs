//! Benchmarks for the CPU step, field generation and shader assembly.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use textswarm::field::cpu::CpuFieldBackend;
use textswarm::gpu::shaders;
use textswarm::physics::{integrate, NoField, PhysicsParams};
use textswarm::prelude::*;
use textswarm::spawn::spawn_population;

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate");
    let params = PhysicsParams::default();
    let inputs = StepInputs::new(0.016, 1.0)
        .with_pointer(PointerState::Active(Vec2::ZERO))
        .with_attraction(params.attraction_strength);

    for count in [10_000u32, 100_000] {
        let particles: Vec<ColorParticle> = spawn_population(count, &SpawnPattern::default(), 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &particles, |b, particles| {
            b.iter(|| {
                for (i, p) in particles.iter().enumerate() {
                    black_box(integrate(p, i as u32, &inputs, &params, &NoField));
                }
            })
        });
    }

    group.finish();
}

fn bench_cpu_frame(c: &mut Criterion) {
    let config = SimConfig::new()
        .with_rasterizer(RasterizerKind::Block)
        .with_field_size(128)
        .with_particle_count(50_000);
    let request = PipelineRequest {
        particle_count: config.particle_count,
        width: 320,
        height: 180,
    };
    let mut cpu: CpuPipeline<ColorParticle> = CpuPipeline::new(&config, &request).unwrap();
    cpu.update_text("BENCH").unwrap();
    let inputs = StepInputs::new(0.016, 0.0).with_attraction(config.physics.attraction_strength);

    c.bench_function("cpu_frame_50k", |b| {
        b.iter(|| {
            cpu.simulate(&inputs).unwrap();
            black_box(cpu.render().unwrap())
        })
    });
}

fn bench_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_field");
    group.sample_size(20);

    for size in [128u32, 256] {
        let backend = CpuFieldBackend::new(size).unwrap();
        let mut field = TextFieldGenerator::new(backend, Box::new(BlockFont));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(field.update_text("SWARM").unwrap()))
        });
    }

    group.finish();
}

fn bench_shader_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("shader_generation");

    group.bench_function("simulation_color", |b| {
        b.iter(|| black_box(shaders::simulation_shader::<ColorParticle>()))
    });

    group.bench_function("simulation_typed", |b| {
        b.iter(|| black_box(shaders::simulation_shader::<TypedParticle>()))
    });

    group.bench_function("render_color", |b| {
        b.iter(|| black_box(shaders::render_shader::<ColorParticle>()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_integrate,
    bench_cpu_frame,
    bench_field,
    bench_shader_generation
);
criterion_main!(benches);
