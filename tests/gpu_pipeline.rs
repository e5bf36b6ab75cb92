//! End-to-end tests on a real device
//!
//! Skipped unless `MORPH_GPU_TESTS=1`; they also skip when no adapter is found.

use glam::UVec2;
use morph::constants::field;
use morph::gpu::{GpuContext, GpuDoubleBuffer, GpuMorphState, MeshRenderer, OffscreenTarget, PointSource};
use morph::nodes::{generate_grid, ZygoteOptions};
use morph::program::{Program, ProgramLoader};
use morph::sim::{HostDoubleBuffer, HostProgram, NodeBuffers, Simulation};
use morph::{reconstruct, MeshColoring, MorphError, NodeStore};
use std::path::Path;

fn gpu_context() -> Option<GpuContext> {
    if std::env::var("MORPH_GPU_TESTS").as_deref() != Ok("1") {
        eprintln!("MORPH_GPU_TESTS not set, skipping");
        return None;
    }
    match GpuContext::headless() {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("No GPU available, skipping: {}", e);
            None
        }
    }
}

fn loader() -> ProgramLoader {
    ProgramLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders"))
}

fn seed(samples: u32) -> NodeStore {
    NodeStore::from_nodes(&generate_grid(
        UVec2::splat(samples),
        &ZygoteOptions {
            with_faces: true,
            ..Default::default()
        },
    ))
}

fn gpu_simulation(context: &GpuContext, max_nodes: usize) -> Simulation<GpuMorphState> {
    let buffers =
        GpuDoubleBuffer::allocate(context.device.clone(), context.queue.clone(), max_nodes).unwrap();
    Simulation::new(GpuMorphState::new(buffers))
}

fn assert_close(a: &NodeStore, b: &NodeStore, tolerance: f32) {
    assert_eq!(a.len(), b.len());
    for f in 0..field::COUNT {
        for (i, (x, y)) in a.column(f).iter().zip(b.column(f)).enumerate() {
            let diff = (*x - *y).abs().max_element();
            assert!(diff <= tolerance, "node {} field {}: {} vs {}", i, field::NAMES[f], x, y);
        }
    }
}

#[test]
fn write_then_read_returns_the_same_nodes() {
    let Some(context) = gpu_context() else { return };
    let mut buffers =
        GpuDoubleBuffer::allocate(context.device.clone(), context.queue.clone(), 64).unwrap();
    let store = seed(4);
    for index in 0..2 {
        buffers.write(index, &store).unwrap();
        assert_eq!(buffers.read(index, store.len()).unwrap(), store);
    }
    assert!(matches!(buffers.write(2, &store), Err(MorphError::InvalidBufferIndex(2))));
}

#[test]
fn oversized_allocation_is_rejected() {
    let Some(context) = gpu_context() else { return };
    let limit = context.limits().max_buffer_size;
    let max_nodes = (limit / field::ELEMENT_SIZE) as usize + 1;
    let result = GpuDoubleBuffer::allocate(context.device.clone(), context.queue.clone(), max_nodes);
    assert!(matches!(result, Err(MorphError::BufferLimit { .. })));
}

#[test]
fn identity_preserves_nodes_for_any_iteration_count() {
    let Some(context) = gpu_context() else { return };
    let program = loader().load("identity.wgsl").unwrap();
    let mut simulation = gpu_simulation(&context, 256);
    let store = seed(6);
    simulation.seed(store.clone()).unwrap();

    for num_iters in [0, 1, 2, 5] {
        let result = simulation.run(&program, num_iters).unwrap();
        assert_eq!(result, num_iters % 2);
        assert_eq!(simulation.read_result().unwrap(), store);
    }
}

#[test]
fn growth_matches_host_spring() {
    let Some(context) = gpu_context() else { return };
    let mut program = loader().load("growth.wgsl").unwrap();
    program.user_unif_mut("spring_len").unwrap().set_value(&[0.8]);
    let mut host_program = HostProgram::spring();
    host_program.user_unif_mut("spring_len").unwrap().set_value(&[0.8]);

    let store = seed(8);
    let mut gpu = gpu_simulation(&context, 256);
    let mut host = Simulation::new(HostDoubleBuffer::allocate(256).unwrap());
    gpu.seed(store.clone()).unwrap();
    host.seed(store).unwrap();

    gpu.run(&program, 10).unwrap();
    host.run(&host_program, 10).unwrap();
    assert_close(&gpu.read_result().unwrap(), &host.read_result().unwrap(), 1e-4);
}

#[test]
fn reloaded_program_gets_a_new_pipeline() {
    let Some(context) = gpu_context() else { return };
    let loader = loader();
    let first = loader.load("identity.wgsl").unwrap();
    let second = loader.load("identity.wgsl").unwrap();
    assert_ne!(first.generation, second.generation);

    let mut simulation = gpu_simulation(&context, 64);
    simulation.seed(seed(3)).unwrap();
    simulation.run(&first, 1).unwrap();
    simulation.run(&second, 1).unwrap();
    assert_eq!(simulation.read_result().unwrap(), seed(3));
}

#[test]
fn failed_reload_keeps_the_old_pipeline() {
    let Some(context) = gpu_context() else { return };
    let good = loader().load("identity.wgsl").unwrap();
    let mut state = GpuMorphState::new(
        GpuDoubleBuffer::allocate(context.device.clone(), context.queue.clone(), 64).unwrap(),
    );
    state.prepare(&good).unwrap();

    let mut broken = good.clone();
    broken.generation += 1_000_000;
    broken.source.push_str("\nfn broken() -> f32 { return undefined_name; }\n");
    assert!(state.prepare(&broken).is_err());
    // the earlier revision is still runnable
    state.prepare(&good).unwrap();
}

#[test]
fn renders_the_reconstructed_mesh() {
    let Some(context) = gpu_context() else { return };
    let program = loader().load("identity.wgsl").unwrap();
    let mut simulation = gpu_simulation(&context, 256);
    simulation.seed(seed(5)).unwrap();
    let result = simulation.run(&program, 1).unwrap();
    let output = simulation.read_result().unwrap();
    let mesh = reconstruct(&output, &MeshColoring::default());
    assert_eq!(mesh.triangle_count(), 2 * 4 * 4);

    let mut renderer = MeshRenderer::new(context.device.clone(), context.queue.clone());
    renderer.upload_mesh(&mesh);
    let target = OffscreenTarget::new(&context.device, [128, 64]);
    let points = simulation.target().buffers().field_buffer(result, field::POS).unwrap();
    renderer.render(
        &target,
        Some(PointSource {
            buffer: points,
            count: output.len() as u32,
        }),
    );

    let pixels = target.read_rgba(&context.device, &context.queue).unwrap();
    assert_eq!(pixels.len(), 128 * 64 * 4);
    // the corner only ever sees the clear color
    let clear = &pixels[..4];
    let drawn = pixels.chunks_exact(4).filter(|p| *p != clear).count();
    assert!(drawn > 0);
}
