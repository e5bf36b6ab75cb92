//! Morph - grows a mesh from a seed grid with a hot-swappable per-node program
//!
//! Usage: `morph <base path>`. The base path holds `morph.json` and the
//! program directory.

use morph::config::{Backend, MorphConfig};
use morph::constants::field;
use morph::gpu::{GpuContext, GpuDoubleBuffer, GpuMorphState, MeshRenderer, OffscreenTarget, PointSource};
use morph::program::{Program, ProgramLoader, ProgramRegistry};
use morph::sim::{HostDoubleBuffer, HostProgram, Simulation};
use morph::{apply_unif_overrides, run_pipeline, MorphProgram, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn usage() {
    println!("Usage: morph <base path>");
    println!();
    println!("The base path contains morph.json and the program directory.");
}

fn select_active<P: Program>(registry: &mut ProgramRegistry<P>, config: &MorphConfig) -> Result<()> {
    if let Some(name) = &config.active_program {
        registry.set_active_by_name(name)?;
    }
    log::info!(
        "Programs: {:?}, active '{}'",
        registry.names(),
        registry.active()?.name()
    );
    Ok(())
}

fn run_host(config: &MorphConfig) -> Result<()> {
    let mut registry = ProgramRegistry::new();
    registry.replace_all(HostProgram::builtins());
    select_active(&mut registry, config)?;
    apply_unif_overrides(registry.active_mut()?, config);

    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(config.max_nodes)?);
    let output = run_pipeline(&mut simulation, registry.active()?, config)?;
    log::info!(
        "Reconstructed {} triangles from {} nodes",
        output.mesh.triangle_count(),
        output.output.len()
    );
    Ok(())
}

fn run_gpu(base: &Path, config: &MorphConfig) -> Result<()> {
    let context = GpuContext::headless()?;
    // exceeding the platform buffer limits is fatal here, before any program loads
    let buffers = GpuDoubleBuffer::allocate(
        context.device.clone(),
        context.queue.clone(),
        config.max_nodes,
    )?;

    let loader = ProgramLoader::new(config.shader_dir(base));
    let mut registry: ProgramRegistry<MorphProgram> = ProgramRegistry::new();
    registry.replace_all(loader.load_all(&config.morph_programs)?);
    select_active(&mut registry, config)?;
    apply_unif_overrides(registry.active_mut()?, config);

    let mut simulation = Simulation::new(GpuMorphState::new(buffers));
    let output = run_pipeline(&mut simulation, registry.active()?, config)?;

    let mut renderer = MeshRenderer::new(context.device.clone(), context.queue.clone());
    renderer.flags = config.render_flags();
    renderer.debug_color = config.debug_color;
    renderer.upload_mesh(&output.mesh);

    let target = OffscreenTarget::new(&context.device, config.frame_size);
    let points = simulation
        .target()
        .buffers()
        .field_buffer(output.result_buffer_index, field::POS)?;
    renderer.render(
        &target,
        Some(PointSource {
            buffer: points,
            count: output.output.len() as u32,
        }),
    );
    let pixels = target.read_rgba(&context.device, &context.queue)?;
    log::info!(
        "Rendered {}x{} frame: {} triangles, {} points ({} bytes)",
        target.size[0],
        target.size[1],
        output.mesh.triangle_count(),
        output.output.len(),
        pixels.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        usage();
        return ExitCode::SUCCESS;
    }
    let base = PathBuf::from(&args[1]);

    let result = MorphConfig::load(&base).and_then(|config| match config.backend {
        Backend::Host => run_host(&config),
        Backend::Gpu => run_gpu(&base, &config),
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
