//! One pass through the whole pipeline: seed, simulate, read back, reconstruct

use crate::config::MorphConfig;
use crate::error::{MorphError, Result};
use crate::mesh::{reconstruct, MeshData};
use crate::nodes::{generate_grid, grid_indices, grid_node_count, NodeStore};
use crate::program::Program;
use crate::sim::{NodeBuffers, Simulation, StepTarget};
use std::time::{Duration, Instant};

/// Wall-clock time of each pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageDurations {
    pub seed: Duration,
    pub simulate: Duration,
    pub readback: Duration,
    pub reconstruct: Duration,
}

impl StageDurations {
    pub fn total(&self) -> Duration {
        self.seed + self.simulate + self.readback + self.reconstruct
    }

    pub fn log(&self) {
        log::info!("seed:        {:?}", self.seed);
        log::info!("simulate:    {:?}", self.simulate);
        log::info!("readback:    {:?}", self.readback);
        log::info!("reconstruct: {:?}", self.reconstruct);
        log::info!("total:       {:?}", self.total());
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub input: NodeStore,
    pub output: NodeStore,
    pub mesh: MeshData,
    /// Buffer holding `output` on the simulation target
    pub result_buffer_index: usize,
    pub durations: StageDurations,
}

/// The seed nodes described by `config`
pub fn build_seed(config: &MorphConfig) -> NodeStore {
    NodeStore::from_nodes(&generate_grid(
        config.zygote_samples(),
        &config.zygote_options(),
    ))
}

/// Applies `config.unif_overrides` to `program`
///
/// Returns how many overrides matched one of its uniforms; the others are
/// logged and ignored.
pub fn apply_unif_overrides<P: Program + ?Sized>(program: &mut P, config: &MorphConfig) -> usize {
    let mut applied = 0;
    for (name, values) in &config.unif_overrides {
        match program.user_unif_mut(name) {
            Some(unif) => {
                unif.set_value(values);
                log::info!("{} = {:?}", name, unif.value());
                applied += 1;
            }
            None => log::warn!("Program '{}' has no user uniform '{}'", program.name(), name),
        }
    }
    applied
}

/// Seeds `simulation`, runs `config.num_iters` steps of `program` and
/// reconstructs the result
pub fn run_pipeline<T: StepTarget>(
    simulation: &mut Simulation<T>,
    program: &T::Program,
    config: &MorphConfig,
) -> Result<PipelineOutput> {
    let mut durations = StageDurations::default();

    let start = Instant::now();
    let capacity = simulation.target().capacity();
    let requested =
        grid_node_count(config.zygote_samples(), config.with_faces).unwrap_or(usize::MAX);
    if requested > capacity {
        return Err(MorphError::Capacity {
            requested,
            capacity,
        });
    }
    let input = build_seed(config);
    if config.log_input_nodes {
        input.log_nodes("Input nodes");
    }
    if config.log_render_data {
        let indices = grid_indices(config.zygote_samples());
        log::info!("Seed indices ({} triangles):", indices.len() / 3);
        for (i, tri) in indices.chunks_exact(3).enumerate() {
            log::info!("{:4} [{}, {}, {}]", i, tri[0], tri[1], tri[2]);
        }
    }
    simulation.seed(input.clone())?;
    durations.seed = start.elapsed();

    let start = Instant::now();
    let result_buffer_index = simulation.run(program, config.num_iters)?;
    durations.simulate = start.elapsed();
    log::info!(
        "Ran '{}' for {} iterations over {} nodes, result in buffer {}",
        program.name(),
        config.num_iters,
        simulation.num_nodes(),
        result_buffer_index
    );

    let start = Instant::now();
    let output = simulation.read_result()?;
    durations.readback = start.elapsed();
    if config.log_output_nodes {
        output.log_nodes("Output nodes");
    }

    let start = Instant::now();
    let mesh = reconstruct(&output, &config.mesh_coloring());
    durations.reconstruct = start.elapsed();
    if config.log_render_data {
        mesh.log_render_data();
    }

    if config.log_durations {
        durations.log();
    }

    Ok(PipelineOutput {
        input,
        output,
        mesh,
        result_buffer_index,
        durations,
    })
}
