//! Simulation driver
//!
//! Two equally sized buffers take turns: iteration `i` reads buffer `i & 1`
//! and writes buffer `(i + 1) & 1`. After `k` iterations the result is in
//! buffer `k % 2`, so zero iterations leaves the seed as the result.

pub mod host;
pub mod host_program;

pub use host::HostDoubleBuffer;
pub use host_program::{HostProgram, IdentityStep, NodeStep, SourceView, SpringStep, StepUniforms};

use crate::constants::field;
use crate::error::{MorphError, Result};
use crate::nodes::NodeStore;
use crate::program::Program;

/// Number of buffers taking part in the ping-pong
pub const BUFFER_COUNT: usize = 2;

/// Storage for the two node buffers
pub trait NodeBuffers {
    /// Maximum number of nodes each buffer holds
    fn capacity(&self) -> usize;

    /// Overwrites the first `store.len()` nodes of buffer `index`
    fn write(&mut self, index: usize, store: &NodeStore) -> Result<()>;

    /// Reads back the first `n` nodes of buffer `index`
    fn read(&self, index: usize, n: usize) -> Result<NodeStore>;

    fn bind_as_source(&mut self, index: usize) -> Result<()>;

    fn bind_as_destination(&mut self, index: usize) -> Result<()>;
}

/// Buffers that can also execute a program step between them
pub trait StepTarget: NodeBuffers {
    type Program: Program;

    /// Uploads everything that stays constant for a whole run
    fn begin_run(&mut self, program: &Self::Program, num_nodes: usize) -> Result<()>;

    /// Runs one step from the bound source into the bound destination
    fn dispatch(&mut self, program: &Self::Program, iter_num: usize, num_nodes: usize)
        -> Result<()>;

    fn end_run(&mut self) -> Result<()>;
}

pub fn check_buffer_index(index: usize) -> Result<()> {
    if index >= BUFFER_COUNT {
        return Err(MorphError::InvalidBufferIndex(index));
    }
    Ok(())
}

/// Bytes one field buffer needs for `max_nodes`, checked against `limit`
pub fn field_buffer_size(max_nodes: usize, limit: u64) -> Result<u64> {
    let requested = max_nodes as u64 * field::ELEMENT_SIZE;
    if requested > limit {
        return Err(MorphError::BufferLimit { requested, limit });
    }
    Ok(requested)
}

/// Which buffer is bound in which role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingState {
    source: Option<usize>,
    destination: Option<usize>,
}

impl BindingState {
    pub fn bind_source(&mut self, index: usize) -> Result<()> {
        check_buffer_index(index)?;
        self.source = Some(index);
        Ok(())
    }

    pub fn bind_destination(&mut self, index: usize) -> Result<()> {
        check_buffer_index(index)?;
        self.destination = Some(index);
        Ok(())
    }

    /// The bound `(source, destination)` pair; they must be different buffers
    pub fn pair(&self) -> Result<(usize, usize)> {
        match (self.source, self.destination) {
            (Some(source), Some(destination)) if source != destination => {
                Ok((source, destination))
            }
            _ => Err(MorphError::UnboundBuffers),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Runs `num_iters` steps of `program` over the first `num_nodes` nodes
///
/// Buffer 0 must hold the input. Returns the index of the buffer holding the
/// result. A failing step aborts the whole run.
pub fn run<T>(
    target: &mut T,
    program: &T::Program,
    num_nodes: usize,
    num_iters: usize,
) -> Result<usize>
where
    T: StepTarget + ?Sized,
{
    if num_nodes > target.capacity() {
        return Err(MorphError::Capacity {
            requested: num_nodes,
            capacity: target.capacity(),
        });
    }

    target.begin_run(program, num_nodes)?;
    let mut steps = || -> Result<()> {
        for i in 0..num_iters {
            target.bind_as_source(i & 1)?;
            target.bind_as_destination((i + 1) & 1)?;
            target.dispatch(program, i, num_nodes)?;
        }
        Ok(())
    };
    let stepped = steps();
    let ended = target.end_run();
    stepped?;
    ended?;

    Ok(num_iters % 2)
}

/// A seed plus the buffers it is simulated in
#[derive(Debug)]
pub struct Simulation<T> {
    target: T,
    seed: NodeStore,
    result_buffer_index: usize,
}

impl<T: StepTarget> Simulation<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            seed: NodeStore::default(),
            result_buffer_index: 0,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn num_nodes(&self) -> usize {
        self.seed.len()
    }

    pub fn result_buffer_index(&self) -> usize {
        self.result_buffer_index
    }

    /// Writes `seed` into buffer 0, which then holds the result
    pub fn seed(&mut self, seed: NodeStore) -> Result<()> {
        self.target.write(0, &seed)?;
        self.seed = seed;
        self.result_buffer_index = 0;
        Ok(())
    }

    /// Simulates `num_iters` steps starting from the seed
    ///
    /// The seed is rewritten first, since an earlier run may have used
    /// buffer 0 as a destination.
    pub fn run(&mut self, program: &T::Program, num_iters: usize) -> Result<usize> {
        self.target.write(0, &self.seed)?;
        self.result_buffer_index = 0;
        self.result_buffer_index = run(&mut self.target, program, self.seed.len(), num_iters)?;
        Ok(self.result_buffer_index)
    }

    pub fn read_result(&self) -> Result<NodeStore> {
        self.target.read(self.result_buffer_index, self.seed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{generate_grid, ZygoteOptions};
    use glam::{UVec2, Vec4};

    fn seed_store() -> NodeStore {
        NodeStore::from_nodes(&generate_grid(UVec2::new(4, 3), &ZygoteOptions::default()))
    }

    /// Adds one to data.x of every node
    fn counting_program() -> HostProgram {
        HostProgram::from_fn("count", Vec::new(), |i, source, _| {
            let mut node = source.node(i).unwrap_or_default();
            node.data.x += 1.0;
            node
        })
    }

    #[test]
    fn test_binding_state_pairs() {
        let mut state = BindingState::default();
        assert!(matches!(state.pair(), Err(MorphError::UnboundBuffers)));
        state.bind_source(0).unwrap();
        state.bind_destination(0).unwrap();
        assert!(matches!(state.pair(), Err(MorphError::UnboundBuffers)));
        state.bind_destination(1).unwrap();
        assert_eq!(state.pair().unwrap(), (0, 1));
        assert!(matches!(
            state.bind_source(2),
            Err(MorphError::InvalidBufferIndex(2))
        ));
    }

    #[test]
    fn test_field_buffer_size_limit() {
        assert_eq!(field_buffer_size(10, 1000).unwrap(), 160);
        assert!(matches!(
            field_buffer_size(100, 1000),
            Err(MorphError::BufferLimit { requested: 1600, limit: 1000 })
        ));
    }

    #[test]
    fn test_result_index_parity() {
        let seed = seed_store();
        let mut buffers = HostDoubleBuffer::allocate(32).unwrap();
        for k in 0..6 {
            buffers.write(0, &seed).unwrap();
            let result = run(&mut buffers, &HostProgram::identity(), seed.len(), k).unwrap();
            assert_eq!(result, k % 2);
        }
    }

    #[test]
    fn test_zero_iterations_leave_seed() {
        let seed = seed_store();
        let mut buffers = HostDoubleBuffer::allocate(32).unwrap();
        buffers.write(0, &seed).unwrap();
        let result = run(&mut buffers, &counting_program(), seed.len(), 0).unwrap();
        assert_eq!(result, 0);
        assert_eq!(buffers.read(0, seed.len()).unwrap(), seed);
    }

    #[test]
    fn test_identity_reproduces_seed() {
        let seed = seed_store();
        let mut buffers = HostDoubleBuffer::allocate(seed.len()).unwrap();
        for k in [1, 2, 5] {
            buffers.write(0, &seed).unwrap();
            let result = run(&mut buffers, &HostProgram::identity(), seed.len(), k).unwrap();
            assert_eq!(buffers.read(result, seed.len()).unwrap(), seed);
        }
    }

    #[test]
    fn test_each_iteration_reads_previous() {
        let seed = seed_store();
        let mut buffers = HostDoubleBuffer::allocate(32).unwrap();
        buffers.write(0, &seed).unwrap();
        let result = run(&mut buffers, &counting_program(), seed.len(), 7).unwrap();
        let out = buffers.read(result, seed.len()).unwrap();
        assert!(out.data.iter().all(|d| *d == Vec4::new(7.0, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_run_rejects_too_many_nodes() {
        let mut buffers = HostDoubleBuffer::allocate(4).unwrap();
        assert!(matches!(
            run(&mut buffers, &HostProgram::identity(), 5, 1),
            Err(MorphError::Capacity { requested: 5, capacity: 4 })
        ));
    }

    #[test]
    fn test_simulation_reruns_from_seed() {
        let seed = seed_store();
        let mut sim = Simulation::new(HostDoubleBuffer::allocate(32).unwrap());
        sim.seed(seed.clone()).unwrap();
        assert_eq!(sim.read_result().unwrap(), seed);

        let program = counting_program();
        assert_eq!(sim.run(&program, 3).unwrap(), 1);
        assert_eq!(sim.read_result().unwrap().data[0].x, 3.0);

        // the previous run overwrote buffer 0; a new run must still start at the seed
        assert_eq!(sim.run(&program, 2).unwrap(), 0);
        assert_eq!(sim.read_result().unwrap().data[0].x, 2.0);
        assert_eq!(sim.num_nodes(), seed.len());
    }
}
