//! Host double buffer
//!
//! Two pre-allocated columnar arenas stand in for the GPU buffers. A step
//! reads the source arena through a [`SourceView`], computes every node in
//! parallel with rayon, then scatters the results into the destination.

use super::host_program::{HostProgram, SourceView, StepUniforms};
use super::{check_buffer_index, field_buffer_size, BindingState, NodeBuffers, StepTarget};
use crate::constants::limits::MAX_FIELD_BYTES;
use crate::error::{MorphError, Result};
use crate::nodes::{MorphNode, NodeStore};
use crate::program::UserUnif;
use rayon::prelude::*;

#[derive(Debug)]
struct HostRun {
    num_nodes: usize,
    user_unifs: Vec<UserUnif>,
}

#[derive(Debug)]
pub struct HostDoubleBuffer {
    arenas: [NodeStore; 2],
    binding: BindingState,
    run: Option<HostRun>,
}

impl HostDoubleBuffer {
    /// Allocates both arenas at `max_nodes`, under the same per-field byte
    /// budget as the GPU buffers
    pub fn allocate(max_nodes: usize) -> Result<Self> {
        field_buffer_size(max_nodes, MAX_FIELD_BYTES)?;
        log::debug!("Allocated host double buffer for {} nodes", max_nodes);
        Ok(Self {
            arenas: [NodeStore::with_len(max_nodes), NodeStore::with_len(max_nodes)],
            binding: BindingState::default(),
            run: None,
        })
    }

    /// Direct access to one arena
    pub fn arena(&self, index: usize) -> Result<&NodeStore> {
        check_buffer_index(index)?;
        Ok(&self.arenas[index])
    }
}

impl NodeBuffers for HostDoubleBuffer {
    fn capacity(&self) -> usize {
        self.arenas[0].len()
    }

    fn write(&mut self, index: usize, store: &NodeStore) -> Result<()> {
        check_buffer_index(index)?;
        self.arenas[index].copy_prefix_from(store)
    }

    fn read(&self, index: usize, n: usize) -> Result<NodeStore> {
        check_buffer_index(index)?;
        self.arenas[index].prefix(n)
    }

    fn bind_as_source(&mut self, index: usize) -> Result<()> {
        self.binding.bind_source(index)
    }

    fn bind_as_destination(&mut self, index: usize) -> Result<()> {
        self.binding.bind_destination(index)
    }
}

impl StepTarget for HostDoubleBuffer {
    type Program = HostProgram;

    fn begin_run(&mut self, program: &HostProgram, num_nodes: usize) -> Result<()> {
        self.run = Some(HostRun {
            num_nodes,
            user_unifs: program.user_unifs.clone(),
        });
        Ok(())
    }

    fn dispatch(&mut self, program: &HostProgram, iter_num: usize, num_nodes: usize) -> Result<()> {
        let (source, destination) = self.binding.pair()?;
        let run = self.run.as_ref().ok_or(MorphError::UnboundBuffers)?;
        let num_nodes = num_nodes.min(run.num_nodes);

        let view = SourceView::new(&self.arenas[source], num_nodes);
        let uniforms = StepUniforms {
            iter_num,
            num_nodes,
            user_unifs: &run.user_unifs,
        };
        let next: Vec<MorphNode> = (0..num_nodes)
            .into_par_iter()
            .map(|i| program.step.step(i, &view, &uniforms))
            .collect();

        let target = &mut self.arenas[destination];
        for (i, node) in next.into_iter().enumerate() {
            target.set_node(i, node)?;
        }
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        self.run = None;
        self.binding.clear();
        Ok(())
    }
}
