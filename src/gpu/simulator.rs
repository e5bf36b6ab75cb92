//! Running compiled programs on the GPU double buffer
//!
//! Every program becomes one compute pipeline with a layout derived from
//! what its entry point actually uses. Per run, the state uniforms are
//! created once and bind groups are built for both parities, so an
//! iteration is just: write `iter_num`, dispatch, submit.

use super::buffers::GpuDoubleBuffer;
use crate::constants::contract::ENTRY_POINT;
use crate::constants::field;
use crate::error::{MorphError, Result};
use crate::nodes::NodeStore;
use crate::program::{BindingSlot, MorphProgram, Program};
use crate::sim::{NodeBuffers, StepTarget, BUFFER_COUNT};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, Buffer, ComputePipeline, Device};

/// Size of the `iter_num` and `num_nodes` uniform buffers
const STATE_UNIFORM_SIZE: u64 = 16;

struct CachedPipeline {
    generation: u64,
    pipeline: ComputePipeline,
}

struct GpuRun {
    program: String,
    generation: u64,
    iter_num_buffer: Buffer,
    /// Kept alive for the bind groups
    _num_nodes_buffer: Buffer,
    _user_unif_buffers: Vec<Buffer>,
    /// Bind groups indexed by source buffer, then group
    bind_groups: [Vec<BindGroup>; BUFFER_COUNT],
    workgroups: u32,
}

/// The GPU double buffer plus the pipelines of the programs run on it
pub struct GpuMorphState {
    buffers: GpuDoubleBuffer,
    pipelines: HashMap<String, CachedPipeline>,
    run: Option<GpuRun>,
}

impl GpuMorphState {
    pub fn new(buffers: GpuDoubleBuffer) -> Self {
        Self {
            buffers,
            pipelines: HashMap::new(),
            run: None,
        }
    }

    pub fn buffers(&self) -> &GpuDoubleBuffer {
        &self.buffers
    }

    fn device(&self) -> Arc<Device> {
        Arc::clone(self.buffers.device())
    }

    /// Runs `create` inside a validation error scope
    fn validated<T>(device: &Device, program: &str, create: impl FnOnce() -> T) -> Result<T> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => Err(MorphError::Compile {
                program: program.to_string(),
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }

    /// Creates the pipeline for `program` unless this exact compile already
    /// has one
    ///
    /// A failure leaves any pipeline of an earlier revision in place.
    pub fn prepare(&mut self, program: &MorphProgram) -> Result<()> {
        if let Some(cached) = self.pipelines.get(&program.name) {
            if cached.generation == program.generation {
                return Ok(());
            }
        }

        let device = self.device();
        let pipeline = Self::validated(&device, &program.name, || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&program.name),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&program.source)),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&program.name),
                layout: None,
                module: &module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        log::debug!(
            "Created pipeline for '{}' (generation {})",
            program.name,
            program.generation
        );
        self.pipelines.insert(
            program.name.clone(),
            CachedPipeline {
                generation: program.generation,
                pipeline,
            },
        );
        Ok(())
    }

    fn pipeline(&self, program: &MorphProgram) -> Result<&ComputePipeline> {
        self.pipelines
            .get(&program.name)
            .filter(|cached| cached.generation == program.generation)
            .map(|cached| &cached.pipeline)
            .ok_or_else(|| MorphError::UnknownProgram(program.name.clone()))
    }

    fn bind_groups(
        &self,
        program: &MorphProgram,
        source: usize,
        iter_num_buffer: &Buffer,
        num_nodes_buffer: &Buffer,
        user_unif_buffers: &[(BindingSlot, Buffer)],
    ) -> Result<Vec<BindGroup>> {
        let handles = &program.handles;
        let destination = (source + 1) % BUFFER_COUNT;
        let source_fields = self.buffers.fields(source)?;
        let destination_fields = self.buffers.fields(destination)?;

        let mut resources: Vec<(BindingSlot, &Buffer)> = Vec::new();
        for f in 0..field::COUNT {
            if let Some(slot) = handles.source_views[f] {
                resources.push((slot, &source_fields[f]));
            }
            if let Some(slot) = handles.output_channels[f] {
                resources.push((slot, &destination_fields[f]));
            }
        }
        if let Some(slot) = handles.iter_num {
            resources.push((slot, iter_num_buffer));
        }
        if let Some(slot) = handles.num_nodes {
            resources.push((slot, num_nodes_buffer));
        }
        for (slot, buffer) in user_unif_buffers {
            resources.push((*slot, buffer));
        }

        let pipeline = self.pipeline(program)?;
        let group_count = handles.max_group().map_or(0, |g| g + 1);
        let device = self.device();
        Self::validated(&device, &program.name, || {
            (0..group_count)
                .map(|group| {
                    let entries: Vec<wgpu::BindGroupEntry> = resources
                        .iter()
                        .filter(|(slot, _)| slot.group == group)
                        .map(|(slot, buffer)| wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource: buffer.as_entire_binding(),
                        })
                        .collect();
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("{} group {} (source {})", program.name, group, source)),
                        layout: &pipeline.get_bind_group_layout(group),
                        entries: &entries,
                    })
                })
                .collect()
        })
    }

    fn uniform_buffer(device: &Device, label: &str, contents: &[u8]) -> Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }
}

impl NodeBuffers for GpuMorphState {
    fn capacity(&self) -> usize {
        self.buffers.capacity()
    }

    fn write(&mut self, index: usize, store: &NodeStore) -> Result<()> {
        self.buffers.write(index, store)
    }

    fn read(&self, index: usize, n: usize) -> Result<NodeStore> {
        self.buffers.read(index, n)
    }

    fn bind_as_source(&mut self, index: usize) -> Result<()> {
        self.buffers.bind_as_source(index)
    }

    fn bind_as_destination(&mut self, index: usize) -> Result<()> {
        self.buffers.bind_as_destination(index)
    }
}

impl StepTarget for GpuMorphState {
    type Program = MorphProgram;

    /// Uploads `num_nodes` and the user uniforms, and builds the bind groups
    /// for both ping-pong directions
    fn begin_run(&mut self, program: &MorphProgram, num_nodes: usize) -> Result<()> {
        self.prepare(program)?;

        let workgroup_width = program.workgroup_size[0].max(1);
        let workgroups = (num_nodes as u64).div_ceil(workgroup_width as u64);
        let max_workgroups = self.device().limits().max_compute_workgroups_per_dimension;
        if workgroups > max_workgroups as u64 {
            return Err(MorphError::Capacity {
                requested: num_nodes,
                capacity: max_workgroups as usize * workgroup_width as usize,
            });
        }

        let device = self.device();
        let iter_num_buffer = Self::uniform_buffer(
            &device,
            "iter_num",
            &[0u8; STATE_UNIFORM_SIZE as usize],
        );
        let num_nodes_buffer = Self::uniform_buffer(
            &device,
            "num_nodes",
            bytemuck::bytes_of(&[num_nodes as i32, 0, 0, 0]),
        );
        let user_unif_buffers: Vec<(BindingSlot, Buffer)> = program
            .user_unifs()
            .iter()
            .zip(&program.handles.user_unifs)
            .filter_map(|(unif, slot)| {
                let slot = (*slot)?;
                let data = unif.uniform_data();
                Some((slot, Self::uniform_buffer(&device, &unif.name, bytemuck::bytes_of(&data))))
            })
            .collect();

        let bind_groups = [
            self.bind_groups(program, 0, &iter_num_buffer, &num_nodes_buffer, &user_unif_buffers)?,
            self.bind_groups(program, 1, &iter_num_buffer, &num_nodes_buffer, &user_unif_buffers)?,
        ];

        self.run = Some(GpuRun {
            program: program.name.clone(),
            generation: program.generation,
            iter_num_buffer,
            _num_nodes_buffer: num_nodes_buffer,
            _user_unif_buffers: user_unif_buffers.into_iter().map(|(_, b)| b).collect(),
            bind_groups,
            workgroups: workgroups as u32,
        });
        Ok(())
    }

    fn dispatch(&mut self, program: &MorphProgram, iter_num: usize, _num_nodes: usize) -> Result<()> {
        let (source, _destination) = self.buffers.binding().pair()?;
        let run = self
            .run
            .as_ref()
            .filter(|run| run.program == program.name && run.generation == program.generation)
            .ok_or(MorphError::UnboundBuffers)?;
        let pipeline = self.pipeline(program)?;

        let queue = self.buffers.queue();
        queue.write_buffer(
            &run.iter_num_buffer,
            0,
            bytemuck::bytes_of(&[iter_num as i32, 0, 0, 0]),
        );

        let device = self.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Morph Step Encoder"),
        });
        if run.workgroups > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Morph Step"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            for (group, bind_group) in run.bind_groups[source].iter().enumerate() {
                pass.set_bind_group(group as u32, bind_group, &[]);
            }
            pass.dispatch_workgroups(run.workgroups, 1, 1);
        }
        // one submission per iteration: the next write of iter_num lands after it
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        self.run = None;
        Ok(())
    }
}
