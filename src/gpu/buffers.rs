//! GPU double buffer
//!
//! Each of the two buffers is four field buffers (pos, vel, neighbors, data)
//! of `max_nodes` vec4 elements. Every field buffer is usable both as a
//! vertex stream (attribute slot = field index) and as a storage binding the
//! simulation programs index by node.

use crate::constants::field;
use crate::error::{MorphError, Result};
use crate::nodes::NodeStore;
use crate::sim::{check_buffer_index, field_buffer_size, BindingState, NodeBuffers, BUFFER_COUNT};
use glam::Vec4;
use std::sync::{mpsc, Arc};
use wgpu::{Buffer, BufferUsages, Device, Queue, VertexAttribute, VertexBufferLayout};

const FIELD_ATTRIBUTES: [[VertexAttribute; 1]; field::COUNT] = [
    wgpu::vertex_attr_array![0 => Float32x4],
    wgpu::vertex_attr_array![1 => Float32x4],
    wgpu::vertex_attr_array![2 => Float32x4],
    wgpu::vertex_attr_array![3 => Float32x4],
];

/// Vertex stream layout of field `field_index`: one vec4 per node at
/// attribute slot `field_index`
pub fn field_vertex_layout(field_index: usize) -> VertexBufferLayout<'static> {
    VertexBufferLayout {
        array_stride: field::ELEMENT_SIZE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &FIELD_ATTRIBUTES[field_index],
    }
}

/// The fixed vertex input contract, one layout per field in slot order
pub fn vertex_buffer_layouts() -> [VertexBufferLayout<'static>; field::COUNT] {
    [
        field_vertex_layout(field::POS),
        field_vertex_layout(field::VEL),
        field_vertex_layout(field::NEIGHBORS),
        field_vertex_layout(field::DATA),
    ]
}

pub struct GpuDoubleBuffer {
    device: Arc<Device>,
    queue: Arc<Queue>,
    fields: [[Buffer; field::COUNT]; BUFFER_COUNT],
    max_nodes: usize,
    binding: BindingState,
}

impl GpuDoubleBuffer {
    /// Allocates both buffers at `max_nodes`
    ///
    /// Fails when one field buffer would exceed the device's buffer or
    /// storage binding size limits.
    pub fn allocate(device: Arc<Device>, queue: Arc<Queue>, max_nodes: usize) -> Result<Self> {
        let limits = device.limits();
        let limit = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        // zero-sized buffers cannot be bound
        let size = field_buffer_size(max_nodes, limit)?.max(field::ELEMENT_SIZE);

        let usage = BufferUsages::VERTEX
            | BufferUsages::STORAGE
            | BufferUsages::COPY_SRC
            | BufferUsages::COPY_DST;
        let create_field = |buffer_index: usize, field_index: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!(
                    "Node Buffer {} {}",
                    buffer_index,
                    field::NAMES[field_index]
                )),
                size,
                usage,
                mapped_at_creation: false,
            })
        };
        let fields = [0, 1].map(|b| {
            [field::POS, field::VEL, field::NEIGHBORS, field::DATA].map(|f| create_field(b, f))
        });

        log::info!(
            "Allocated node buffers: 2 x {} fields x {} bytes ({} nodes)",
            field::COUNT,
            size,
            max_nodes
        );

        Ok(Self {
            device,
            queue,
            fields,
            max_nodes,
            binding: BindingState::default(),
        })
    }

    /// Field buffer `field_index` of buffer `index`
    pub fn field_buffer(&self, index: usize, field_index: usize) -> Result<&Buffer> {
        check_buffer_index(index)?;
        self.fields[index]
            .get(field_index)
            .ok_or(MorphError::IndexOutOfBounds {
                index: field_index,
                len: field::COUNT,
            })
    }

    pub fn fields(&self, index: usize) -> Result<&[Buffer; field::COUNT]> {
        check_buffer_index(index)?;
        Ok(&self.fields[index])
    }

    pub fn binding(&self) -> &BindingState {
        &self.binding
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    fn check_count(&self, n: usize) -> Result<()> {
        if n > self.max_nodes {
            return Err(MorphError::Capacity {
                requested: n,
                capacity: self.max_nodes,
            });
        }
        Ok(())
    }
}

impl NodeBuffers for GpuDoubleBuffer {
    fn capacity(&self) -> usize {
        self.max_nodes
    }

    fn write(&mut self, index: usize, store: &NodeStore) -> Result<()> {
        check_buffer_index(index)?;
        self.check_count(store.len())?;
        if store.is_empty() {
            return Ok(());
        }
        for (field_index, buffer) in self.fields[index].iter().enumerate() {
            self.queue
                .write_buffer(buffer, 0, bytemuck::cast_slice(store.column(field_index)));
        }
        Ok(())
    }

    /// Blocks until the first `n` nodes of buffer `index` are back on the host
    fn read(&self, index: usize, n: usize) -> Result<NodeStore> {
        check_buffer_index(index)?;
        self.check_count(n)?;
        if n == 0 {
            return Ok(NodeStore::default());
        }

        let column_bytes = n as u64 * field::ELEMENT_SIZE;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Readback Buffer"),
            size: column_bytes * field::COUNT as u64,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Node Readback Encoder"),
            });
        for (field_index, buffer) in self.fields[index].iter().enumerate() {
            encoder.copy_buffer_to_buffer(
                buffer,
                0,
                &staging,
                field_index as u64 * column_bytes,
                column_bytes,
            );
        }
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| MorphError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| MorphError::Readback(e.to_string()))?
            .map_err(|e| MorphError::Readback(e.to_string()))?;

        let mut store = NodeStore::default();
        {
            let data = staging.slice(..).get_mapped_range();
            let elements: &[[f32; 4]] = bytemuck::cast_slice(&data);
            for (field_index, column) in elements.chunks_exact(n).enumerate() {
                *store.column_mut(field_index) = column.iter().map(|e| Vec4::from_array(*e)).collect();
            }
        }
        staging.unmap();
        Ok(store)
    }

    fn bind_as_source(&mut self, index: usize) -> Result<()> {
        self.binding.bind_source(index)
    }

    fn bind_as_destination(&mut self, index: usize) -> Result<()> {
        self.binding.bind_destination(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layouts_follow_field_slots() {
        let layouts = vertex_buffer_layouts();
        for (slot, layout) in layouts.iter().enumerate() {
            assert_eq!(layout.array_stride, 16);
            assert_eq!(layout.attributes.len(), 1);
            assert_eq!(layout.attributes[0].shader_location, slot as u32);
            assert_eq!(layout.attributes[0].offset, 0);
            assert_eq!(layout.attributes[0].format, wgpu::VertexFormat::Float32x4);
        }
    }
}
