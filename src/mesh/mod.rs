//! Mesh reconstruction - turns the simulated node graph into triangles

pub mod reconstruct;

pub use reconstruct::reconstruct;

use crate::constants::mesh::{DEFAULT_COLOR, DEGENERATE_FACE_EPSILON};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One vertex of the reconstructed mesh
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

/// Triangle list: every face owns its three vertices so it can carry its
/// own flat normal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Line-list indices tracing the edges of every triangle
    pub fn edge_indices(&self) -> Vec<u32> {
        self.indices
            .chunks_exact(3)
            .flat_map(|t| [t[0], t[1], t[1], t[2], t[2], t[0]])
            .collect()
    }

    pub fn log_render_data(&self) {
        log::info!(
            "Mesh: {} vertices, {} indices ({} triangles)",
            self.vertices.len(),
            self.indices.len(),
            self.triangle_count()
        );
        for (i, tri) in self.indices.chunks_exact(3).enumerate() {
            log::info!("{:4} [{}, {}, {}]", i, tri[0], tri[1], tri[2]);
        }
    }
}

/// How reconstructed faces are colored
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshColoring {
    Constant([f32; 4]),
    /// Blue-to-red ramp over `data.x` in `[min, max]`
    Heat { min: f32, max: f32 },
}

impl Default for MeshColoring {
    fn default() -> Self {
        MeshColoring::Constant(DEFAULT_COLOR)
    }
}

pub fn heat_color(value: f32, min: f32, max: f32) -> [f32; 4] {
    let range = max - min;
    let t = if range > 0.0 {
        ((value - min) / range).clamp(0.0, 1.0)
    } else {
        0.0
    };
    [t, 1.0 - (2.0 * t - 1.0).abs(), 1.0 - t, 1.0]
}

/// Accumulates triangles, dropping the degenerate ones
#[derive(Debug, Default)]
pub struct MeshBuilder {
    data: MeshData,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds triangle `(a, b, c)` with normal `normalize((b - a) x (c - a))`
    ///
    /// Returns false, adding nothing, when the triangle has (near) zero area.
    pub fn add_triangle_face(&mut self, a: Vec3, b: Vec3, c: Vec3, color: [f32; 4]) -> bool {
        let cross = (b - a).cross(c - a);
        if cross.length_squared() < DEGENERATE_FACE_EPSILON {
            return false;
        }
        let normal = cross.normalize().to_array();
        let base = self.data.vertices.len() as u32;
        for position in [a, b, c] {
            self.data.vertices.push(MeshVertex {
                position: position.to_array(),
                normal,
                color,
            });
        }
        self.data.indices.extend_from_slice(&[base, base + 1, base + 2]);
        true
    }

    pub fn build(self) -> MeshData {
        self.data
    }
}
