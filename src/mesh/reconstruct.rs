//! Graph to triangle list
//!
//! Face records, when the store has any, say exactly which quads exist.
//! Without them the quads are found by walking the vertex links: node `i`
//! with a right and an upper neighbor spans the quad
//! `(i, right, diagonal, upper)`, where the diagonal is the upper neighbor's
//! right neighbor.

use super::{heat_color, MeshBuilder, MeshColoring, MeshData};
use crate::constants::neighbor;
use crate::nodes::{MorphNode, NodeRecord, NodeStore};
use glam::Vec3;

struct QuadEmitter<'a> {
    store: &'a NodeStore,
    coloring: MeshColoring,
    builder: MeshBuilder,
}

impl QuadEmitter<'_> {
    fn is_vertex(&self, index: usize) -> bool {
        index < self.store.len() && !NodeRecord::decode(&self.node(index)).is_face()
    }

    fn node(&self, index: usize) -> MorphNode {
        self.store.node_at(index).unwrap_or_default()
    }

    fn position(&self, index: usize) -> Vec3 {
        self.store.pos[index].truncate()
    }

    fn color(&self, corners: &[usize]) -> [f32; 4] {
        match self.coloring {
            MeshColoring::Constant(color) => color,
            MeshColoring::Heat { min, max } => {
                let sum: f32 = corners.iter().map(|&i| self.store.data[i].x).sum();
                heat_color(sum / corners.len() as f32, min, max)
            }
        }
    }

    fn triangle(&mut self, a: usize, b: usize, c: usize) {
        let color = self.color(&[a, b, c]);
        let (pa, pb, pc) = (self.position(a), self.position(b), self.position(c));
        self.builder.add_triangle_face(pa, pb, pc, color);
    }

    /// Emits the corners `a, b, c, d` (CCW) as `(a, b, c)` and `(a, c, d)`
    fn quad(&mut self, a: usize, b: usize, c: usize, d: usize) {
        self.triangle(a, b, c);
        self.triangle(a, c, d);
    }

    fn emit_faces(&mut self) {
        let store = self.store;
        for record in store.records() {
            let NodeRecord::Face { corners } = record else {
                continue;
            };
            match corners {
                [Some(a), Some(b), Some(c), Some(d)]
                    if [a, b, c, d].iter().all(|&i| self.is_vertex(i)) =>
                {
                    self.quad(a, b, c, d)
                }
                [Some(a), Some(b), Some(c), None]
                    if [a, b, c].iter().all(|&i| self.is_vertex(i)) =>
                {
                    self.triangle(a, b, c)
                }
                _ => {}
            }
        }
    }

    fn emit_grid_quads(&mut self) {
        for i in 0..self.store.len() {
            let node = self.node(i);
            let (Some(right), Some(upper)) =
                (node.neighbor(neighbor::RIGHT), node.neighbor(neighbor::UPPER))
            else {
                continue;
            };
            if !self.is_vertex(right) || !self.is_vertex(upper) {
                continue;
            }
            let Some(diagonal) = self.node(upper).neighbor(neighbor::RIGHT) else {
                continue;
            };
            if !self.is_vertex(diagonal) {
                continue;
            }
            self.quad(i, right, diagonal, upper);
        }
    }
}

/// Builds the triangle list for `store`
///
/// Degenerate triangles are dropped silently. Links pointing outside the
/// store are ignored.
pub fn reconstruct(store: &NodeStore, coloring: &MeshColoring) -> MeshData {
    let mut emitter = QuadEmitter {
        store,
        coloring: *coloring,
        builder: MeshBuilder::new(),
    };
    if store.has_face_records() {
        emitter.emit_faces();
    } else {
        emitter.emit_grid_quads();
    }
    emitter.builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{generate_grid, ZygoteOptions};
    use glam::{UVec2, Vec4};

    fn plane(samples: UVec2, with_faces: bool) -> NodeStore {
        let options = ZygoteOptions {
            with_faces,
            ..Default::default()
        };
        NodeStore::from_nodes(&generate_grid(samples, &options))
    }

    #[test]
    fn test_two_by_two_grid_is_one_quad() {
        let mesh = reconstruct(&plane(UVec2::splat(2), false), &MeshColoring::default());
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices.len(), 6);
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn test_single_node_has_no_triangles() {
        let mesh = reconstruct(&plane(UVec2::ONE, false), &MeshColoring::default());
        assert!(mesh.is_empty());
        assert!(mesh.vertices.is_empty());
    }

    #[test]
    fn test_larger_grid_counts() {
        let mesh = reconstruct(&plane(UVec2::new(4, 3), false), &MeshColoring::default());
        assert_eq!(mesh.triangle_count(), 2 * 3 * 2);
        assert_eq!(mesh.vertices.len(), 3 * mesh.triangle_count());
    }

    #[test]
    fn test_face_records_match_grid_walk() {
        let walked = reconstruct(&plane(UVec2::new(3, 4), false), &MeshColoring::default());
        let faced = reconstruct(&plane(UVec2::new(3, 4), true), &MeshColoring::default());
        assert_eq!(walked, faced);
    }

    #[test]
    fn test_degenerate_quad_contributes_nothing() {
        let corners = [
            Vec4::new(0.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 0.0),
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(1.0, 0.0, 0.0, 0.0),
        ];
        let mut nodes = generate_grid(UVec2::splat(2), &ZygoteOptions::default());
        for (node, pos) in nodes.iter_mut().zip(corners) {
            node.pos = pos;
        }
        let mesh = reconstruct(&NodeStore::from_nodes(&nodes), &MeshColoring::default());
        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.vertices.is_empty());
    }

    #[test]
    fn test_partially_degenerate_quad() {
        // collapse one corner onto its neighbor: one triangle survives
        let mut nodes = generate_grid(UVec2::splat(2), &ZygoteOptions::default());
        nodes[1].pos = nodes[0].pos;
        let mesh = reconstruct(&NodeStore::from_nodes(&nodes), &MeshColoring::default());
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertices.len(), 3);
    }

    #[test]
    fn test_out_of_range_links_ignored() {
        let mut nodes = generate_grid(UVec2::splat(2), &ZygoteOptions::default());
        nodes[0].neighbors.x = 99.0;
        let mesh = reconstruct(&NodeStore::from_nodes(&nodes), &MeshColoring::default());
        assert!(mesh.is_empty());

        let mut nodes = generate_grid(UVec2::splat(2), &ZygoteOptions::default());
        nodes.push(MorphNode::default());
        let face = NodeRecord::Face {
            corners: [Some(0), Some(1), Some(3), Some(42)],
        };
        nodes.push(face.encode());
        let mesh = reconstruct(&NodeStore::from_nodes(&nodes), &MeshColoring::default());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_heat_coloring_uses_data() {
        let mut nodes = generate_grid(UVec2::splat(2), &ZygoteOptions::default());
        for node in &mut nodes {
            node.data.x = 1.0;
        }
        let coloring = MeshColoring::Heat { min: 0.0, max: 1.0 };
        let mesh = reconstruct(&NodeStore::from_nodes(&nodes), &coloring);
        assert!(mesh.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0, 1.0]));
    }
}
