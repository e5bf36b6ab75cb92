//! Seed ("zygote") generation
//!
//! Builds the initial 4-connected grid of nodes the simulation starts from.
//! Node `(x, y)` lives at index `x + samples.x * y`; neighbors do not wrap, so
//! the outer ring of the grid is the boundary.

use super::node::{encode_index, MorphNode, NodeRecord};
use crate::constants::{neighbor, tag};
use glam::{IVec2, UVec2, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Surface the unit grid is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZygoteShape {
    /// 10x10 plane in y = 0, quads facing +Y
    #[default]
    Plane,
    /// Unit square in z = 0, quads facing +Z
    Square,
    /// Unit sphere around the origin
    Sphere,
}

impl ZygoteShape {
    /// Maps a unit-square coordinate onto the surface
    pub fn position(self, unit: Vec2) -> Vec3 {
        match self {
            ZygoteShape::Plane => {
                let plane = 10.0 * (unit - 0.5);
                // "upper" runs towards -z so (right x upper) points up
                Vec3::new(plane.x, 0.0, -plane.y)
            }
            ZygoteShape::Square => unit.extend(0.0),
            ZygoteShape::Sphere => {
                let v_angle = unit.y * PI;
                let h_angle = unit.x * 2.0 * PI;
                Vec3::new(
                    v_angle.sin() * h_angle.cos(),
                    v_angle.sin() * h_angle.sin(),
                    v_angle.cos(),
                )
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZygoteOptions {
    pub shape: ZygoteShape,
    /// Append one face record per grid quad after the vertex nodes
    pub with_faces: bool,
    /// Amplitude of the random offset added to each vertex position
    pub jitter: f32,
    pub seed: u64,
}

/// Index of the grid node at `coord`, or `None` outside the grid
pub fn coord_to_index(coord: IVec2, samples: UVec2) -> Option<usize> {
    let inside = coord.x >= 0
        && coord.y >= 0
        && (coord.x as u32) < samples.x
        && (coord.y as u32) < samples.y;
    inside.then(|| coord.x as usize + samples.x as usize * coord.y as usize)
}

fn unit_coord(coord: UVec2, samples: UVec2) -> Vec2 {
    let axis = |c: u32, n: u32| if n > 1 { c as f32 / (n - 1) as f32 } else { 0.5 };
    Vec2::new(axis(coord.x, samples.x), axis(coord.y, samples.y))
}

/// Number of nodes `generate_grid` produces, or `None` if it overflows `usize`
pub fn grid_node_count(samples: UVec2, with_faces: bool) -> Option<usize> {
    let vertices = (samples.x as usize).checked_mul(samples.y as usize)?;
    if !with_faces {
        return Some(vertices);
    }
    let faces = (samples.x.saturating_sub(1) as usize)
        .checked_mul(samples.y.saturating_sub(1) as usize)?;
    vertices.checked_add(faces)
}

/// Generates the seed nodes for a `samples.x` by `samples.y` grid
///
/// Callers seeding a fixed-capacity buffer check `grid_node_count` first.
pub fn generate_grid(samples: UVec2, options: &ZygoteOptions) -> Vec<MorphNode> {
    let mut nodes = Vec::with_capacity(grid_node_count(samples, options.with_faces).unwrap_or(0));
    let mut rng = StdRng::seed_from_u64(options.seed);

    for y in 0..samples.y {
        for x in 0..samples.x {
            let coord = IVec2::new(x as i32, y as i32);
            let mut pos = options
                .shape
                .position(unit_coord(UVec2::new(x, y), samples));
            if options.jitter > 0.0 {
                let j = options.jitter;
                pos += Vec3::new(
                    rng.random_range(-j..=j),
                    rng.random_range(-j..=j),
                    rng.random_range(-j..=j),
                );
            }

            let mut neighbors = Vec4::splat(neighbor::NONE);
            neighbors[neighbor::RIGHT] = encode_index(coord_to_index(coord + IVec2::X, samples));
            neighbors[neighbor::UPPER] = encode_index(coord_to_index(coord + IVec2::Y, samples));
            neighbors[neighbor::LEFT] = encode_index(coord_to_index(coord - IVec2::X, samples));
            neighbors[neighbor::LOWER] = encode_index(coord_to_index(coord - IVec2::Y, samples));

            nodes.push(MorphNode::new(
                pos.extend(tag::VERTEX),
                Vec4::ZERO,
                neighbors,
                Vec4::ZERO,
            ));
        }
    }

    if options.with_faces {
        for y in 0..samples.y.saturating_sub(1) {
            for x in 0..samples.x.saturating_sub(1) {
                let coord = IVec2::new(x as i32, y as i32);
                let corners = [
                    coord_to_index(coord, samples),
                    coord_to_index(coord + IVec2::X, samples),
                    coord_to_index(coord + IVec2::ONE, samples),
                    coord_to_index(coord + IVec2::Y, samples),
                ];
                nodes.push(NodeRecord::Face { corners }.encode());
            }
        }
    }

    nodes
}

/// Seed triangle indices, two per grid quad, in the same winding mesh
/// reconstruction uses
///
/// Empty when the vertex indices do not fit in `u32`.
pub fn grid_indices(samples: UVec2) -> Vec<u32> {
    match grid_node_count(samples, false) {
        Some(count) if u32::try_from(count).is_ok() => {}
        _ => return Vec::new(),
    }
    let quads = samples.x.saturating_sub(1) as usize * samples.y.saturating_sub(1) as usize;
    let mut indices = Vec::with_capacity(6 * quads);
    for y in 0..samples.y.saturating_sub(1) {
        for x in 0..samples.x.saturating_sub(1) {
            let me = x + samples.x * y;
            let right = me + 1;
            let upper = me + samples.x;
            let opposite = upper + 1;
            indices.extend_from_slice(&[me, right, opposite, me, opposite, upper]);
        }
    }
    indices
}
