//! Simulation node types
//!
//! A `MorphNode` is the physical record: four vec4 fields, exactly what the
//! GPU buffers hold per node. `NodeRecord` is the logical view of the same
//! record, telling graph vertices apart from face records.

use crate::constants::{neighbor, tag};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// One simulation particle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphNode {
    /// xyz position, w holds the node type tag
    pub pos: Vec4,
    pub vel: Vec4,
    /// Encoded neighbor indices in {right, upper, left, lower} order, -1 for none
    pub neighbors: Vec4,
    /// Free-form channel owned by the active program
    pub data: Vec4,
}

impl Default for MorphNode {
    fn default() -> Self {
        Self {
            pos: Vec4::ZERO,
            vel: Vec4::ZERO,
            neighbors: Vec4::splat(neighbor::NONE),
            data: Vec4::ZERO,
        }
    }
}

impl MorphNode {
    pub fn new(pos: Vec4, vel: Vec4, neighbors: Vec4, data: Vec4) -> Self {
        Self {
            pos,
            vel,
            neighbors,
            data,
        }
    }

    /// Decodes the neighbor index stored in `slot`
    pub fn neighbor(&self, slot: usize) -> Option<usize> {
        self.neighbors.to_array().get(slot).copied().and_then(decode_index)
    }

    /// True if any neighbor slot holds the boundary sentinel
    pub fn is_boundary(&self) -> bool {
        (0..4).any(|slot| self.neighbor(slot).is_none())
    }

    pub fn position(&self) -> Vec3 {
        self.pos.truncate()
    }
}

/// Decodes a float-encoded node index; negative values mean "none"
pub fn decode_index(value: f32) -> Option<usize> {
    if value < 0.0 || !value.is_finite() {
        None
    } else {
        Some(value as usize)
    }
}

/// Encodes an optional node index the way the GPU programs read it
pub fn encode_index(index: Option<usize>) -> f32 {
    index.map_or(neighbor::NONE, |i| i as f32)
}

/// Logical interpretation of a `MorphNode`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRecord {
    /// A graph vertex linked to up to four neighbors
    Vertex {
        pos: Vec3,
        vel: Vec3,
        neighbors: [Option<usize>; 4],
        data: Vec4,
    },
    /// A quad face; corners are vertex indices in CCW order about the face normal
    Face { corners: [Option<usize>; 4] },
}

impl NodeRecord {
    /// Reads the tag in `pos.w` and interprets the remaining fields accordingly
    pub fn decode(node: &MorphNode) -> Self {
        let slots = [
            node.neighbor(0),
            node.neighbor(1),
            node.neighbor(2),
            node.neighbor(3),
        ];
        if node.pos.w == tag::FACE {
            NodeRecord::Face { corners: slots }
        } else {
            NodeRecord::Vertex {
                pos: node.pos.truncate(),
                vel: node.vel.truncate(),
                neighbors: slots,
                data: node.data,
            }
        }
    }

    /// Packs the record into the single physical layout
    pub fn encode(&self) -> MorphNode {
        match *self {
            NodeRecord::Vertex {
                pos,
                vel,
                neighbors,
                data,
            } => MorphNode {
                pos: pos.extend(tag::VERTEX),
                vel: vel.extend(0.0),
                neighbors: encode_slots(neighbors),
                data,
            },
            NodeRecord::Face { corners } => MorphNode {
                pos: Vec4::new(0.0, 0.0, 0.0, tag::FACE),
                vel: Vec4::ZERO,
                neighbors: encode_slots(corners),
                data: Vec4::ZERO,
            },
        }
    }

    pub fn is_face(&self) -> bool {
        matches!(self, NodeRecord::Face { .. })
    }
}

fn encode_slots(slots: [Option<usize>; 4]) -> Vec4 {
    Vec4::new(
        encode_index(slots[0]),
        encode_index(slots[1]),
        encode_index(slots[2]),
        encode_index(slots[3]),
    )
}

pub fn vec4_str(v: Vec4) -> String {
    format!("[{:5.2}, {:5.2}, {:5.2}, {:5.2}]", v.x, v.y, v.z, v.w)
}

/// Deterministic text of all four fields, used for node dumps
pub fn raw_node_str(node: &MorphNode) -> String {
    format!(
        "pos: {}, vel: {}, neighbors: {}, data: {}",
        vec4_str(node.pos),
        vec4_str(node.vel),
        vec4_str(node.neighbors),
        vec4_str(node.data)
    )
}
