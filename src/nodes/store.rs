//! Columnar node storage
//!
//! The store keeps one `Vec<Vec4>` per node field. This is the only form that
//! crosses the GPU boundary: each column maps onto one field buffer.

use super::node::{raw_node_str, MorphNode, NodeRecord};
use crate::constants::tag;
use crate::error::{MorphError, Result};
use glam::Vec4;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStore {
    pub pos: Vec<Vec4>,
    pub vel: Vec<Vec4>,
    pub neighbors: Vec<Vec4>,
    pub data: Vec<Vec4>,
}

impl NodeStore {
    /// A store of `len` default nodes (no neighbors, everything else zero)
    pub fn with_len(len: usize) -> Self {
        let node = MorphNode::default();
        Self {
            pos: vec![node.pos; len],
            vel: vec![node.vel; len],
            neighbors: vec![node.neighbors; len],
            data: vec![node.data; len],
        }
    }

    /// Splits an array of nodes into the four columns
    pub fn from_nodes(nodes: &[MorphNode]) -> Self {
        let mut store = Self {
            pos: Vec::with_capacity(nodes.len()),
            vel: Vec::with_capacity(nodes.len()),
            neighbors: Vec::with_capacity(nodes.len()),
            data: Vec::with_capacity(nodes.len()),
        };
        for node in nodes {
            store.push(*node);
        }
        store
    }

    pub fn push(&mut self, node: MorphNode) {
        self.pos.push(node.pos);
        self.vel.push(node.vel);
        self.neighbors.push(node.neighbors);
        self.data.push(node.data);
    }

    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Reassembles node `i`
    pub fn node_at(&self, i: usize) -> Result<MorphNode> {
        if i >= self.len() {
            return Err(MorphError::IndexOutOfBounds {
                index: i,
                len: self.len(),
            });
        }
        Ok(MorphNode {
            pos: self.pos[i],
            vel: self.vel[i],
            neighbors: self.neighbors[i],
            data: self.data[i],
        })
    }

    pub fn set_node(&mut self, i: usize, node: MorphNode) -> Result<()> {
        if i >= self.len() {
            return Err(MorphError::IndexOutOfBounds {
                index: i,
                len: self.len(),
            });
        }
        self.pos[i] = node.pos;
        self.vel[i] = node.vel;
        self.neighbors[i] = node.neighbors;
        self.data[i] = node.data;
        Ok(())
    }

    /// Iterates over the nodes in index order
    pub fn iter(&self) -> impl Iterator<Item = MorphNode> + '_ {
        (0..self.len()).map(move |i| MorphNode {
            pos: self.pos[i],
            vel: self.vel[i],
            neighbors: self.neighbors[i],
            data: self.data[i],
        })
    }

    pub fn records(&self) -> impl Iterator<Item = NodeRecord> + '_ {
        self.iter().map(|node| NodeRecord::decode(&node))
    }

    /// Copy of the first `n` nodes
    pub fn prefix(&self, n: usize) -> Result<Self> {
        if n > self.len() {
            return Err(MorphError::Capacity {
                requested: n,
                capacity: self.len(),
            });
        }
        Ok(Self {
            pos: self.pos[..n].to_vec(),
            vel: self.vel[..n].to_vec(),
            neighbors: self.neighbors[..n].to_vec(),
            data: self.data[..n].to_vec(),
        })
    }

    /// Overwrites the first `other.len()` entries, leaving the rest untouched
    pub fn copy_prefix_from(&mut self, other: &NodeStore) -> Result<()> {
        let n = other.len();
        if n > self.len() {
            return Err(MorphError::Capacity {
                requested: n,
                capacity: self.len(),
            });
        }
        self.pos[..n].copy_from_slice(&other.pos);
        self.vel[..n].copy_from_slice(&other.vel);
        self.neighbors[..n].copy_from_slice(&other.neighbors);
        self.data[..n].copy_from_slice(&other.data);
        Ok(())
    }

    /// True if any node carries the face tag
    pub fn has_face_records(&self) -> bool {
        self.pos.iter().any(|p| p.w == tag::FACE)
    }

    /// Column `field` as a slice, in `constants::field` order
    pub fn column(&self, field: usize) -> &[Vec4] {
        match field {
            0 => &self.pos,
            1 => &self.vel,
            2 => &self.neighbors,
            _ => &self.data,
        }
    }

    pub fn column_mut(&mut self, field: usize) -> &mut Vec<Vec4> {
        match field {
            0 => &mut self.pos,
            1 => &mut self.vel,
            2 => &mut self.neighbors,
            _ => &mut self.data,
        }
    }

    /// Dumps every node at info level
    pub fn log_nodes(&self, label: &str) {
        log::info!("{} ({} nodes):", label, self.len());
        for (i, node) in self.iter().enumerate() {
            log::info!("{:4} {}", i, raw_node_str(&node));
        }
    }
}

impl From<&[MorphNode]> for NodeStore {
    fn from(nodes: &[MorphNode]) -> Self {
        Self::from_nodes(nodes)
    }
}
