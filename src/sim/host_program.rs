//! Host-side simulation programs
//!
//! A [`NodeStep`] computes one node of the next iteration from a read-only
//! view of the previous one. Steps never see the destination, so a node can
//! only ever write itself.

use crate::constants::{field, neighbor, tag};
use crate::nodes::{MorphNode, NodeStore};
use crate::program::{Program, UserUnif};
use glam::{Vec3, Vec4};
use std::fmt;

/// Read-only access to the source buffer of one iteration
#[derive(Debug, Clone, Copy)]
pub struct SourceView<'a> {
    store: &'a NodeStore,
    num_nodes: usize,
}

impl<'a> SourceView<'a> {
    pub fn new(store: &'a NodeStore, num_nodes: usize) -> Self {
        Self {
            store,
            num_nodes: num_nodes.min(store.len()),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Node `index`, or `None` past the active node count
    pub fn node(&self, index: usize) -> Option<MorphNode> {
        if index >= self.num_nodes {
            return None;
        }
        self.store.node_at(index).ok()
    }

    /// One field of node `index`, like an indexed read of a single view
    pub fn fetch(&self, field_index: usize, index: usize) -> Option<Vec4> {
        if index >= self.num_nodes || field_index >= field::COUNT {
            return None;
        }
        self.store.column(field_index).get(index).copied()
    }

    /// The neighbor of node `index` in `slot`, if it exists
    pub fn neighbor(&self, index: usize, slot: usize) -> Option<MorphNode> {
        self.node(index)?.neighbor(slot).and_then(|n| self.node(n))
    }
}

/// Per-run state visible to every step
#[derive(Debug, Clone, Copy)]
pub struct StepUniforms<'a> {
    pub iter_num: usize,
    pub num_nodes: usize,
    pub user_unifs: &'a [UserUnif],
}

impl StepUniforms<'_> {
    pub fn get(&self, name: &str) -> Option<Vec4> {
        self.user_unifs
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.current_value)
    }

    pub fn get_or(&self, name: &str, default: Vec4) -> Vec4 {
        self.get(name).unwrap_or(default)
    }
}

/// One node's update rule
pub trait NodeStep: Send + Sync {
    fn step(&self, index: usize, source: &SourceView, uniforms: &StepUniforms) -> MorphNode;
}

impl<F> NodeStep for F
where
    F: Fn(usize, &SourceView, &StepUniforms) -> MorphNode + Send + Sync,
{
    fn step(&self, index: usize, source: &SourceView, uniforms: &StepUniforms) -> MorphNode {
        self(index, source, uniforms)
    }
}

/// Copies every node unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStep;

impl NodeStep for IdentityStep {
    fn step(&self, index: usize, source: &SourceView, _uniforms: &StepUniforms) -> MorphNode {
        source.node(index).unwrap_or_default()
    }
}

/// Damped springs along the neighbor links, plus gravity
///
/// Boundary vertices are pinned and face records pass through untouched.
/// `data.w` counts the iterations a vertex has been through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpringStep;

impl SpringStep {
    pub const SPRING_LEN: f32 = 0.5;
    pub const GRAVITY: Vec3 = Vec3::new(0.0, -1.0, 0.0);
    pub const DAMPING: f32 = 0.5;
    pub const DELTA_T: f32 = 0.017;

    pub fn user_unifs() -> Vec<UserUnif> {
        vec![
            UserUnif::new("spring_len", 1, 0.0, 5.0, 0.01, Vec4::X * Self::SPRING_LEN),
            UserUnif::new("gravity", 3, -10.0, 10.0, 0.1, Self::GRAVITY.extend(0.0)),
            UserUnif::new("damping", 1, 0.0, 1.0, 0.01, Vec4::X * Self::DAMPING),
            UserUnif::new("delta_t", 1, 0.0, 0.1, 0.001, Vec4::X * Self::DELTA_T),
        ]
    }
}

impl NodeStep for SpringStep {
    fn step(&self, index: usize, source: &SourceView, uniforms: &StepUniforms) -> MorphNode {
        let Some(node) = source.node(index) else {
            return MorphNode::default();
        };
        if node.pos.w == tag::FACE {
            return node;
        }

        let mut out = node;
        out.data.w = (uniforms.iter_num + 1) as f32;
        if node.is_boundary() {
            out.vel = Vec4::ZERO;
            return out;
        }

        let spring_len = uniforms.get_or("spring_len", Vec4::X * Self::SPRING_LEN).x;
        let gravity = uniforms.get_or("gravity", Self::GRAVITY.extend(0.0)).truncate();
        let damping = uniforms.get_or("damping", Vec4::X * Self::DAMPING).x;
        let dt = uniforms.get_or("delta_t", Vec4::X * Self::DELTA_T).x;

        let p0 = node.position();
        let v0 = node.vel.truncate();
        let mut force = gravity;
        for slot in [neighbor::RIGHT, neighbor::UPPER, neighbor::LEFT, neighbor::LOWER] {
            if let Some(n) = source.neighbor(index, slot) {
                let d = n.position() - p0;
                let len = d.length();
                if len > 1e-6 {
                    force += (len - spring_len) * (d / len);
                }
            }
        }
        let accel = force - damping * v0;

        let p1 = p0 + v0 * dt + 0.5 * accel * dt * dt;
        let v1 = v0 + accel * dt;
        out.pos = p1.extend(node.pos.w);
        out.vel = v1.extend(node.vel.w);
        out
    }
}

/// A host program: user uniforms plus a step rule
pub struct HostProgram {
    pub name: String,
    pub user_unifs: Vec<UserUnif>,
    pub step: Box<dyn NodeStep>,
}

impl HostProgram {
    pub fn new(name: impl Into<String>, user_unifs: Vec<UserUnif>, step: impl NodeStep + 'static) -> Self {
        Self {
            name: name.into(),
            user_unifs,
            step: Box::new(step),
        }
    }

    /// Builds a program from a closure
    pub fn from_fn<F>(name: impl Into<String>, user_unifs: Vec<UserUnif>, step: F) -> Self
    where
        F: Fn(usize, &SourceView, &StepUniforms) -> MorphNode + Send + Sync + 'static,
    {
        Self::new(name, user_unifs, step)
    }

    pub fn identity() -> Self {
        Self::new("identity", Vec::new(), IdentityStep)
    }

    pub fn spring() -> Self {
        Self::new("growth", SpringStep::user_unifs(), SpringStep)
    }

    /// The built-in programs, in registration order
    pub fn builtins() -> Vec<Self> {
        vec![Self::spring(), Self::identity()]
    }
}

impl fmt::Debug for HostProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostProgram")
            .field("name", &self.name)
            .field("user_unifs", &self.user_unifs)
            .finish_non_exhaustive()
    }
}

impl Program for HostProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn user_unifs(&self) -> &[UserUnif] {
        &self.user_unifs
    }

    fn user_unifs_mut(&mut self) -> &mut [UserUnif] {
        &mut self.user_unifs
    }
}
