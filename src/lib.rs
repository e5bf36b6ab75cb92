//! Morph core library
//!
//! Grows a mesh by repeatedly running a per-node program over a graph of
//! nodes held in two buffers that take turns as source and destination.

pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod gpu;
pub mod mesh;
pub mod nodes;
pub mod program;
pub mod sim;

pub use app::{apply_unif_overrides, build_seed, run_pipeline, PipelineOutput, StageDurations};
pub use config::{Backend, MorphConfig};
pub use error::{MorphError, Result};
pub use mesh::{reconstruct, MeshColoring, MeshData, MeshVertex};
pub use nodes::{MorphNode, NodeStore};
pub use program::{MorphProgram, Program, ProgramLoader, ProgramRegistry, UserUnif};
pub use sim::{HostDoubleBuffer, HostProgram, Simulation};
