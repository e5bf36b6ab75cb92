//! GPU backend
//!
//! - [`context`] - headless device setup
//! - [`buffers`] - the double buffer of node fields
//! - [`simulator`] - compute pipelines and the per-iteration dispatch
//! - [`renderer`] - faces, wireframe and points into an offscreen target
//! - `shaders/` - the display shader

pub mod buffers;
pub mod context;
pub mod renderer;
pub mod simulator;

pub use buffers::{field_vertex_layout, vertex_buffer_layouts, GpuDoubleBuffer};
pub use context::GpuContext;
pub use renderer::{Camera, MeshRenderer, OffscreenTarget, PointSource, RenderFlags, RenderUniforms};
pub use simulator::GpuMorphState;
