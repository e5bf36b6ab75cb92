//! Node system - simulation particles, columnar storage and seed generation

pub mod node;
pub mod store;
pub mod zygote;

pub use node::{decode_index, encode_index, raw_node_str, MorphNode, NodeRecord};
pub use store::NodeStore;
pub use zygote::{generate_grid, grid_indices, grid_node_count, ZygoteOptions, ZygoteShape};
