//! Fixed contract constants and default values
//!
//! Everything that has to agree between seed generation, simulation programs,
//! the GPU buffers and mesh reconstruction lives here and nowhere else.

/// Per-node field layout shared by the columnar store and the GPU buffers
pub mod field {
    /// Position (xyz) plus the node type tag in w
    pub const POS: usize = 0;
    pub const VEL: usize = 1;
    pub const NEIGHBORS: usize = 2;
    pub const DATA: usize = 3;

    /// Number of per-node fields
    pub const COUNT: usize = 4;

    /// Byte size of one field element (a vec4 of f32)
    pub const ELEMENT_SIZE: u64 = 16;

    /// Field names, in slot order
    pub const NAMES: [&str; COUNT] = ["pos", "vel", "neighbors", "data"];
}

/// Neighbor slot order inside `MorphNode::neighbors`, relative to the surface normal
pub mod neighbor {
    pub const RIGHT: usize = 0;
    pub const UPPER: usize = 1;
    pub const LEFT: usize = 2;
    pub const LOWER: usize = 3;

    /// Encoded index for "no neighbor in this direction" (boundary)
    pub const NONE: f32 = -1.0;
}

/// Type tags stored in `pos.w`
pub mod tag {
    pub const VERTEX: f32 = 0.0;
    pub const FACE: f32 = 1.0;
}

/// Names and bindings every simulation program is compiled against
pub mod contract {
    /// Compute entry point of a simulation program
    pub const ENTRY_POINT: &str = "main";

    /// Random-access views of the source buffer, in field order
    pub const SOURCE_VIEW_NAMES: [&str; super::field::COUNT] =
        ["pos_buf", "vel_buf", "neighbors_buf", "data_buf"];

    /// Output channels written into the destination buffer, in field order
    pub const OUTPUT_CHANNEL_NAMES: [&str; super::field::COUNT] =
        ["out_pos", "out_vel", "out_neighbors", "out_data"];

    pub const ITER_NUM_NAME: &str = "iter_num";
    pub const NUM_NODES_NAME: &str = "num_nodes";

    pub const SOURCE_GROUP: u32 = 0;
    pub const OUTPUT_GROUP: u32 = 1;
    pub const STATE_GROUP: u32 = 2;
    /// Conventional group for user uniforms declared by a program
    pub const USER_GROUP: u32 = 3;

    /// Bind groups a pipeline may use on every adapter (wgpu's default limit)
    pub const MAX_BIND_GROUPS: u32 = 4;

    /// Uniform buffers available to a compute stage beyond `iter_num` and `num_nodes`
    pub const MAX_USER_UNIFS: usize = 10;

    /// Terminates the user uniform header of a program resource file
    pub const END_USER_UNIFS: &str = "END_USER_UNIFS";
}

/// Storage limits
pub mod limits {
    /// Byte budget of a single field buffer
    pub const MAX_FIELD_BYTES: u64 = 100_000_000;

    /// Maximum number of nodes: the byte budget over the size of one whole node
    pub const MAX_NUM_NODES: usize = (MAX_FIELD_BYTES / (4 * super::field::ELEMENT_SIZE)) as usize;
}

/// Mesh reconstruction constants
pub mod mesh {
    /// Squared cross-product length below which a triangle is dropped
    pub const DEGENERATE_FACE_EPSILON: f32 = 1e-12;

    /// Default face color
    pub const DEFAULT_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];
}

/// Display defaults
pub mod render {
    pub const DEFAULT_FRAME_SIZE: [u32; 2] = [1300, 700];
    pub const DEFAULT_DEBUG_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    pub const DEFAULT_EYE: [f32; 3] = [0.0, 30.0, -30.0];
}
