//! Error type shared by every fallible operation in the crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MorphError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Program file not found: {0:?}")]
    MissingProgramFile(PathBuf),

    #[error("Malformed program header at token {token_index}: {message}")]
    MalformedHeader { token_index: usize, message: String },

    #[error("Failed to compile program '{program}':\n{message}")]
    Compile { program: String, message: String },

    #[error("Program '{program}' cannot be bound: {message}")]
    Binding { program: String, message: String },

    #[error("Program '{program}' has no compute entry point named '{entry_point}'")]
    MissingEntryPoint { program: String, entry_point: String },

    #[error("Buffer of {requested} bytes exceeds the platform limit of {limit} bytes")]
    BufferLimit { requested: u64, limit: u64 },

    #[error("{requested} nodes exceed the buffer capacity of {capacity}")]
    Capacity { requested: usize, capacity: usize },

    #[error("Node index {index} out of bounds for {len} nodes")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Buffer index {0} is not 0 or 1")]
    InvalidBufferIndex(usize),

    #[error("Source and destination buffers are not bound as a ping-pong pair")]
    UnboundBuffers,

    #[error("No suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("Failed to create GPU device: {0}")]
    RequestDevice(String),

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unknown program '{0}'")]
    UnknownProgram(String),

    #[error("No programs are registered")]
    NoPrograms,
}

impl MorphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MorphError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn header(token_index: usize, message: impl Into<String>) -> Self {
        MorphError::MalformedHeader {
            token_index,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MorphError>;
