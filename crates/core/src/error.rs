//! Error types for voxseg

use thiserror::Error;

/// Main error type for voxseg operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid volume dimensions: {depth}x{height}x{width}")]
    InvalidDimensions {
        depth: usize,
        height: usize,
        width: usize,
    },

    #[error("Index out of bounds: ({z}, {y}, {x}) in volume of shape {shape:?}")]
    IndexOutOfBounds {
        z: usize,
        y: usize,
        x: usize,
        shape: (usize, usize, usize),
    },

    #[error("Volume shape mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Degenerate training set: {0}")]
    DegenerateTrainingSet(String),

    #[error("Storage allocation failed: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error must abort the owning session.
    ///
    /// Only storage failures cross the engine boundary; everything else
    /// leaves the session paintable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

/// Result type alias for voxseg operations
pub type Result<T> = std::result::Result<T, Error>;
