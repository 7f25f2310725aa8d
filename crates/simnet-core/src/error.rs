use thiserror::Error;

/// Core error type for tensor construction and indexing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Data length {len} does not match shape {shape:?} ({numel} elements)")]
    DataLength {
        len: usize,
        shape: Vec<usize>,
        numel: usize,
    },

    #[error("Index out of bounds: index {index} for axis {axis} with size {size}")]
    IndexOutOfBounds {
        index: usize,
        axis: usize,
        size: usize,
    },

    #[error("Invalid axis: {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("Expected a {expected}-D tensor, got shape {got:?}")]
    RankMismatch { expected: usize, got: Vec<usize> },
}

pub type TensorResult<T> = Result<T, TensorError>;
