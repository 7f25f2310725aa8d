use simnet_core::TensorError;
use thiserror::Error;

/// Errors raised by the similarity kernels. Every variant is detected before
/// any output is written.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("{operand} must be 4-D (N, C, H, W), got shape {got:?}")]
    NotFourDimensional { operand: &'static str, got: Vec<usize> },

    #[error("templates shape {templates:?} does not match weights shape {weights:?}")]
    ParameterShapeMismatch {
        templates: Vec<usize>,
        weights: Vec<usize>,
    },

    #[error("templates are {got_h}x{got_w} but ksize is {kernel_h}x{kernel_w}")]
    KernelShapeMismatch {
        kernel_h: usize,
        kernel_w: usize,
        got_h: usize,
        got_w: usize,
    },

    #[error("input has {input} channels but templates expect {templates}")]
    ChannelMismatch { input: usize, templates: usize },

    #[error(
        "kernel {kernel_h}x{kernel_w} does not fit input {input_h}x{input_w} under VALID padding"
    )]
    KernelExceedsInput {
        kernel_h: usize,
        kernel_w: usize,
        input_h: usize,
        input_w: usize,
    },

    #[error("channel block {block} does not fit {channels} input channels")]
    BlockExceedsChannels { block: usize, channels: usize },

    #[error("offsets shape {got:?} does not match expected {expected:?}")]
    OffsetsShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("upstream gradient shape {got:?} does not match output shape {expected:?}")]
    GradientShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("invalid attribute `{name}`: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },

    #[error("unknown similarity function '{0}' (expected one of L1, L2, DOT)")]
    UnknownSimilarityFunction(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type SimilarityResult<T> = Result<T, SimilarityError>;
