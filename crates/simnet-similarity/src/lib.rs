//! Windowed similarity and MEX layers over NCHW tensors.
//!
//! Every similarity output scores one input patch against a learned
//! template with per-element weights. The crate provides the data-parallel
//! forward pass, both gradients, and a sequential oracle for testing. The
//! MEX layer pools offset-shifted input blocks with a log-sum-exp.

pub mod config;
pub mod error;
pub mod forward;
pub mod function;
pub mod grad_input;
pub mod grad_params;
pub mod layer;
pub mod mex;
pub mod mex_config;
pub mod plan;
pub mod reference;
pub mod window;

#[cfg(test)]
mod gradcheck;

pub use config::{Padding, SimilarityAttributes, SimilarityConfig, SimilarityConfigBuilder};
pub use error::{SimilarityError, SimilarityResult};
pub use forward::similarity;
pub use function::SimilarityFunction;
pub use grad_input::similarity_input_grad;
pub use grad_params::similarity_parameters_grad;
pub use layer::{similarity_backward, SimilarityGradients, SimilarityLayer};
pub use mex::{mex, mex_ref, MexPlan};
pub use mex_config::{MexAttributes, MexConfig, MexConfigBuilder, OffsetRegions};
pub use plan::SimilarityPlan;
pub use reference::similarity_ref;
pub use window::{AxisGeometry, Sample, SamplePolicy, WindowGeometry};
