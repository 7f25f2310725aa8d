//! # SimNet
//!
//! A windowed similarity layer over NCHW tensors.
//!
//! ## Modules
//!
//! - **core**: dense tensor storage, shapes, the `Float` element trait
//! - **similarity**: configuration, window geometry, forward and gradient kernels, reference oracle, layer, MEX forward
//! - **io**: JSON persistence for configurations and tensor bundles

/// Tensor storage.
pub use simnet_core as core;

/// Similarity kernels and layer.
pub use simnet_similarity as similarity;

/// Persistence.
pub use simnet_io as io;

/// Common imports.
pub mod prelude {
    pub use simnet_core::{Float, Tensor};
    pub use simnet_similarity::{
        mex, mex_ref, similarity, similarity_backward, similarity_input_grad,
        similarity_parameters_grad, similarity_ref, MexConfig, OffsetRegions, Padding,
        SimilarityConfig, SimilarityError, SimilarityFunction, SimilarityGradients,
        SimilarityLayer,
    };
}
