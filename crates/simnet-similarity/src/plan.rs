use simnet_core::{Float, Tensor};

use crate::config::SimilarityConfig;
use crate::error::{SimilarityError, SimilarityResult};
use crate::window::WindowGeometry;

/// Checked operand shapes for one call: input `(N, C, H, W)`, parameters
/// `(O, C, kH, kW)` and the window geometry. Built before any kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityPlan {
    pub input_dims: [usize; 4],
    pub param_dims: [usize; 4],
    pub geometry: WindowGeometry,
}

impl SimilarityPlan {
    pub fn new<T: Float>(
        input: &Tensor<T>,
        templates: &Tensor<T>,
        weights: &Tensor<T>,
        config: &SimilarityConfig,
    ) -> SimilarityResult<Self> {
        let input_dims = four_dims("input", input)?;
        let param_dims = check_parameters(templates, weights, config)?;
        if input_dims[1] != param_dims[1] {
            return Err(SimilarityError::ChannelMismatch {
                input: input_dims[1],
                templates: param_dims[1],
            });
        }
        let geometry = WindowGeometry::new(input_dims[2], input_dims[3], config)?;
        Ok(SimilarityPlan {
            input_dims,
            param_dims,
            geometry,
        })
    }

    pub fn batch(&self) -> usize {
        self.input_dims[0]
    }

    pub fn in_channels(&self) -> usize {
        self.input_dims[1]
    }

    pub fn out_channels(&self) -> usize {
        self.param_dims[0]
    }

    /// `(N, O, outH, outW)`.
    pub fn output_dims(&self) -> [usize; 4] {
        [
            self.batch(),
            self.out_channels(),
            self.geometry.output_h(),
            self.geometry.output_w(),
        ]
    }

    pub fn check_upstream<T: Float>(&self, upstream: &Tensor<T>) -> SimilarityResult<()> {
        let expected = self.output_dims();
        if upstream.shape().dims() != expected {
            return Err(SimilarityError::GradientShapeMismatch {
                expected: expected.to_vec(),
                got: upstream.shape_vec(),
            });
        }
        Ok(())
    }
}

/// Templates and weights must be identical 4-D shapes whose spatial extent
/// equals `ksize`. Returns `(O, C, kH, kW)`.
pub fn check_parameters<T: Float>(
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<[usize; 4]> {
    let dims = four_dims("templates", templates)?;
    four_dims("weights", weights)?;
    if templates.shape() != weights.shape() {
        return Err(SimilarityError::ParameterShapeMismatch {
            templates: templates.shape_vec(),
            weights: weights.shape_vec(),
        });
    }
    let [kernel_h, kernel_w] = config.ksize();
    if dims[2] != kernel_h || dims[3] != kernel_w {
        return Err(SimilarityError::KernelShapeMismatch {
            kernel_h,
            kernel_w,
            got_h: dims[2],
            got_w: dims[3],
        });
    }
    Ok(dims)
}

pub(crate) fn four_dims<T: Float>(operand: &'static str, t: &Tensor<T>) -> SimilarityResult<[usize; 4]> {
    t.nchw().map_err(|_| SimilarityError::NotFourDimensional {
        operand,
        got: t.shape_vec(),
    })
}
