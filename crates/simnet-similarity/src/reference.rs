//! Sequential oracle for the forward pass.

use simnet_core::{Float, Tensor};
use tracing::debug_span;

use crate::config::SimilarityConfig;
use crate::error::SimilarityResult;
use crate::plan::SimilarityPlan;
use crate::window::{Sample, SamplePolicy};

/// Same result as [`similarity`](crate::similarity), computed one output
/// element at a time through checked indexing. Slow; meant for testing.
pub fn similarity_ref<T: Float>(
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<Tensor<T>> {
    let plan = SimilarityPlan::new(input, templates, weights, config)?;
    let _span = debug_span!("similarity_ref", input = %input.shape()).entered();

    let [batch, channels, height, width] = plan.input_dims;
    let [_, out_channels, out_h, out_w] = plan.output_dims();
    let [_, _, kernel_h, kernel_w] = plan.param_dims;
    let policy = SamplePolicy::<T>::from_config(config);
    let function = config.similarity_function();
    let fudge = T::from_f64(config.normalization_term_fudge());

    let mut output = Tensor::zeros(plan.output_dims().to_vec());
    for n in 0..batch {
        for o in 0..out_channels {
            for y in 0..out_h {
                for x in 0..out_w {
                    let (y0, x0) = plan.geometry.origin(y, x);
                    let mut score = T::ZERO;
                    let mut energy = T::ZERO;
                    for c in 0..channels {
                        for ky in 0..kernel_h {
                            for kx in 0..kernel_w {
                                let iy = y0 + ky as isize;
                                let ix = x0 + kx as isize;
                                let inside = iy >= 0
                                    && ix >= 0
                                    && (iy as usize) < height
                                    && (ix as usize) < width;
                                let sample = if inside {
                                    policy.resolve(input.get(&[n, c, iy as usize, ix as usize])?)
                                } else {
                                    policy.out_of_bounds()
                                };
                                if let Sample::Present(v) = sample {
                                    let z = templates.get(&[o, c, ky, kx])?;
                                    let w = weights.get(&[o, c, ky, kx])?;
                                    score += w * function.compare(v, z);
                                    energy += w * w;
                                }
                            }
                        }
                    }
                    let value = if config.normalization_term() {
                        score / (energy.sqrt() + fudge)
                    } else {
                        score
                    };
                    output.set(&[n, o, y, x], value)?;
                }
            }
        }
    }
    Ok(output)
}
