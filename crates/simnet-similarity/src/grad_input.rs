//! Gradient of the loss with respect to the input.
//!
//! Each input row is owned by one task, which gathers from every output
//! position whose window reads it. No two tasks write the same element.

use rayon::prelude::*;
use simnet_core::{Float, Tensor};
use tracing::{debug, debug_span};

use crate::config::SimilarityConfig;
use crate::error::SimilarityResult;
use crate::forward::{accumulate_patches, Normalizer};
use crate::plan::SimilarityPlan;
use crate::window::{Sample, SamplePolicy};

/// Per-output multiplier `g / D`; the raw upstream when normalization is off.
pub(crate) fn output_coefficients<T: Float>(
    plan: &SimilarityPlan,
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    upstream: &Tensor<T>,
    config: &SimilarityConfig,
) -> Vec<T> {
    let normalizer = Normalizer::<T>::from_config(config);
    if !normalizer.enabled() {
        return upstream.data().to_vec();
    }
    let sums = accumulate_patches(plan, input, templates, weights, config);
    upstream
        .data()
        .iter()
        .zip(sums.energies.iter())
        .map(|(&g, &energy)| g / normalizer.denominator(energy))
        .collect()
}

/// `∂L/∂input` given `upstream = ∂L/∂output`.
///
/// ```text
/// dx[n,c,i,j] = Σ_{o, ky, kx} g[n,o,y,x] / D[n,o,y,x] · w[o,c,ky,kx] · f'_x(x[n,c,i,j], z[o,c,ky,kx])
/// ```
///
/// summed over the output positions `(y, x)` whose window reads `(i, j)` at
/// offset `(ky, kx)`. Missing input elements and elements no window covers
/// receive zero.
pub fn similarity_input_grad<T: Float>(
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    upstream: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<Tensor<T>> {
    let plan = SimilarityPlan::new(input, templates, weights, config)?;
    plan.check_upstream(upstream)?;
    let _span = debug_span!(
        "similarity_input_grad",
        input = %input.shape(),
        templates = %templates.shape(),
        function = %config.similarity_function()
    )
    .entered();

    let [_, channels, height, width] = plan.input_dims;
    let [_, out_channels, out_h, out_w] = plan.output_dims();
    let (kernel_h, kernel_w) = (plan.geometry.kernel_h(), plan.geometry.kernel_w());
    let mut grad = vec![T::ZERO; input.numel()];
    if grad.is_empty() {
        return Ok(Tensor::new(grad, input.shape_vec())?);
    }

    let coeffs = output_coefficients(&plan, input, templates, weights, upstream, config);
    let geometry = plan.geometry;
    let policy = SamplePolicy::<T>::from_config(config);
    let function = config.similarity_function();
    let (x_data, z_data, w_data) = (input.data(), templates.data(), weights.data());
    let kernel_len = kernel_h * kernel_w;
    let out_plane = out_h * out_w;

    grad.par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, grad_row)| {
            let iy = row % height;
            let c = (row / height) % channels;
            let n = row / (height * channels);
            let x_row = &x_data[row * width..(row + 1) * width];
            for (ix, slot) in grad_row.iter_mut().enumerate() {
                let Sample::Present(x) = policy.resolve(x_row[ix]) else {
                    continue;
                };
                let mut acc = T::ZERO;
                for ky in 0..kernel_h {
                    let Some(y) = geometry.output_row(iy, ky) else {
                        continue;
                    };
                    for kx in 0..kernel_w {
                        let Some(xo) = geometry.output_col(ix, kx) else {
                            continue;
                        };
                        for o in 0..out_channels {
                            let q = (n * out_channels + o) * out_plane + y * out_w + xo;
                            let p = (o * channels + c) * kernel_len + ky * kernel_w + kx;
                            acc += coeffs[q] * w_data[p] * function.d_input(x, z_data[p]);
                        }
                    }
                }
                *slot = acc;
            }
        });

    debug!("input gradient complete");
    Ok(Tensor::new(grad, input.shape_vec())?)
}
