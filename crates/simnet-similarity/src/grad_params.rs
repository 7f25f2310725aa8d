//! Gradients with respect to templates and weights.
//!
//! Partitioned by parameter cell `(o, c, ky, kx)`: each task walks every
//! batch element and output position and accumulates into its own pair of
//! slots.

use rayon::prelude::*;
use simnet_core::{Float, Tensor};
use tracing::{debug, debug_span};

use crate::config::SimilarityConfig;
use crate::error::SimilarityResult;
use crate::forward::{accumulate_patches, Normalizer};
use crate::plan::SimilarityPlan;
use crate::window::{Sample, SamplePolicy};

/// Per-output factors for the parameter gradients.
struct OutputTerms<T> {
    /// `g / D`
    coeffs: Vec<T>,
    /// `g · S / (D² · sqrt(E))`, zero when normalization is off or `E = 0`.
    cross: Vec<T>,
}

impl<T: Float> OutputTerms<T> {
    fn new(
        plan: &SimilarityPlan,
        input: &Tensor<T>,
        templates: &Tensor<T>,
        weights: &Tensor<T>,
        upstream: &Tensor<T>,
        config: &SimilarityConfig,
    ) -> Self {
        let normalizer = Normalizer::<T>::from_config(config);
        if !normalizer.enabled() {
            return OutputTerms {
                coeffs: upstream.data().to_vec(),
                cross: vec![T::ZERO; upstream.numel()],
            };
        }
        let sums = accumulate_patches(plan, input, templates, weights, config);
        let mut coeffs = Vec::with_capacity(upstream.numel());
        let mut cross = Vec::with_capacity(upstream.numel());
        for ((&g, &score), &energy) in upstream
            .data()
            .iter()
            .zip(sums.scores.iter())
            .zip(sums.energies.iter())
        {
            let d = normalizer.denominator(energy);
            coeffs.push(g / d);
            cross.push(if energy > T::ZERO {
                g * score / (d * d * energy.sqrt())
            } else {
                T::ZERO
            });
        }
        OutputTerms { coeffs, cross }
    }
}

/// `(∂L/∂templates, ∂L/∂weights)` given `upstream = ∂L/∂output`.
///
/// Without normalization:
///
/// ```text
/// dz[p] = Σ g · w[p] · f'_z(x, z[p])
/// dw[p] = Σ g · f(x, z[p])
/// ```
///
/// With normalization every term is divided by `D = sqrt(E) + ε` and the
/// weight gradient gains `- g · S · w[p] / (D² · sqrt(E))` wherever `E > 0`.
/// Sums run over batch elements and output positions where the sample read
/// by cell `p` is present.
pub fn similarity_parameters_grad<T: Float>(
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    upstream: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<(Tensor<T>, Tensor<T>)> {
    let plan = SimilarityPlan::new(input, templates, weights, config)?;
    plan.check_upstream(upstream)?;
    let _span = debug_span!(
        "similarity_parameters_grad",
        input = %input.shape(),
        templates = %templates.shape(),
        function = %config.similarity_function()
    )
    .entered();

    let [batch, channels, height, width] = plan.input_dims;
    let [_, out_channels, out_h, out_w] = plan.output_dims();
    let (kernel_h, kernel_w) = (plan.geometry.kernel_h(), plan.geometry.kernel_w());
    let mut d_templates = vec![T::ZERO; templates.numel()];
    let mut d_weights = vec![T::ZERO; weights.numel()];

    let terms = OutputTerms::new(&plan, input, templates, weights, upstream, config);
    let geometry = plan.geometry;
    let policy = SamplePolicy::<T>::from_config(config);
    let function = config.similarity_function();
    let (x_data, z_data, w_data) = (input.data(), templates.data(), weights.data());
    let plane_len = height * width;

    d_templates
        .par_iter_mut()
        .zip(d_weights.par_iter_mut())
        .enumerate()
        .for_each(|(p, (dz, dw))| {
            let kx = p % kernel_w;
            let ky = (p / kernel_w) % kernel_h;
            let c = (p / (kernel_w * kernel_h)) % channels;
            let o = p / (kernel_w * kernel_h * channels);
            let (z, w) = (z_data[p], w_data[p]);
            let mut acc_z = T::ZERO;
            let mut acc_w = T::ZERO;
            for n in 0..batch {
                let plane_start = (n * channels + c) * plane_len;
                let plane = &x_data[plane_start..plane_start + plane_len];
                let out_start = (n * out_channels + o) * out_h * out_w;
                for y in 0..out_h {
                    for x in 0..out_w {
                        let (y0, x0) = geometry.origin(y, x);
                        let iy = y0 + ky as isize;
                        let ix = x0 + kx as isize;
                        let Sample::Present(v) = policy.sample(plane, width, height, iy, ix) else {
                            continue;
                        };
                        let q = out_start + y * out_w + x;
                        let coeff = terms.coeffs[q];
                        acc_z += coeff * w * function.d_template(v, z);
                        acc_w += coeff * function.compare(v, z) - terms.cross[q] * w;
                    }
                }
            }
            *dz = acc_z;
            *dw = acc_w;
        });

    debug!(cells = templates.numel(), "parameter gradients complete");
    Ok((
        Tensor::new(d_templates, templates.shape_vec())?,
        Tensor::new(d_weights, weights.shape_vec())?,
    ))
}
