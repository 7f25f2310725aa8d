//! Data-parallel forward kernel.

use rayon::prelude::*;
use simnet_core::{Float, Tensor};
use tracing::{debug, debug_span, warn};

use crate::config::SimilarityConfig;
use crate::error::SimilarityResult;
use crate::plan::SimilarityPlan;
use crate::window::{Sample, SamplePolicy};

/// Per-output-position sums over the present window samples, laid out like
/// the output `(N, O, outH, outW)`.
pub(crate) struct PatchSums<T> {
    /// `Σ w · compare(x, z)`
    pub(crate) scores: Vec<T>,
    /// `Σ w²`
    pub(crate) energies: Vec<T>,
}

/// Denominator applied to a patch score.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Normalizer<T> {
    enabled: bool,
    fudge: T,
}

impl<T: Float> Normalizer<T> {
    pub(crate) fn from_config(config: &SimilarityConfig) -> Self {
        Normalizer {
            enabled: config.normalization_term(),
            fudge: T::from_f64(config.normalization_term_fudge()),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn fudge(&self) -> T {
        self.fudge
    }

    /// `sqrt(energy) + fudge`, or one when normalization is off.
    #[inline]
    pub(crate) fn denominator(&self, energy: T) -> T {
        if self.enabled {
            energy.sqrt() + self.fudge
        } else {
            T::ONE
        }
    }
}

/// Computes [`PatchSums`] for every output position, one output row per task.
pub(crate) fn accumulate_patches<T: Float>(
    plan: &SimilarityPlan,
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    config: &SimilarityConfig,
) -> PatchSums<T> {
    let [_, channels, height, width] = plan.input_dims;
    let [_, out_channels, out_h, out_w] = plan.output_dims();
    let (kernel_h, kernel_w) = (plan.geometry.kernel_h(), plan.geometry.kernel_w());
    let total: usize = plan.output_dims().iter().product();

    let mut scores = vec![T::ZERO; total];
    let mut energies = vec![T::ZERO; total];
    if total == 0 {
        return PatchSums { scores, energies };
    }

    let geometry = plan.geometry;
    let policy = SamplePolicy::<T>::from_config(config);
    let function = config.similarity_function();
    let (x_data, z_data, w_data) = (input.data(), templates.data(), weights.data());
    let plane_len = height * width;
    let patch_len = channels * kernel_h * kernel_w;

    scores
        .par_chunks_mut(out_w)
        .zip(energies.par_chunks_mut(out_w))
        .enumerate()
        .for_each(|(row, (score_row, energy_row))| {
            let y = row % out_h;
            let o = (row / out_h) % out_channels;
            let n = row / (out_h * out_channels);
            for x in 0..out_w {
                let (y0, x0) = geometry.origin(y, x);
                let mut score = T::ZERO;
                let mut energy = T::ZERO;
                for c in 0..channels {
                    let plane_start = (n * channels + c) * plane_len;
                    let plane = &x_data[plane_start..plane_start + plane_len];
                    let cell_start = o * patch_len + c * kernel_h * kernel_w;
                    for ky in 0..kernel_h {
                        for kx in 0..kernel_w {
                            let iy = y0 + ky as isize;
                            let ix = x0 + kx as isize;
                            let Sample::Present(v) = policy.sample(plane, width, height, iy, ix)
                            else {
                                continue;
                            };
                            let p = cell_start + ky * kernel_w + kx;
                            let w = w_data[p];
                            score += w * function.compare(v, z_data[p]);
                            energy += w * w;
                        }
                    }
                }
                score_row[x] = score;
                energy_row[x] = energy;
            }
        });

    PatchSums { scores, energies }
}

/// Logs when normalization is on and some output channel has an all-zero
/// weight patch; the fudge term is the whole denominator there.
fn warn_degenerate_normalization<T: Float>(
    plan: &SimilarityPlan,
    weights: &Tensor<T>,
    config: &SimilarityConfig,
) {
    let [_, channels, kernel_h, kernel_w] = plan.param_dims;
    let patch_len = channels * kernel_h * kernel_w;
    if !config.normalization_term() || patch_len == 0 {
        return;
    }
    let zero_patches = weights
        .data()
        .chunks(patch_len)
        .filter(|patch| patch.iter().all(|&w| w == T::ZERO))
        .count();
    if zero_patches > 0 {
        warn!(
            zero_patches,
            fudge = config.normalization_term_fudge(),
            "all-zero weight patch under normalization; denominator reduces to the fudge term"
        );
    }
}

/// Forward pass of the similarity layer.
///
/// For every output element `(n, o, y, x)`:
///
/// ```text
/// S = Σ_{c, ky, kx present} w[o,c,ky,kx] · f(x[n, c, y·sH - padT + ky, x·sW - padL + kx], z[o,c,ky,kx])
/// out = S                      (normalization_term = false)
/// out = S / (sqrt(Σ w²) + ε)   (normalization_term = true)
/// ```
///
/// Shapes are validated up front; on error nothing is computed.
pub fn similarity<T: Float>(
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<Tensor<T>> {
    let plan = SimilarityPlan::new(input, templates, weights, config)?;
    let _span = debug_span!(
        "similarity",
        input = %input.shape(),
        templates = %templates.shape(),
        function = %config.similarity_function()
    )
    .entered();

    warn_degenerate_normalization(&plan, weights, config);
    let sums = accumulate_patches(&plan, input, templates, weights, config);
    let normalizer = Normalizer::from_config(config);
    let data = sums
        .scores
        .iter()
        .zip(sums.energies.iter())
        .map(|(&score, &energy)| score / normalizer.denominator(energy))
        .collect();

    let output_dims = plan.output_dims();
    debug!(output = ?output_dims, padding = %config.padding(), "forward complete");
    Ok(Tensor::new(data, output_dims.to_vec())?)
}
