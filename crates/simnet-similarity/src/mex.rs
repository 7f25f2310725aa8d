//! MEX layer forward pass.
//!
//! Every output element pools one `(channel, height, width)` input block
//! shifted by a learned offset per block element:
//!
//! ```text
//! out[n, m·Cout + cz, y, x] = (1/ε) · log( (1/K) · Σ_k exp(ε · (x_k + offsets[r, m, k])) )
//! ```
//!
//! where `K` is the number of present samples and `r` the offset region of
//! `(cz, y, x)`. `ε → +∞` is a max over the block, `ε → -∞` a min.
//! `softmax_mode` drops the `1/K`.

use rayon::prelude::*;
use simnet_core::{Float, Tensor};
use tracing::{debug, debug_span};

use crate::config::Padding;
use crate::error::{SimilarityError, SimilarityResult};
use crate::mex_config::MexConfig;
use crate::plan::four_dims;
use crate::window::{AxisGeometry, Sample, SamplePolicy, WindowGeometry};

/// Checked shapes of one MEX call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MexPlan {
    pub input_dims: [usize; 4],
    /// Block placement along channels; never padded.
    pub channel_axis: AxisGeometry,
    pub geometry: WindowGeometry,
    /// Offset sets per output position, `M`.
    pub instances: usize,
    pub region_counts: [usize; 3],
}

impl MexPlan {
    /// Offsets must be `(num_regions, M, block_c, block_h, block_w)`.
    pub fn new<T: Float>(input: &Tensor<T>, offsets: &Tensor<T>, config: &MexConfig) -> SimilarityResult<Self> {
        let input_dims = four_dims("input", input)?;
        let [_, channels, height, width] = input_dims;
        let [block_c, block_h, block_w] = config.blocks();
        let [stride_c, stride_h, stride_w] = config.strides();

        let channel_axis = AxisGeometry::new(channels, block_c, stride_c, Padding::Valid).ok_or(
            SimilarityError::BlockExceedsChannels {
                block: block_c,
                channels,
            },
        )?;
        let geometry = WindowGeometry::from_parts(
            height,
            width,
            [block_h, block_w],
            [stride_h, stride_w],
            config.padding(),
        )?;

        let grid = [channel_axis.output, geometry.output_h(), geometry.output_w()];
        let region_counts = config.offsets_region().counts(grid);
        let got = offsets.shape_vec();
        let instances = got.get(1).copied().unwrap_or(1);
        let expected = vec![region_counts.iter().product(), instances, block_c, block_h, block_w];
        if got != expected {
            return Err(SimilarityError::OffsetsShapeMismatch { expected, got });
        }

        Ok(MexPlan {
            input_dims,
            channel_axis,
            geometry,
            instances,
            region_counts,
        })
    }

    /// Output positions per instance, `(Cout, outH, outW)`.
    pub fn grid(&self) -> [usize; 3] {
        [
            self.channel_axis.output,
            self.geometry.output_h(),
            self.geometry.output_w(),
        ]
    }

    /// `(N, M·Cout, outH, outW)`.
    pub fn output_dims(&self) -> [usize; 4] {
        let [grid_c, out_h, out_w] = self.grid();
        [self.input_dims[0], self.instances * grid_c, out_h, out_w]
    }
}

/// Streaming `(1/ε) log Σ exp(ε v)`, shifted by the running extreme so no
/// exponent is positive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SoftExtreme {
    epsilon: f64,
    extreme: Option<f64>,
    /// `Σ exp(ε (v - extreme))`
    sum: f64,
    count: usize,
    nan: bool,
}

impl SoftExtreme {
    pub(crate) fn new(epsilon: f64) -> Self {
        SoftExtreme {
            epsilon,
            extreme: None,
            sum: 0.0,
            count: 0,
            nan: false,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, v: f64) {
        if v.is_nan() {
            self.nan = true;
            return;
        }
        self.count += 1;
        let finite = self.epsilon.is_finite();
        match self.extreme {
            None => {
                self.extreme = Some(v);
                self.sum = 1.0;
            }
            Some(e) if self.epsilon * (v - e) > 0.0 => {
                if finite {
                    self.sum = self.sum * (self.epsilon * (e - v)).exp() + 1.0;
                }
                self.extreme = Some(v);
            }
            Some(e) => {
                if finite {
                    self.sum += (self.epsilon * (v - e)).exp();
                }
            }
        }
    }

    /// No samples gives the identity of the limit: `-inf` for `ε > 0`,
    /// `+inf` for `ε < 0`.
    pub(crate) fn finish(&self, softmax_mode: bool) -> f64 {
        if self.nan {
            return f64::NAN;
        }
        match self.extreme {
            None if self.epsilon > 0.0 => f64::NEG_INFINITY,
            None => f64::INFINITY,
            Some(e) if !e.is_finite() || !self.epsilon.is_finite() => e,
            Some(e) => {
                let mean_term = if softmax_mode { 0.0 } else { (self.count as f64).ln() };
                e + (self.sum.ln() - mean_term) / self.epsilon
            }
        }
    }
}

/// MEX forward over an NCHW input. One output row per task.
pub fn mex<T: Float>(input: &Tensor<T>, offsets: &Tensor<T>, config: &MexConfig) -> SimilarityResult<Tensor<T>> {
    let plan = MexPlan::new(input, offsets, config)?;
    let _span = debug_span!(
        "mex",
        input = %input.shape(),
        offsets = %offsets.shape(),
        epsilon = config.epsilon()
    )
    .entered();

    let output_dims = plan.output_dims();
    let [_, out_channels, out_h, out_w] = output_dims;
    let mut output = vec![T::ZERO; output_dims.iter().product()];
    if output.is_empty() {
        return Ok(Tensor::new(output, output_dims.to_vec())?);
    }

    let [_, channels, height, width] = plan.input_dims;
    let [block_c, block_h, block_w] = config.blocks();
    let block_len = config.block_len();
    let grid_c = plan.channel_axis.output;
    let policy = SamplePolicy::<T>::new(config.ignore_nan_input(), config.blocks_out_of_bounds_value());
    let regions = config.offsets_region();
    let (epsilon, softmax_mode) = (config.epsilon(), config.softmax_mode());
    let (x_data, o_data) = (input.data(), offsets.data());
    let plane_len = height * width;

    output
        .par_chunks_mut(out_w)
        .enumerate()
        .for_each(|(row, out_row)| {
            let y = row % out_h;
            let channel = (row / out_h) % out_channels;
            let n = row / (out_h * out_channels);
            let (m, cz) = (channel / grid_c, channel % grid_c);
            let c0 = plan.channel_axis.origin(cz) as usize;
            for (x, slot) in out_row.iter_mut().enumerate() {
                let r = regions.region(plan.region_counts, cz, y, x);
                let start = (r * plan.instances + m) * block_len;
                let shifts = &o_data[start..start + block_len];
                let (y0, x0) = plan.geometry.origin(y, x);
                let mut acc = SoftExtreme::new(epsilon);
                for l in 0..block_c {
                    let plane_start = (n * channels + c0 + l) * plane_len;
                    let plane = &x_data[plane_start..plane_start + plane_len];
                    for ky in 0..block_h {
                        for kx in 0..block_w {
                            let iy = y0 + ky as isize;
                            let ix = x0 + kx as isize;
                            let Sample::Present(v) = policy.sample(plane, width, height, iy, ix) else {
                                continue;
                            };
                            acc.push(v.to_f64() + shifts[(l * block_h + ky) * block_w + kx].to_f64());
                        }
                    }
                }
                *slot = T::from_f64(acc.finish(softmax_mode));
            }
        });

    debug!(output = ?output_dims, regions = ?plan.region_counts, "mex forward complete");
    Ok(Tensor::new(output, output_dims.to_vec())?)
}

/// Same result as [`mex`], one output element at a time through checked
/// indexing. Slow; meant for testing.
pub fn mex_ref<T: Float>(input: &Tensor<T>, offsets: &Tensor<T>, config: &MexConfig) -> SimilarityResult<Tensor<T>> {
    let plan = MexPlan::new(input, offsets, config)?;
    let _span = debug_span!("mex_ref", input = %input.shape()).entered();

    let [batch, _, height, width] = plan.input_dims;
    let [grid_c, out_h, out_w] = plan.grid();
    let [block_c, block_h, block_w] = config.blocks();
    let policy = SamplePolicy::<T>::new(config.ignore_nan_input(), config.blocks_out_of_bounds_value());
    let regions = config.offsets_region();

    let mut output = Tensor::zeros(plan.output_dims().to_vec());
    for n in 0..batch {
        for m in 0..plan.instances {
            for cz in 0..grid_c {
                for y in 0..out_h {
                    for x in 0..out_w {
                        let r = regions.region(plan.region_counts, cz, y, x);
                        let c0 = plan.channel_axis.origin(cz) as usize;
                        let (y0, x0) = plan.geometry.origin(y, x);
                        let mut acc = SoftExtreme::new(config.epsilon());
                        for l in 0..block_c {
                            for ky in 0..block_h {
                                for kx in 0..block_w {
                                    let iy = y0 + ky as isize;
                                    let ix = x0 + kx as isize;
                                    let inside = iy >= 0
                                        && ix >= 0
                                        && (iy as usize) < height
                                        && (ix as usize) < width;
                                    let sample = if inside {
                                        policy.resolve(input.get(&[n, c0 + l, iy as usize, ix as usize])?)
                                    } else {
                                        policy.out_of_bounds()
                                    };
                                    if let Sample::Present(v) = sample {
                                        let shift = offsets.get(&[r, m, l, ky, kx])?;
                                        acc.push(v.to_f64() + shift.to_f64());
                                    }
                                }
                            }
                        }
                        let value = T::from_f64(acc.finish(config.softmax_mode()));
                        output.set(&[n, m * grid_c + cz, y, x], value)?;
                    }
                }
            }
        }
    }
    Ok(output)
}
