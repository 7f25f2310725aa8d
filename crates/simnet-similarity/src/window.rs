//! Sliding-window geometry shared by every kernel.
//!
//! All engines size their output, place their windows, and decide which
//! samples are missing through [`WindowGeometry`] and [`SamplePolicy`]. The
//! inverse lookups (`output_row`, `output_col`) let the gradient kernels
//! gather from the output positions that read a given input element.

use simnet_core::Float;

use crate::config::{Padding, SimilarityConfig};
use crate::error::{SimilarityError, SimilarityResult};

/// Output size and padding for one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisGeometry {
    pub input: usize,
    pub kernel: usize,
    pub stride: usize,
    pub output: usize,
    /// Padding before the first input element (top or left).
    pub pad_before: usize,
}

impl AxisGeometry {
    /// `None` when a VALID window cannot fit.
    pub fn new(input: usize, kernel: usize, stride: usize, padding: Padding) -> Option<Self> {
        let (output, pad_before) = match padding {
            Padding::Same => {
                let output = input.div_ceil(stride);
                let needed = (output.saturating_sub(1) * stride + kernel).saturating_sub(input);
                (output, needed / 2)
            }
            Padding::Valid => {
                if kernel > input {
                    return None;
                }
                ((input - kernel) / stride + 1, 0)
            }
        };
        Some(AxisGeometry {
            input,
            kernel,
            stride,
            output,
            pad_before,
        })
    }

    /// Input coordinate of the first window element at output index `o`.
    #[inline]
    pub fn origin(&self, o: usize) -> isize {
        (o * self.stride) as isize - self.pad_before as isize
    }

    /// Output index whose window reads input `i` at kernel offset `k`.
    #[inline]
    pub fn output_for(&self, i: usize, k: usize) -> Option<usize> {
        let shifted = (i + self.pad_before).checked_sub(k)?;
        if shifted % self.stride != 0 {
            return None;
        }
        let o = shifted / self.stride;
        (o < self.output).then_some(o)
    }
}

/// Window placement over an `input_h × input_w` plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub rows: AxisGeometry,
    pub cols: AxisGeometry,
}

impl WindowGeometry {
    pub fn new(input_h: usize, input_w: usize, config: &SimilarityConfig) -> SimilarityResult<Self> {
        Self::from_parts(input_h, input_w, config.ksize(), config.strides(), config.padding())
    }

    /// Geometry from an explicit `(h, w)` kernel and stride.
    pub fn from_parts(
        input_h: usize,
        input_w: usize,
        [kernel_h, kernel_w]: [usize; 2],
        [stride_h, stride_w]: [usize; 2],
        padding: Padding,
    ) -> SimilarityResult<Self> {
        let rows = AxisGeometry::new(input_h, kernel_h, stride_h, padding);
        let cols = AxisGeometry::new(input_w, kernel_w, stride_w, padding);
        match (rows, cols) {
            (Some(rows), Some(cols)) => Ok(WindowGeometry { rows, cols }),
            _ => Err(SimilarityError::KernelExceedsInput {
                kernel_h,
                kernel_w,
                input_h,
                input_w,
            }),
        }
    }

    pub fn output_h(&self) -> usize {
        self.rows.output
    }

    pub fn output_w(&self) -> usize {
        self.cols.output
    }

    pub fn kernel_h(&self) -> usize {
        self.rows.kernel
    }

    pub fn kernel_w(&self) -> usize {
        self.cols.kernel
    }

    /// Top-left input coordinate of the window at output `(r, c)`.
    #[inline]
    pub fn origin(&self, r: usize, c: usize) -> (isize, isize) {
        (self.rows.origin(r), self.cols.origin(c))
    }

    #[inline]
    pub fn output_row(&self, iy: usize, ky: usize) -> Option<usize> {
        self.rows.output_for(iy, ky)
    }

    #[inline]
    pub fn output_col(&self, ix: usize, kx: usize) -> Option<usize> {
        self.cols.output_for(ix, kx)
    }
}

/// A window sample after missing-value resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample<T> {
    Present(T),
    Missing,
}

/// How out-of-bounds and NaN samples are resolved.
///
/// With `ignore_nan_input`, NaN inputs and out-of-bounds positions are both
/// `Missing`. Without it, out-of-bounds positions read `out_of_bounds_value`
/// and NaN inputs are passed through.
#[derive(Debug, Clone, Copy)]
pub struct SamplePolicy<T> {
    pub ignore_nan_input: bool,
    pub out_of_bounds_value: T,
}

impl<T: Float> SamplePolicy<T> {
    pub fn new(ignore_nan_input: bool, out_of_bounds_value: f64) -> Self {
        SamplePolicy {
            ignore_nan_input,
            out_of_bounds_value: T::from_f64(out_of_bounds_value),
        }
    }

    pub fn from_config(config: &SimilarityConfig) -> Self {
        Self::new(config.ignore_nan_input(), config.out_of_bounds_value())
    }

    /// Resolve an in-bounds input value.
    #[inline]
    pub fn resolve(&self, value: T) -> Sample<T> {
        if self.ignore_nan_input && value.is_nan() {
            Sample::Missing
        } else {
            Sample::Present(value)
        }
    }

    /// Resolve a position outside the input.
    #[inline]
    pub fn out_of_bounds(&self) -> Sample<T> {
        if self.ignore_nan_input {
            Sample::Missing
        } else {
            Sample::Present(self.out_of_bounds_value)
        }
    }

    /// Resolve position `(iy, ix)` of a `height × width` plane.
    #[inline]
    pub fn sample(&self, plane: &[T], width: usize, height: usize, iy: isize, ix: isize) -> Sample<T> {
        if iy >= 0 && ix >= 0 && (iy as usize) < height && (ix as usize) < width {
            self.resolve(plane[iy as usize * width + ix as usize])
        } else {
            self.out_of_bounds()
        }
    }
}
