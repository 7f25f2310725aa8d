use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense tensor with a flat row-major `Vec<T>` buffer.
///
/// The similarity engines treat every operand as (N, C, H, W) and index the
/// flat buffer directly after checking `nchw()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    bound = "T: Float",
    try_from = "TensorRepr<T>",
    into = "TensorRepr<T>"
)]
pub struct Tensor<T: Float> {
    data: Vec<T>,
    shape: Shape,
}

/// Serialized form of a [`Tensor`]; deserialization re-checks the length.
/// Non-finite elements are written as strings (see [`float_serde`](crate::float_serde)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct TensorRepr<T: Float> {
    pub shape: Vec<usize>,
    #[serde(with = "crate::float_serde::seq")]
    pub data: Vec<T>,
}

impl<T: Float> TryFrom<TensorRepr<T>> for Tensor<T> {
    type Error = TensorError;

    fn try_from(repr: TensorRepr<T>) -> TensorResult<Self> {
        Tensor::new(repr.data, repr.shape)
    }
}

impl<T: Float> From<Tensor<T>> for TensorRepr<T> {
    fn from(t: Tensor<T>) -> Self {
        TensorRepr {
            shape: t.shape.to_vec(),
            data: t.data,
        }
    }
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::DataLength {
                len: data.len(),
                numel: s.numel(),
                shape: s.to_vec(),
            });
        }
        Ok(Tensor { data, shape: s })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ZERO)
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ONE)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![value; s.numel()],
            shape: s,
        }
    }

    /// Build a tensor by evaluating `f` at every flat index.
    pub fn from_fn(shape: Vec<usize>, f: impl FnMut(usize) -> T) -> Self {
        let s = Shape::new(shape);
        let data = (0..s.numel()).map(f).collect();
        Tensor { data, shape: s }
    }

    /// Random tensor with uniform distribution in [0, 1).
    pub fn rand(shape: Vec<usize>, seed: Option<u64>) -> Self {
        let mut rng = seeded(seed);
        Self::from_fn(shape, |_| T::from_f64(rng.gen::<f64>()))
    }

    /// Random tensor with standard normal distribution (Box-Muller).
    pub fn randn(shape: Vec<usize>, seed: Option<u64>) -> Self {
        let s = Shape::new(shape);
        let mut rng = seeded(seed);
        let n = s.numel();
        let mut data = Vec::with_capacity(n + 1);
        while data.len() < n {
            let u1: f64 = rng.gen::<f64>().max(1e-10);
            let u2: f64 = rng.gen::<f64>();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f64::consts::PI * u2;
            data.push(T::from_f64(r * theta.cos()));
            data.push(T::from_f64(r * theta.sin()));
        }
        data.truncate(n);
        Tensor { data, shape: s }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Extents of a 4-D tensor as `[n, c, h, w]`.
    pub fn nchw(&self) -> TensorResult<[usize; 4]> {
        self.shape.nchw()
    }

    fn flat_index(&self, indices: &[usize]) -> TensorResult<usize> {
        if indices.len() != self.ndim() {
            return Err(TensorError::RankMismatch {
                expected: indices.len(),
                got: self.shape_vec(),
            });
        }
        let strides = self.shape.strides();
        let mut offset = 0;
        for (axis, &idx) in indices.iter().enumerate() {
            let size = self.shape.dim(axis)?;
            if idx >= size {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    axis,
                    size,
                });
            }
            offset += idx * strides[axis];
        }
        Ok(offset)
    }

    /// Get a single element by multi-dimensional index.
    pub fn get(&self, indices: &[usize]) -> TensorResult<T> {
        let offset = self.flat_index(indices)?;
        Ok(self.data[offset])
    }

    /// Set a single element.
    pub fn set(&mut self, indices: &[usize], value: T) -> TensorResult<()> {
        let offset = self.flat_index(indices)?;
        self.data[offset] = value;
        Ok(())
    }

    // ─── Element-wise & reductions ──────────────────────────────────────────

    pub fn map<F: Fn(T) -> T>(&self, f: F) -> Tensor<T> {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn sum_all(&self) -> T {
        self.data.iter().copied().sum()
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Largest absolute element-wise difference; shapes must match.
    pub fn max_abs_diff(&self, other: &Tensor<T>) -> TensorResult<f64> {
        self.check_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| (a.to_f64() - b.to_f64()).abs())
            .fold(0.0, f64::max))
    }

    /// `|a - b| <= atol + rtol * |b|` for every element. NaNs compare equal
    /// only to NaNs.
    pub fn allclose(&self, other: &Tensor<T>, rtol: f64, atol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        self.data.iter().zip(other.data.iter()).all(|(&a, &b)| {
            let (a, b) = (a.to_f64(), b.to_f64());
            if a.is_nan() || b.is_nan() {
                return a.is_nan() && b.is_nan();
            }
            (a - b).abs() <= atol + rtol * b.abs()
        })
    }

    fn check_same_shape(&self, other: &Tensor<T>) -> TensorResult<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: other.shape_vec(),
            });
        }
        Ok(())
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl<T: Float> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor([")?;
        for (i, v) in self.data.iter().take(8).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", v)?;
        }
        if self.data.len() > 8 {
            write!(f, ", ...")?;
        }
        write!(f, "], shape={})", self.shape)
    }
}
