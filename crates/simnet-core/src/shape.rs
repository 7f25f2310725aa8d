use crate::error::{TensorError, TensorResult};

/// Dimensions of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size along a specific axis.
    pub fn dim(&self, axis: usize) -> TensorResult<usize> {
        self.dims.get(axis).copied().ok_or(TensorError::InvalidAxis {
            axis,
            ndim: self.ndim(),
        })
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Row-major (C-order) strides.
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// The four extents of an (N, C, H, W) shape.
    pub fn nchw(&self) -> TensorResult<[usize; 4]> {
        match self.dims.as_slice() {
            &[n, c, h, w] => Ok([n, c, h, w]),
            _ => Err(TensorError::RankMismatch {
                expected: 4,
                got: self.to_vec(),
            }),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<[usize; 4]> for Shape {
    fn from(dims: [usize; 4]) -> Self {
        Shape::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 4, 5]);
        assert_eq!(s.ndim(), 4);
        assert_eq!(s.numel(), 120);
        assert_eq!(s.dim(1).unwrap(), 3);
        assert!(s.dim(4).is_err());
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![2, 3, 4, 5]);
        assert_eq!(s.strides(), vec![60, 20, 5, 1]);
    }

    #[test]
    fn test_nchw() {
        let s = Shape::from([1, 3, 8, 9]);
        assert_eq!(s.nchw().unwrap(), [1, 3, 8, 9]);

        let flat = Shape::new(vec![3, 8]);
        assert_eq!(
            flat.nchw(),
            Err(TensorError::RankMismatch {
                expected: 4,
                got: vec![3, 8],
            })
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(vec![1, 3, 800, 800]).to_string(), "(1, 3, 800, 800)");
    }
}
