use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use simnet_core::Float;

use crate::error::SimilarityError;

/// Scalar comparison between an input value `x` and a template value `z`.
///
/// Distances are negated so that a larger score always means "more similar".
///
/// | variant | `compare` | `d_input` | `d_template` |
/// |---|---|---|---|
/// | `L2` | `-(x - z)²` | `-2(x - z)` | `2(x - z)` |
/// | `L1` | `-|x - z|` | `-sign(x - z)` | `sign(x - z)` |
/// | `DotProduct` | `x·z` | `z` | `x` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SimilarityFunction {
    L1,
    #[default]
    L2,
    DotProduct,
}

impl SimilarityFunction {
    pub const ALL: [SimilarityFunction; 3] = [
        SimilarityFunction::L1,
        SimilarityFunction::L2,
        SimilarityFunction::DotProduct,
    ];

    #[inline]
    pub fn compare<T: Float>(self, x: T, z: T) -> T {
        match self {
            SimilarityFunction::L1 => -(x - z).abs(),
            SimilarityFunction::L2 => {
                let d = x - z;
                -(d * d)
            }
            SimilarityFunction::DotProduct => x * z,
        }
    }

    /// ∂compare/∂x.
    #[inline]
    pub fn d_input<T: Float>(self, x: T, z: T) -> T {
        match self {
            SimilarityFunction::L1 => -(x - z).sign(),
            SimilarityFunction::L2 => -T::TWO * (x - z),
            SimilarityFunction::DotProduct => z,
        }
    }

    /// ∂compare/∂z.
    #[inline]
    pub fn d_template<T: Float>(self, x: T, z: T) -> T {
        match self {
            SimilarityFunction::L1 => (x - z).sign(),
            SimilarityFunction::L2 => T::TWO * (x - z),
            SimilarityFunction::DotProduct => x,
        }
    }

    /// Attribute spelling.
    pub fn name(self) -> &'static str {
        match self {
            SimilarityFunction::L1 => "L1",
            SimilarityFunction::L2 => "L2",
            SimilarityFunction::DotProduct => "DOT",
        }
    }
}

impl fmt::Display for SimilarityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SimilarityFunction {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(SimilarityFunction::L1),
            "L2" => Ok(SimilarityFunction::L2),
            "DOT" | "DOT_PRODUCT" => Ok(SimilarityFunction::DotProduct),
            _ => Err(SimilarityError::UnknownSimilarityFunction(s.to_string())),
        }
    }
}

impl TryFrom<String> for SimilarityFunction {
    type Error = SimilarityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SimilarityFunction> for String {
    fn from(f: SimilarityFunction) -> Self {
        f.name().to_string()
    }
}
