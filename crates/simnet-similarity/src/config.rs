use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SimilarityError, SimilarityResult};
use crate::function::SimilarityFunction;

/// Output-sizing policy of the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Padding {
    /// `out = ceil(in / stride)`; windows may hang over the border.
    #[default]
    Same,
    /// `out = (in - k) / stride + 1`; windows stay inside the input.
    Valid,
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Same => f.write_str("SAME"),
            Padding::Valid => f.write_str("VALID"),
        }
    }
}

impl FromStr for Padding {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAME" => Ok(Padding::Same),
            "VALID" => Ok(Padding::Valid),
            _ => Err(SimilarityError::InvalidAttribute {
                name: "padding",
                reason: format!("expected SAME or VALID, got '{s}'"),
            }),
        }
    }
}

/// Validated, immutable configuration of a similarity layer.
///
/// Construct through [`SimilarityConfig::builder`] or deserialize from the
/// attribute form; both paths run the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SimilarityAttributes", into = "SimilarityAttributes")]
pub struct SimilarityConfig {
    ksize: [usize; 2],
    strides: [usize; 2],
    padding: Padding,
    similarity_function: SimilarityFunction,
    normalization_term: bool,
    normalization_term_fudge: f64,
    ignore_nan_input: bool,
    out_of_bounds_value: f64,
}

impl SimilarityConfig {
    pub fn builder() -> SimilarityConfigBuilder {
        SimilarityConfigBuilder::default()
    }

    /// Kernel `(height, width)`.
    pub fn ksize(&self) -> [usize; 2] {
        self.ksize
    }

    /// Strides `(vertical, horizontal)`.
    pub fn strides(&self) -> [usize; 2] {
        self.strides
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn similarity_function(&self) -> SimilarityFunction {
        self.similarity_function
    }

    pub fn normalization_term(&self) -> bool {
        self.normalization_term
    }

    pub fn normalization_term_fudge(&self) -> f64 {
        self.normalization_term_fudge
    }

    pub fn ignore_nan_input(&self) -> bool {
        self.ignore_nan_input
    }

    pub fn out_of_bounds_value(&self) -> f64 {
        self.out_of_bounds_value
    }

    /// A builder pre-filled with this configuration.
    pub fn to_builder(&self) -> SimilarityConfigBuilder {
        SimilarityConfigBuilder {
            attrs: SimilarityAttributes::from(self.clone()),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            ksize: [2, 2],
            strides: [2, 2],
            padding: Padding::Same,
            similarity_function: SimilarityFunction::L2,
            normalization_term: false,
            normalization_term_fudge: 0.001,
            ignore_nan_input: false,
            out_of_bounds_value: 0.0,
        }
    }
}

/// Untyped attribute form of [`SimilarityConfig`], as a host op would hand it
/// over. `ksize` and `strides` take either `[h, w]` or the NHWC form
/// `[1, h, w, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityAttributes {
    pub ksize: Vec<usize>,
    pub strides: Vec<usize>,
    pub padding: Padding,
    pub similarity_function: SimilarityFunction,
    pub normalization_term: bool,
    pub normalization_term_fudge: f64,
    pub ignore_nan_input: bool,
    /// Written as `"NaN"`, `"inf"` or `"-inf"` when not finite.
    #[serde(with = "simnet_core::float_serde")]
    pub out_of_bounds_value: f64,
}

impl Default for SimilarityAttributes {
    fn default() -> Self {
        SimilarityAttributes::from(SimilarityConfig::default())
    }
}

impl From<SimilarityConfig> for SimilarityAttributes {
    fn from(c: SimilarityConfig) -> Self {
        SimilarityAttributes {
            ksize: c.ksize.to_vec(),
            strides: c.strides.to_vec(),
            padding: c.padding,
            similarity_function: c.similarity_function,
            normalization_term: c.normalization_term,
            normalization_term_fudge: c.normalization_term_fudge,
            ignore_nan_input: c.ignore_nan_input,
            out_of_bounds_value: c.out_of_bounds_value,
        }
    }
}

impl TryFrom<SimilarityAttributes> for SimilarityConfig {
    type Error = SimilarityError;

    fn try_from(a: SimilarityAttributes) -> SimilarityResult<Self> {
        let ksize = spatial_pair("ksize", &a.ksize)?;
        let strides = spatial_pair("strides", &a.strides)?;

        if !a.normalization_term_fudge.is_finite() || a.normalization_term_fudge < 0.0 {
            return Err(SimilarityError::InvalidAttribute {
                name: "normalization_term_fudge",
                reason: format!(
                    "must be finite and non-negative, got {}",
                    a.normalization_term_fudge
                ),
            });
        }
        if a.normalization_term && a.normalization_term_fudge == 0.0 {
            return Err(SimilarityError::InvalidAttribute {
                name: "normalization_term_fudge",
                reason: "must be positive when normalization_term is enabled".to_string(),
            });
        }

        Ok(SimilarityConfig {
            ksize,
            strides,
            padding: a.padding,
            similarity_function: a.similarity_function,
            normalization_term: a.normalization_term,
            normalization_term_fudge: a.normalization_term_fudge,
            ignore_nan_input: a.ignore_nan_input,
            out_of_bounds_value: a.out_of_bounds_value,
        })
    }
}

/// Reads a `(h, w)` pair from `[h, w]` or `[1, h, w, 1]`; both entries must
/// be positive.
fn spatial_pair(name: &'static str, values: &[usize]) -> SimilarityResult<[usize; 2]> {
    let pair = match *values {
        [h, w] => [h, w],
        [1, h, w, 1] => [h, w],
        [_, _, _, _] => {
            return Err(SimilarityError::InvalidAttribute {
                name,
                reason: format!("batch and channel entries must be 1, got {values:?}"),
            })
        }
        _ => {
            return Err(SimilarityError::InvalidAttribute {
                name,
                reason: format!("expected 2 or 4 entries, got {}", values.len()),
            })
        }
    };
    if pair.contains(&0) {
        return Err(SimilarityError::InvalidAttribute {
            name,
            reason: format!("entries must be positive, got {values:?}"),
        });
    }
    Ok(pair)
}

/// Builder for [`SimilarityConfig`]; validation happens in [`build`].
///
/// [`build`]: SimilarityConfigBuilder::build
#[derive(Debug, Clone, Default)]
pub struct SimilarityConfigBuilder {
    attrs: SimilarityAttributes,
}

impl SimilarityConfigBuilder {
    pub fn ksize(mut self, height: usize, width: usize) -> Self {
        self.attrs.ksize = vec![height, width];
        self
    }

    pub fn strides(mut self, vertical: usize, horizontal: usize) -> Self {
        self.attrs.strides = vec![vertical, horizontal];
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.attrs.padding = padding;
        self
    }

    pub fn similarity_function(mut self, function: SimilarityFunction) -> Self {
        self.attrs.similarity_function = function;
        self
    }

    pub fn normalization_term(mut self, enabled: bool) -> Self {
        self.attrs.normalization_term = enabled;
        self
    }

    pub fn normalization_term_fudge(mut self, fudge: f64) -> Self {
        self.attrs.normalization_term_fudge = fudge;
        self
    }

    pub fn ignore_nan_input(mut self, ignore: bool) -> Self {
        self.attrs.ignore_nan_input = ignore;
        self
    }

    pub fn out_of_bounds_value(mut self, value: f64) -> Self {
        self.attrs.out_of_bounds_value = value;
        self
    }

    pub fn build(self) -> SimilarityResult<SimilarityConfig> {
        SimilarityConfig::try_from(self.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = SimilarityConfig::default();
        assert_eq!(c.ksize(), [2, 2]);
        assert_eq!(c.strides(), [2, 2]);
        assert_eq!(c.padding(), Padding::Same);
        assert_eq!(c.similarity_function(), SimilarityFunction::L2);
        assert!(!c.normalization_term());
        assert_eq!(c.normalization_term_fudge(), 0.001);
        assert!(!c.ignore_nan_input());
        assert_eq!(c.out_of_bounds_value(), 0.0);
        assert_eq!(SimilarityConfig::builder().build().unwrap(), c);
    }

    #[test]
    fn test_builder() {
        let c = SimilarityConfig::builder()
            .ksize(3, 5)
            .strides(2, 1)
            .padding(Padding::Valid)
            .similarity_function(SimilarityFunction::L1)
            .normalization_term(true)
            .normalization_term_fudge(1e-2)
            .ignore_nan_input(true)
            .out_of_bounds_value(f64::NAN)
            .build()
            .unwrap();
        assert_eq!(c.ksize(), [3, 5]);
        assert_eq!(c.strides(), [2, 1]);
        assert_eq!(c.padding(), Padding::Valid);
        assert!(c.out_of_bounds_value().is_nan());

        let d = c.to_builder().ksize(1, 1).build().unwrap();
        assert_eq!(d.ksize(), [1, 1]);
        assert_eq!(d.strides(), [2, 1]);
    }

    #[test]
    fn test_rejects_zero_kernel_and_stride() {
        let err = SimilarityConfig::builder().ksize(0, 3).build().unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidAttribute { name: "ksize", .. }));
        let err = SimilarityConfig::builder().strides(1, 0).build().unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidAttribute { name: "strides", .. }));
    }

    #[test]
    fn test_rejects_bad_fudge() {
        let err = SimilarityConfig::builder()
            .normalization_term(true)
            .normalization_term_fudge(0.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SimilarityError::InvalidAttribute { name: "normalization_term_fudge", .. }
        ));
        assert!(SimilarityConfig::builder()
            .normalization_term_fudge(-1.0)
            .build()
            .is_err());
        // zero fudge is harmless while normalization is off
        assert!(SimilarityConfig::builder()
            .normalization_term_fudge(0.0)
            .build()
            .is_ok());
    }

    #[test]
    fn test_nhwc_attribute_lists() {
        let attrs = SimilarityAttributes {
            ksize: vec![1, 3, 3, 1],
            strides: vec![1, 2, 1, 1],
            ..SimilarityAttributes::default()
        };
        let c = SimilarityConfig::try_from(attrs).unwrap();
        assert_eq!(c.ksize(), [3, 3]);
        assert_eq!(c.strides(), [2, 1]);

        let attrs = SimilarityAttributes {
            ksize: vec![2, 3, 3, 1],
            ..SimilarityAttributes::default()
        };
        assert!(SimilarityConfig::try_from(attrs).is_err());

        let attrs = SimilarityAttributes {
            strides: vec![2],
            ..SimilarityAttributes::default()
        };
        assert!(SimilarityConfig::try_from(attrs).is_err());
    }

    #[test]
    fn test_json_attributes() {
        let json = r#"{
            "ksize": [1, 3, 3, 1],
            "strides": [1, 2, 1, 1],
            "padding": "VALID",
            "similarity_function": "L1",
            "normalization_term": true
        }"#;
        let c: SimilarityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.ksize(), [3, 3]);
        assert_eq!(c.padding(), Padding::Valid);
        assert_eq!(c.similarity_function(), SimilarityFunction::L1);
        assert_eq!(c.normalization_term_fudge(), 0.001);

        let round: SimilarityConfig =
            serde_json::from_str(&serde_json::to_string(&c).unwrap()).unwrap();
        assert_eq!(round, c);
    }

    #[test]
    fn test_json_keeps_nan_fill() {
        let c = SimilarityConfig::builder()
            .ignore_nan_input(true)
            .out_of_bounds_value(f64::NAN)
            .build()
            .unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains(r#""out_of_bounds_value":"NaN""#), "{json}");
        let back: SimilarityConfig = serde_json::from_str(&json).unwrap();
        assert!(back.out_of_bounds_value().is_nan());
        assert!(back.ignore_nan_input());

        let json = r#"{"out_of_bounds_value": "-inf"}"#;
        let c: SimilarityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.out_of_bounds_value(), f64::NEG_INFINITY);
        assert!(serde_json::from_str::<SimilarityConfig>(r#"{"out_of_bounds_value": null}"#).is_err());
    }

    #[test]
    fn test_json_rejects_unknown_function() {
        let json = r#"{"similarity_function": "COSINE"}"#;
        let err = serde_json::from_str::<SimilarityConfig>(json).unwrap_err();
        assert!(err.to_string().contains("unknown similarity function"));
    }

    #[test]
    fn test_padding_parse() {
        assert_eq!("same".parse::<Padding>().unwrap(), Padding::Same);
        assert_eq!("VALID".parse::<Padding>().unwrap(), Padding::Valid);
        assert!("FULL".parse::<Padding>().is_err());
        assert_eq!(Padding::Valid.to_string(), "VALID");
    }
}
