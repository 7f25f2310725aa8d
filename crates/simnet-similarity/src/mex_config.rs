//! Configuration of the MEX (generalized log-sum-exp pooling) layer.

use serde::{Deserialize, Serialize};

use crate::config::Padding;
use crate::error::{SimilarityError, SimilarityResult};

/// How output positions share offset sets.
///
/// Sizes are `[channel, height, width]` over the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetRegions {
    /// One offset set for every position.
    #[default]
    Single,
    /// Contiguous tiles of the given size; position `p` uses tile `p / size`.
    Shared([usize; 3]),
    /// Interleaved classes with the given period; position `p` uses class
    /// `p % period`.
    Unshared([usize; 3]),
}

impl OffsetRegions {
    /// Regions per axis for an output grid of `[channels, height, width]`.
    pub fn counts(&self, output: [usize; 3]) -> [usize; 3] {
        match *self {
            OffsetRegions::Single => [1, 1, 1],
            OffsetRegions::Shared(size) => [
                output[0].div_ceil(size[0]).max(1),
                output[1].div_ceil(size[1]).max(1),
                output[2].div_ceil(size[2]).max(1),
            ],
            OffsetRegions::Unshared(period) => period,
        }
    }

    /// Total number of offset sets for an output grid.
    pub fn num_regions(&self, output: [usize; 3]) -> usize {
        self.counts(output).iter().product()
    }

    /// Flat region index of output position `(c, y, x)`, given `counts`.
    #[inline]
    pub fn region(&self, counts: [usize; 3], c: usize, y: usize, x: usize) -> usize {
        let [rc, ry, rx] = match *self {
            OffsetRegions::Single => return 0,
            OffsetRegions::Shared(size) => [c / size[0], y / size[1], x / size[2]],
            OffsetRegions::Unshared(period) => [c % period[0], y % period[1], x % period[2]],
        };
        (rc * counts[1] + ry) * counts[2] + rx
    }

    fn sizes(&self) -> Option<[usize; 3]> {
        match *self {
            OffsetRegions::Single => None,
            OffsetRegions::Shared(s) | OffsetRegions::Unshared(s) => Some(s),
        }
    }
}

/// Validated, immutable configuration of a MEX layer.
///
/// Blocks slide over `(channel, height, width)`. The channel axis never pads;
/// `padding` applies to height and width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MexAttributes", into = "MexAttributes")]
pub struct MexConfig {
    blocks: [usize; 3],
    strides: [usize; 3],
    padding: Padding,
    epsilon: f64,
    softmax_mode: bool,
    offsets_region: OffsetRegions,
    ignore_nan_input: bool,
    blocks_out_of_bounds_value: f64,
}

impl MexConfig {
    pub fn builder() -> MexConfigBuilder {
        MexConfigBuilder::default()
    }

    /// Block `(channels, height, width)`.
    pub fn blocks(&self) -> [usize; 3] {
        self.blocks
    }

    /// Strides `(channel, vertical, horizontal)`.
    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Sharpness. `+inf` is a max, `-inf` a min.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Drops the `-log K` mean term.
    pub fn softmax_mode(&self) -> bool {
        self.softmax_mode
    }

    pub fn offsets_region(&self) -> OffsetRegions {
        self.offsets_region
    }

    pub fn ignore_nan_input(&self) -> bool {
        self.ignore_nan_input
    }

    pub fn blocks_out_of_bounds_value(&self) -> f64 {
        self.blocks_out_of_bounds_value
    }

    /// Elements per block.
    pub fn block_len(&self) -> usize {
        self.blocks.iter().product()
    }

    pub fn to_builder(&self) -> MexConfigBuilder {
        MexConfigBuilder {
            attrs: MexAttributes::from(self.clone()),
        }
    }
}

impl Default for MexConfig {
    fn default() -> Self {
        MexConfig {
            blocks: [1, 1, 1],
            strides: [1, 1, 1],
            padding: Padding::Valid,
            epsilon: 1.0,
            softmax_mode: false,
            offsets_region: OffsetRegions::Single,
            ignore_nan_input: false,
            blocks_out_of_bounds_value: 0.0,
        }
    }
}

/// Attribute form of [`MexConfig`]. `blocks` and `strides` are
/// `[channels, height, width]`; non-finite floats are stored as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MexAttributes {
    pub blocks: Vec<usize>,
    pub strides: Vec<usize>,
    pub padding: Padding,
    #[serde(with = "simnet_core::float_serde")]
    pub epsilon: f64,
    pub softmax_mode: bool,
    pub offsets_region: OffsetRegions,
    pub ignore_nan_input: bool,
    #[serde(with = "simnet_core::float_serde")]
    pub blocks_out_of_bounds_value: f64,
}

impl Default for MexAttributes {
    fn default() -> Self {
        MexAttributes::from(MexConfig::default())
    }
}

impl From<MexConfig> for MexAttributes {
    fn from(c: MexConfig) -> Self {
        MexAttributes {
            blocks: c.blocks.to_vec(),
            strides: c.strides.to_vec(),
            padding: c.padding,
            epsilon: c.epsilon,
            softmax_mode: c.softmax_mode,
            offsets_region: c.offsets_region,
            ignore_nan_input: c.ignore_nan_input,
            blocks_out_of_bounds_value: c.blocks_out_of_bounds_value,
        }
    }
}

impl TryFrom<MexAttributes> for MexConfig {
    type Error = SimilarityError;

    fn try_from(a: MexAttributes) -> SimilarityResult<Self> {
        let blocks = positive_triple("blocks", &a.blocks)?;
        let strides = positive_triple("strides", &a.strides)?;
        if a.epsilon == 0.0 || a.epsilon.is_nan() {
            return Err(SimilarityError::InvalidAttribute {
                name: "epsilon",
                reason: format!("must be non-zero and not NaN, got {}", a.epsilon),
            });
        }
        if let Some(sizes) = a.offsets_region.sizes() {
            if sizes.contains(&0) {
                return Err(SimilarityError::InvalidAttribute {
                    name: "offsets_region",
                    reason: format!("region sizes must be positive, got {sizes:?}"),
                });
            }
        }
        Ok(MexConfig {
            blocks,
            strides,
            padding: a.padding,
            epsilon: a.epsilon,
            softmax_mode: a.softmax_mode,
            offsets_region: a.offsets_region,
            ignore_nan_input: a.ignore_nan_input,
            blocks_out_of_bounds_value: a.blocks_out_of_bounds_value,
        })
    }
}

fn positive_triple(name: &'static str, values: &[usize]) -> SimilarityResult<[usize; 3]> {
    match *values {
        [c, h, w] if c > 0 && h > 0 && w > 0 => Ok([c, h, w]),
        [_, _, _] => Err(SimilarityError::InvalidAttribute {
            name,
            reason: format!("entries must be positive, got {values:?}"),
        }),
        _ => Err(SimilarityError::InvalidAttribute {
            name,
            reason: format!("expected [channels, height, width], got {} entries", values.len()),
        }),
    }
}

/// Builder for [`MexConfig`].
#[derive(Debug, Clone, Default)]
pub struct MexConfigBuilder {
    attrs: MexAttributes,
}

impl MexConfigBuilder {
    pub fn blocks(mut self, channels: usize, height: usize, width: usize) -> Self {
        self.attrs.blocks = vec![channels, height, width];
        self
    }

    pub fn strides(mut self, channel: usize, vertical: usize, horizontal: usize) -> Self {
        self.attrs.strides = vec![channel, vertical, horizontal];
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.attrs.padding = padding;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.attrs.epsilon = epsilon;
        self
    }

    pub fn softmax_mode(mut self, enabled: bool) -> Self {
        self.attrs.softmax_mode = enabled;
        self
    }

    pub fn offsets_region(mut self, regions: OffsetRegions) -> Self {
        self.attrs.offsets_region = regions;
        self
    }

    pub fn ignore_nan_input(mut self, ignore: bool) -> Self {
        self.attrs.ignore_nan_input = ignore;
        self
    }

    pub fn blocks_out_of_bounds_value(mut self, value: f64) -> Self {
        self.attrs.blocks_out_of_bounds_value = value;
        self
    }

    pub fn build(self) -> SimilarityResult<MexConfig> {
        MexConfig::try_from(self.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MexConfig::default();
        assert_eq!(c.blocks(), [1, 1, 1]);
        assert_eq!(c.strides(), [1, 1, 1]);
        assert_eq!(c.padding(), Padding::Valid);
        assert_eq!(c.epsilon(), 1.0);
        assert_eq!(c.offsets_region(), OffsetRegions::Single);
        assert_eq!(c.block_len(), 1);
        assert_eq!(MexConfig::builder().build().unwrap(), c);
    }

    #[test]
    fn test_rejects_bad_attributes() {
        let err = MexConfig::builder().epsilon(0.0).build().unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidAttribute { name: "epsilon", .. }));
        assert!(MexConfig::builder().epsilon(f64::NAN).build().is_err());
        assert!(MexConfig::builder().epsilon(f64::NEG_INFINITY).build().is_ok());

        let err = MexConfig::builder().blocks(1, 0, 2).build().unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidAttribute { name: "blocks", .. }));
        let attrs = MexAttributes {
            strides: vec![1, 1],
            ..MexAttributes::default()
        };
        assert!(matches!(
            MexConfig::try_from(attrs),
            Err(SimilarityError::InvalidAttribute { name: "strides", .. })
        ));
        let err = MexConfig::builder()
            .offsets_region(OffsetRegions::Shared([1, 0, 1]))
            .build()
            .unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidAttribute { name: "offsets_region", .. }));
    }

    #[test]
    fn test_region_counts_and_index() {
        let out = [2, 5, 7];
        assert_eq!(OffsetRegions::Single.num_regions(out), 1);

        let shared = OffsetRegions::Shared([1, 2, 3]);
        assert_eq!(shared.counts(out), [2, 3, 3]);
        let counts = shared.counts(out);
        assert_eq!(shared.region(counts, 0, 0, 0), 0);
        assert_eq!(shared.region(counts, 0, 1, 2), 0);
        assert_eq!(shared.region(counts, 0, 4, 6), 2 * 3 + 2);
        assert_eq!(shared.region(counts, 1, 2, 3), 9 + 3 + 1);

        let unshared = OffsetRegions::Unshared([1, 2, 2]);
        let counts = unshared.counts(out);
        assert_eq!(unshared.num_regions(out), 4);
        assert_eq!(unshared.region(counts, 1, 0, 0), 0);
        assert_eq!(unshared.region(counts, 0, 3, 4), 2);
        assert_eq!(unshared.region(counts, 0, 4, 5), 1);
    }

    #[test]
    fn test_json_keeps_infinite_epsilon() {
        let c = MexConfig::builder()
            .blocks(2, 3, 3)
            .strides(2, 1, 1)
            .padding(Padding::Same)
            .epsilon(f64::INFINITY)
            .offsets_region(OffsetRegions::Unshared([1, 2, 2]))
            .build()
            .unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains(r#""epsilon":"inf""#), "{json}");
        assert!(json.contains(r#""offsets_region":{"unshared":[1,2,2]}"#), "{json}");
        let back: MexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);

        let c: MexConfig = serde_json::from_str(r#"{"blocks": [1, 2, 2], "offsets_region": "single"}"#).unwrap();
        assert_eq!(c.blocks(), [1, 2, 2]);
        assert!(serde_json::from_str::<MexConfig>(r#"{"epsilon": 0.0}"#).is_err());
    }
}
