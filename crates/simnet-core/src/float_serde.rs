//! Serde helpers that keep non-finite floats in JSON.
//!
//! Finite values stay plain numbers. NaN and the infinities, which JSON
//! cannot represent, are written as the strings `"NaN"`, `"inf"` and
//! `"-inf"`. Use with `#[serde(with = "simnet_core::float_serde")]` on a
//! scalar field or `#[serde(with = "simnet_core::float_serde::seq")]` on a
//! `Vec`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dtype::Float;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Encoded<T> {
    Number(T),
    Special(String),
}

impl<T: Float> Encoded<T> {
    fn from_value(v: T) -> Self {
        if v.is_finite() {
            Encoded::Number(v)
        } else if v.is_nan() {
            Encoded::Special("NaN".to_string())
        } else if v > T::ZERO {
            Encoded::Special("inf".to_string())
        } else {
            Encoded::Special("-inf".to_string())
        }
    }

    fn into_value(self) -> Result<T, String> {
        match self {
            Encoded::Number(v) => Ok(v),
            Encoded::Special(s) => match s.to_ascii_lowercase().as_str() {
                "nan" => Ok(T::from_f64(f64::NAN)),
                "inf" | "+inf" | "infinity" => Ok(T::from_f64(f64::INFINITY)),
                "-inf" | "-infinity" => Ok(T::from_f64(f64::NEG_INFINITY)),
                _ => Err(format!("expected a number, \"NaN\", \"inf\" or \"-inf\", got {s:?}")),
            },
        }
    }
}

pub fn serialize<T: Float, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    Encoded::from_value(*value).serialize(serializer)
}

pub fn deserialize<'de, T: Float, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
    Encoded::<T>::deserialize(deserializer)?
        .into_value()
        .map_err(D::Error::custom)
}

/// Element-wise variant for `Vec<T>` fields.
pub mod seq {
    use super::*;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<T: Float, S: Serializer>(values: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| Encoded::from_value(v)))
    }

    pub fn deserialize<'de, T: Float, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<T>, D::Error> {
        Vec::<Encoded<T>>::deserialize(deserializer)?
            .into_iter()
            .map(|e| e.into_value().map_err(D::Error::custom))
            .collect()
    }
}
