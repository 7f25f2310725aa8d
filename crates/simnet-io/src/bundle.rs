use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simnet_core::{Float, Tensor};
use tracing::debug;

use crate::error::{IoError, IoResult};

/// One stored tensor: name, shape, flat row-major data. NaN and infinite
/// elements are stored as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct NamedTensor<T: Float> {
    pub name: String,
    pub shape: Vec<usize>,
    #[serde(with = "simnet_core::float_serde::seq")]
    pub data: Vec<T>,
}

impl<T: Float> NamedTensor<T> {
    pub fn to_tensor(&self) -> IoResult<Tensor<T>> {
        Ok(Tensor::new(self.data.clone(), self.shape.clone())?)
    }
}

/// Ordered collection of named tensors, e.g. a layer's templates and weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct TensorBundle<T: Float> {
    pub tensors: Vec<NamedTensor<T>>,
}

impl<T: Float> TensorBundle<T> {
    pub fn new() -> Self {
        TensorBundle {
            tensors: Vec::new(),
        }
    }

    /// Insert or replace `name`. Order of first insertion is kept.
    pub fn add(&mut self, name: &str, tensor: &Tensor<T>) {
        let entry = NamedTensor {
            name: name.to_string(),
            shape: tensor.shape_vec(),
            data: tensor.data().to_vec(),
        };
        match self.tensors.iter_mut().find(|t| t.name == name) {
            Some(slot) => *slot = entry,
            None => self.tensors.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> IoResult<Tensor<T>> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| IoError::MissingTensor(name.to_string()))?
            .to_tensor()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl<T: Float> Default for TensorBundle<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Save a bundle to a JSON file.
pub fn save_bundle<T: Float>(bundle: &TensorBundle<T>, path: impl AsRef<Path>) -> IoResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(bundle)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), tensors = bundle.len(), "saved tensor bundle");
    Ok(())
}

/// Load a bundle from a JSON file. Every entry is checked against its shape.
pub fn load_bundle<T: Float>(path: impl AsRef<Path>) -> IoResult<TensorBundle<T>> {
    let json = fs::read_to_string(path.as_ref())?;
    let bundle: TensorBundle<T> = serde_json::from_str(&json)?;
    for entry in &bundle.tensors {
        entry.to_tensor()?;
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simnet_core::TensorError;
    use simnet_similarity::{SimilarityConfig, SimilarityLayer};
    use tempfile::tempdir;

    #[test]
    fn test_layer_parameters_round_trip() {
        let config = SimilarityConfig::builder().ksize(3, 3).build().unwrap();
        let layer: SimilarityLayer<f32> = SimilarityLayer::init(config.clone(), 2, 4, 9);
        let mut bundle = TensorBundle::new();
        bundle.add("templates", layer.templates());
        bundle.add("weights", layer.weights());

        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");
        save_bundle(&bundle, &path).unwrap();
        let loaded: TensorBundle<f32> = load_bundle(&path).unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["templates", "weights"]);

        let restored = SimilarityLayer::new(
            config,
            loaded.get("templates").unwrap(),
            loaded.get("weights").unwrap(),
        )
        .unwrap();
        let (templates, weights) = layer.into_parameters();
        let (restored_templates, restored_weights) = restored.into_parameters();
        assert_eq!(restored_templates, templates);
        assert_eq!(restored_weights, weights);
    }

    #[test]
    fn test_f64_round_trip_is_bit_exact() {
        let tensor: Tensor<f64> = Tensor::randn(vec![50, 50], Some(5));
        let mut bundle = TensorBundle::new();
        bundle.add("x", &tensor);

        let dir = tempdir().unwrap();
        let path = dir.path().join("f64.json");
        save_bundle(&bundle, &path).unwrap();
        let loaded = load_bundle::<f64>(&path).unwrap().get("x").unwrap();
        assert_eq!(loaded.shape(), tensor.shape());
        for (i, (a, b)) in loaded.data().iter().zip(tensor.data()).enumerate() {
            assert_eq!(a.to_bits(), b.to_bits(), "element {i}: {a} vs {b}");
        }
    }

    #[test]
    fn test_non_finite_elements_round_trip() {
        let tensor = Tensor::new(vec![f64::NAN, 1.25, f64::INFINITY, f64::NEG_INFINITY], vec![2, 2]).unwrap();
        let mut bundle = TensorBundle::new();
        bundle.add("input", &tensor);

        let dir = tempdir().unwrap();
        let path = dir.path().join("nan.json");
        save_bundle(&bundle, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"NaN\""));
        assert!(!text.contains("null"));

        let loaded = load_bundle::<f64>(&path).unwrap().get("input").unwrap();
        let data = loaded.data();
        assert!(data[0].is_nan());
        assert_eq!(data[1], 1.25);
        assert_eq!(data[2], f64::INFINITY);
        assert_eq!(data[3], f64::NEG_INFINITY);
    }

    #[test]
    fn test_add_replaces_existing_name() {
        let mut bundle: TensorBundle<f64> = TensorBundle::new();
        bundle.add("a", &Tensor::zeros(vec![2]));
        bundle.add("b", &Tensor::ones(vec![1]));
        bundle.add("a", &Tensor::ones(vec![3]));
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("a").unwrap(), Tensor::ones(vec![3]));
        assert!(matches!(bundle.get("c"), Err(IoError::MissingTensor(name)) if name == "c"));
    }

    #[test]
    fn test_load_rejects_inconsistent_tensor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(
            &path,
            r#"{"tensors": [{"name": "w", "shape": [2, 2], "data": [1.0, 2.0, 3.0]}]}"#,
        )
        .unwrap();
        let err = load_bundle::<f64>(&path).unwrap_err();
        assert!(matches!(
            err,
            IoError::Tensor(TensorError::DataLength { len: 3, numel: 4, .. })
        ));
    }
}
