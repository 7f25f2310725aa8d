use simnet_core::{Float, Tensor};

use crate::config::SimilarityConfig;
use crate::error::SimilarityResult;
use crate::forward::similarity;
use crate::grad_input::similarity_input_grad;
use crate::grad_params::similarity_parameters_grad;
use crate::plan::check_parameters;
use crate::reference::similarity_ref;

/// The three gradients of one backward call.
#[derive(Debug, Clone)]
pub struct SimilarityGradients<T: Float> {
    pub input: Tensor<T>,
    pub templates: Tensor<T>,
    pub weights: Tensor<T>,
}

impl<T: Float> SimilarityGradients<T> {
    /// `(input, templates, weights)`.
    pub fn into_parts(self) -> (Tensor<T>, Tensor<T>, Tensor<T>) {
        (self.input, self.templates, self.weights)
    }
}

/// Full backward pass: one upstream gradient in, three gradients out.
pub fn similarity_backward<T: Float>(
    input: &Tensor<T>,
    templates: &Tensor<T>,
    weights: &Tensor<T>,
    upstream: &Tensor<T>,
    config: &SimilarityConfig,
) -> SimilarityResult<SimilarityGradients<T>> {
    let d_input = similarity_input_grad(input, templates, weights, upstream, config)?;
    let (d_templates, d_weights) = similarity_parameters_grad(input, templates, weights, upstream, config)?;
    Ok(SimilarityGradients {
        input: d_input,
        templates: d_templates,
        weights: d_weights,
    })
}

/// Similarity layer.
///
/// Input shape:      [batch, in_channels, height, width]
/// Parameter shape:  [out_channels, in_channels, kH, kW] (templates and weights)
/// Output shape:     [batch, out_channels, out_h, out_w]
#[derive(Debug, Clone)]
pub struct SimilarityLayer<T: Float> {
    config: SimilarityConfig,
    templates: Tensor<T>,
    weights: Tensor<T>,
}

impl<T: Float> SimilarityLayer<T> {
    pub fn new(config: SimilarityConfig, templates: Tensor<T>, weights: Tensor<T>) -> SimilarityResult<Self> {
        check_parameters(&templates, &weights, &config)?;
        Ok(SimilarityLayer {
            config,
            templates,
            weights,
        })
    }

    /// Templates from a standard normal, weights from its absolute value.
    pub fn init(config: SimilarityConfig, in_channels: usize, out_channels: usize, seed: u64) -> Self {
        let [kernel_h, kernel_w] = config.ksize();
        let shape = vec![out_channels, in_channels, kernel_h, kernel_w];
        let templates = Tensor::<T>::randn(shape.clone(), Some(seed));
        let weights = Tensor::<T>::randn(shape, Some(seed.wrapping_add(1))).map(|w| w.abs());
        SimilarityLayer {
            config,
            templates,
            weights,
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn templates(&self) -> &Tensor<T> {
        &self.templates
    }

    pub fn weights(&self) -> &Tensor<T> {
        &self.weights
    }

    pub fn in_channels(&self) -> usize {
        self.templates.shape_vec()[1]
    }

    pub fn out_channels(&self) -> usize {
        self.templates.shape_vec()[0]
    }

    pub fn forward(&self, input: &Tensor<T>) -> SimilarityResult<Tensor<T>> {
        similarity(input, &self.templates, &self.weights, &self.config)
    }

    pub fn forward_reference(&self, input: &Tensor<T>) -> SimilarityResult<Tensor<T>> {
        similarity_ref(input, &self.templates, &self.weights, &self.config)
    }

    pub fn backward(&self, input: &Tensor<T>, upstream: &Tensor<T>) -> SimilarityResult<SimilarityGradients<T>> {
        similarity_backward(input, &self.templates, &self.weights, upstream, &self.config)
    }

    pub fn into_parameters(self) -> (Tensor<T>, Tensor<T>) {
        (self.templates, self.weights)
    }
}
