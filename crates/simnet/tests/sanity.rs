use approx::assert_abs_diff_eq;
use simnet::io::{load_bundle, load_config, save_bundle, save_config, TensorBundle};
use simnet::prelude::*;
use tempfile::tempdir;

#[test]
fn forward_matches_reference_on_large_input() {
    let config = SimilarityConfig::builder()
        .ksize(3, 3)
        .strides(2, 1)
        .padding(Padding::Same)
        .build()
        .unwrap();
    let input: Tensor<f32> = Tensor::randn(vec![1, 3, 800, 800], Some(2024));
    let layer: SimilarityLayer<f32> = SimilarityLayer::init(config, 3, 1, 7);

    let fast = layer.forward(&input).unwrap();
    let slow = layer.forward_reference(&input).unwrap();
    assert_eq!(fast.shape_vec(), vec![1, 1, 400, 800]);
    assert!(
        fast.allclose(&slow, 1e-4, 1e-4),
        "max diff {}",
        fast.max_abs_diff(&slow).unwrap()
    );
}

#[test]
fn mean_loss_input_gradient_is_negative() {
    // ones against zero templates: every covered input pulls the L2 score down
    let config = SimilarityConfig::builder()
        .ksize(3, 3)
        .strides(2, 2)
        .build()
        .unwrap();
    let layer = SimilarityLayer::new(
        config,
        Tensor::<f64>::zeros(vec![1, 1, 3, 3]),
        Tensor::<f64>::ones(vec![1, 1, 3, 3]),
    )
    .unwrap();
    let input: Tensor<f64> = Tensor::ones(vec![1, 1, 30, 30]);
    let out = layer.forward(&input).unwrap();
    let upstream = Tensor::full(out.shape_vec(), 1.0 / out.numel() as f64);
    let (d_input, d_templates, d_weights) = layer.backward(&input, &upstream).unwrap().into_parts();

    assert!(d_input.data().iter().all(|&g| g < 0.0));

    // 15 windows per axis starting at 0, 2, .., 28; kernel offset 2 of the
    // last window reads the zero padding at 30, so that offset sees an
    // in-bounds one in 14 of 15 windows.
    let in_bounds = |k: usize| if k == 2 { 14.0 / 15.0 } else { 1.0 };
    for ky in 0..3 {
        for kx in 0..3 {
            let fraction = in_bounds(ky) * in_bounds(kx);
            // mean of 2 (x - z) w and of -(x - z)² with x = 1 in bounds, 0 outside
            assert_abs_diff_eq!(d_templates.get(&[0, 0, ky, kx]).unwrap(), 2.0 * fraction, epsilon = 1e-12);
            assert_abs_diff_eq!(d_weights.get(&[0, 0, ky, kx]).unwrap(), -fraction, epsilon = 1e-12);
        }
    }
    assert_abs_diff_eq!(d_templates.get(&[0, 0, 2, 2]).unwrap(), 2.0 * (14.0f64 / 15.0).powi(2), epsilon = 1e-12);
}

#[test]
fn mex_matches_reference_with_shared_regions() {
    let config = MexConfig::builder()
        .blocks(3, 3, 3)
        .strides(3, 2, 2)
        .padding(Padding::Same)
        .epsilon(4.0)
        .offsets_region(OffsetRegions::Shared([1, 25, 25]))
        .build()
        .unwrap();
    let input: Tensor<f32> = Tensor::randn(vec![1, 6, 100, 100], Some(11));
    // grid is (2, 50, 50): 2 x 2 x 2 regions, 4 instances
    let offsets: Tensor<f32> = Tensor::randn(vec![8, 4, 3, 3, 3], Some(12));

    let fast = mex(&input, &offsets, &config).unwrap();
    let slow = mex_ref(&input, &offsets, &config).unwrap();
    assert_eq!(fast.shape_vec(), vec![1, 8, 50, 50]);
    assert!(fast.allclose(&slow, 1e-5, 1e-5));
}

#[test]
fn persisted_layer_reproduces_output() {
    let config = SimilarityConfig::builder()
        .ksize(2, 3)
        .strides(1, 2)
        .similarity_function(SimilarityFunction::L1)
        .normalization_term(true)
        .build()
        .unwrap();
    let layer: SimilarityLayer<f64> = SimilarityLayer::init(config, 2, 3, 99);
    let input: Tensor<f64> = Tensor::randn(vec![2, 2, 9, 9], Some(100));

    let dir = tempdir().unwrap();
    save_config(layer.config(), dir.path().join("config.json")).unwrap();
    let mut bundle = TensorBundle::new();
    bundle.add("templates", layer.templates());
    bundle.add("weights", layer.weights());
    save_bundle(&bundle, dir.path().join("params.json")).unwrap();

    let bundle: TensorBundle<f64> = load_bundle(dir.path().join("params.json")).unwrap();
    let restored = SimilarityLayer::new(
        load_config::<SimilarityConfig>(dir.path().join("config.json")).unwrap(),
        bundle.get("templates").unwrap(),
        bundle.get("weights").unwrap(),
    )
    .unwrap();
    assert_eq!(restored.forward(&input).unwrap(), layer.forward(&input).unwrap());
}
