//! Central-difference helpers for the gradient tests.

use simnet_core::Tensor;

/// `Σ out · cotangent`; its gradient with respect to `out` is `cotangent`.
pub(crate) fn directional_loss(out: &Tensor<f64>, cotangent: &Tensor<f64>) -> f64 {
    out.data()
        .iter()
        .zip(cotangent.data())
        .map(|(o, p)| o * p)
        .sum()
}

/// Numerical gradient of `loss` at `point`, one element at a time.
pub(crate) fn numeric_gradient(
    point: &Tensor<f64>,
    h: f64,
    mut loss: impl FnMut(&Tensor<f64>) -> f64,
) -> Tensor<f64> {
    let mut shifted = point.clone();
    let mut grad = Tensor::zeros(point.shape_vec());
    for i in 0..point.numel() {
        let saved = point.data()[i];
        shifted.data_mut()[i] = saved + h;
        let plus = loss(&shifted);
        shifted.data_mut()[i] = saved - h;
        let minus = loss(&shifted);
        shifted.data_mut()[i] = saved;
        grad.data_mut()[i] = (plus - minus) / (2.0 * h);
    }
    grad
}

/// Panics with the first offending index when the gradients disagree.
pub(crate) fn assert_gradients_close(analytic: &Tensor<f64>, numeric: &Tensor<f64>, tol: f64) {
    assert_eq!(analytic.shape(), numeric.shape());
    for (i, (a, n)) in analytic.data().iter().zip(numeric.data()).enumerate() {
        let scale = 1.0f64.max(n.abs());
        assert!(
            (a - n).abs() <= tol * scale,
            "gradient mismatch at {i}: analytic {a}, numeric {n}"
        );
    }
}
