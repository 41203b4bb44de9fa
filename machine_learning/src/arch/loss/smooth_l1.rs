use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// Huber-style loss: quadratic below `beta`, linear above it.
#[derive(Debug, Clone, Copy)]
pub struct SmoothL1 {
    beta: f32,
}

impl SmoothL1 {
    pub fn new(beta: f32) -> Self {
        Self { beta }
    }
}

impl Default for SmoothL1 {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LossFn for SmoothL1 {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let beta = self.beta;

        (&y_pred - &y)
            .mapv(|d| {
                let a = d.abs();
                if a < beta { 0.5 * d * d / beta } else { a - 0.5 * beta }
            })
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let beta = self.beta;
        let n = y_pred.len().max(1) as f32;

        (&y_pred - &y).mapv(|d| {
            let g = if d.abs() < beta { d / beta } else { d.signum() };
            g / n
        })
    }
}
