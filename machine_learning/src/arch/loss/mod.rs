mod loss_fn;
mod mse;
mod smooth_l1;

use ndarray::Array1;

pub use loss_fn::LossFn;
pub use mse::Mse;
pub use smooth_l1::SmoothL1;

use crate::{Result, dataset::Batch};

/// What a detection loss hands back for one batch.
#[derive(Debug, Clone)]
pub struct LossOutput<P> {
    /// The scalar to backpropagate.
    pub loss: f32,
    /// Detached per-component values, ordered as `Loss::names`.
    pub items: Array1<f32>,
    /// Gradient of `loss` with respect to the predictions.
    pub grad: P,
}

/// A multi-component loss evaluated on model predictions of type `P`.
pub trait Loss<P> {
    /// The names of the loss components, e.g. `box_loss`.
    fn names(&self) -> &[&'static str];

    /// Computes the loss of `preds` against the labels in `batch`.
    fn compute(&mut self, preds: &P, batch: &Batch) -> Result<LossOutput<P>>;
}
