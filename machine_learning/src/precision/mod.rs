mod scaler;

use ndarray::Array4;

pub use scaler::{GradScaler, GradScalerConfig};

use crate::{Result, optimization::Optimizer, params::ParamStore};

/// How forward and backward passes deal with reduced precision.
///
/// A training step goes `autocast`, forward, backward of `loss * loss_scale()`,
/// `unscale`, clipping, `step`, `update`.
pub trait Precision {
    /// Casts the network input to the compute precision, in place.
    fn autocast(&self, x: &mut Array4<f32>);

    /// The factor the loss gets multiplied by before the backward pass.
    fn loss_scale(&self) -> f32;

    /// Divides the gradients by the loss scale.
    ///
    /// # Errors
    /// When called twice without an `update` in between.
    fn unscale(&mut self, params: &mut ParamStore) -> Result<()>;

    /// Steps `optimizer` unless the gradients overflowed.
    ///
    /// # Returns
    /// Whether the optimizer stepped.
    fn step(&mut self, optimizer: &mut dyn Optimizer, params: &mut ParamStore) -> Result<bool>;

    /// Adjusts the loss scale for the next iteration.
    fn update(&mut self);
}
