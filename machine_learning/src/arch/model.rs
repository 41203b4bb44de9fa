use ndarray::Array4;

use super::{LayerKind, NORM_LAYERS, Submodule};
use crate::{Result, params::ParamStore};

/// A trainable network as seen by a training loop.
pub trait Model {
    /// Whatever the forward pass yields; its gradient has the same type.
    type Output;

    /// Switches between training (batch statistics, caches) and evaluation mode.
    fn set_train(&mut self, train: bool);

    fn is_training(&self) -> bool;

    /// Every node of the network, in traversal order.
    ///
    /// A tensor may be listed by more than one node when it is shared.
    fn submodules(&self) -> Vec<Submodule>;

    /// The layer kinds this model treats as normalization layers.
    fn norm_kinds(&self) -> &[LayerKind] {
        NORM_LAYERS
    }

    fn params(&self) -> &ParamStore;

    fn params_mut(&mut self) -> &mut ParamStore;

    /// Runs the network over a batch of images shaped `[B, C, H, W]`.
    fn forward(&mut self, x: Array4<f32>) -> Result<Self::Output>;

    /// Backpropagates `d`, the gradient of the loss with respect to the last
    /// forward output, multiplied by `loss_scale`.
    ///
    /// Gradients are **added** to the ones already held by the parameters.
    fn backward(&mut self, d: Self::Output, loss_scale: f32) -> Result<()>;
}
