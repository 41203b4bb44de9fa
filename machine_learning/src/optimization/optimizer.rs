use super::GroupRole;
use crate::{
    Result,
    params::{ParamId, ParamStore},
};

/// A set of tensors sharing the same hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub role: GroupRole,
    pub params: Vec<ParamId>,
    /// The learning rate the next step uses.
    pub lr: f32,
    /// The learning rate the group was built with, schedules scale it.
    pub initial_lr: f32,
    pub momentum: Option<f32>,
    pub weight_decay: f32,
    pub nesterov: bool,
}

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    fn param_groups(&self) -> &[ParamGroup];

    /// The groups, writable so schedules can move `lr` and `momentum`.
    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// Updates every grouped tensor in `params` using its current gradient.
    ///
    /// # Errors
    /// If `params` is not the store the optimizer was built for.
    fn step(&mut self, params: &mut ParamStore) -> Result<()>;

    /// Zeroes the gradient of every grouped tensor.
    fn zero_grad(&self, params: &mut ParamStore) -> Result<()> {
        for group in self.param_groups() {
            for &id in &group.params {
                params.get_mut(id)?.zero_grad();
            }
        }

        Ok(())
    }
}
