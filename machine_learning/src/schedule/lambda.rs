use std::f32::consts::PI;

use crate::optimization::Optimizer;

/// Per-epoch learning rate multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrLambda {
    /// Straight line from `1` at epoch `0` down to `lrf` at `epochs`.
    Linear { epochs: usize, lrf: f32 },
    /// Half cosine from `1` at epoch `0` down to `lrf` at `epochs`.
    Cosine { epochs: usize, lrf: f32 },
}

impl LrLambda {
    /// The multiplier applied to `initial_lr` during `epoch`.
    pub fn factor(&self, epoch: usize) -> f32 {
        match *self {
            LrLambda::Linear { epochs, lrf } => {
                let x = epoch as f32 / epochs.max(1) as f32;
                (1.0 - x) * (1.0 - lrf) + lrf
            }
            LrLambda::Cosine { epochs, lrf } => {
                let x = epoch as f32 / epochs.max(1) as f32;
                ((1.0 - (x * PI).cos()) / 2.0) * (lrf - 1.0) + 1.0
            }
        }
    }
}

/// Sets every group's learning rate to `initial_lr * f(epoch)`, once per epoch.
#[derive(Debug, Clone)]
pub struct LambdaLr {
    lambda: LrLambda,
    last_epoch: usize,
}

impl LambdaLr {
    /// Creates the schedule and applies the epoch `0` learning rate.
    pub fn new(lambda: LrLambda, optimizer: &mut dyn Optimizer) -> Self {
        let scheduler = Self {
            lambda,
            last_epoch: 0,
        };

        scheduler.apply(optimizer);
        scheduler
    }

    /// Moves to the next epoch.
    pub fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.last_epoch += 1;
        self.apply(optimizer);
    }

    #[inline]
    pub fn last_epoch(&self) -> usize {
        self.last_epoch
    }

    #[inline]
    pub fn factor(&self, epoch: usize) -> f32 {
        self.lambda.factor(epoch)
    }

    fn apply(&self, optimizer: &mut dyn Optimizer) {
        let f = self.lambda.factor(self.last_epoch);

        for group in optimizer.param_groups_mut() {
            group.lr = group.initial_lr * f;
        }
    }
}
