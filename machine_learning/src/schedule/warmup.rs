use crate::optimization::Optimizer;

/// Piecewise linear interpolation of `x` over the segment `xp -> fp`, clamped
/// to the end values outside of it.
///
/// A degenerate segment (`xp[0] == xp[1]`) yields `fp[1]` at its single point.
pub fn interp(x: f32, xp: [f32; 2], fp: [f32; 2]) -> f32 {
    if x >= xp[1] {
        fp[1]
    } else if x <= xp[0] {
        fp[0]
    } else {
        fp[0] + (x - xp[0]) * (fp[1] - fp[0]) / (xp[1] - xp[0])
    }
}

/// Knobs of the warmup ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmupConfig {
    pub warmup_epochs: f32,
    /// Lower bound on the warmup length, in iterations.
    pub min_iters: usize,
    /// Nominal batch size gradients get accumulated up to.
    pub nbs: usize,
    pub batch_size: usize,
    /// Starting learning rate of the bias group.
    pub warmup_bias_lr: f32,
    pub warmup_momentum: f32,
    /// The momentum reached at the end of the ramp.
    pub momentum: f32,
}

/// Ramps accumulation, learning rates and momentum during the first
/// iterations of a run.
///
/// Everything it sets is a pure function of the global iteration, so it can be
/// reapplied at any point of the ramp.
#[derive(Debug, Clone)]
pub struct Warmup {
    cfg: WarmupConfig,
    horizon: usize,
}

impl Warmup {
    /// Creates the ramp for a loader yielding `batches_per_epoch` batches.
    ///
    /// The ramp lasts `max(round(warmup_epochs * batches_per_epoch), min_iters)`
    /// iterations, rounding half to even.
    pub fn new(cfg: WarmupConfig, batches_per_epoch: usize) -> Self {
        let iters = (cfg.warmup_epochs * batches_per_epoch as f32).round_ties_even();
        let horizon = (iters.max(0.0) as usize).max(cfg.min_iters);

        Self { cfg, horizon }
    }

    /// The last iteration inside the ramp.
    #[inline]
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    #[inline]
    pub fn contains(&self, ni: usize) -> bool {
        ni <= self.horizon
    }

    fn nominal_ratio(&self) -> f32 {
        self.cfg.nbs as f32 / self.cfg.batch_size.max(1) as f32
    }

    /// The accumulation interval once the ramp is over.
    pub fn base_accumulate(&self) -> usize {
        (self.nominal_ratio().round_ties_even() as usize).max(1)
    }

    /// The accumulation interval at iteration `ni` of the ramp.
    pub fn accumulate(&self, ni: usize) -> usize {
        let xi = [0.0, self.horizon as f32];
        let acc = interp(ni as f32, xi, [1.0, self.nominal_ratio()]).round_ties_even();
        (acc as usize).max(1)
    }

    /// Sets the learning rate and momentum of every group for iteration `ni`.
    ///
    /// # Arguments
    /// * `ni` - The global iteration, inside the ramp.
    /// * `factor` - The epoch learning rate multiplier the ramp ends at.
    /// * `optimizer` - Whose groups get updated; group `0` starts from
    ///   `warmup_bias_lr`, the rest from `0`.
    ///
    /// # Returns
    /// The accumulation interval for `ni`.
    pub fn apply(&self, ni: usize, factor: f32, optimizer: &mut dyn Optimizer) -> usize {
        let xi = [0.0, self.horizon as f32];
        let x = ni as f32;

        for (j, group) in optimizer.param_groups_mut().iter_mut().enumerate() {
            let start = if j == 0 { self.cfg.warmup_bias_lr } else { 0.0 };
            group.lr = interp(x, xi, [start, group.initial_lr * factor]);

            if let Some(momentum) = group.momentum.as_mut() {
                *momentum = interp(x, xi, [self.cfg.warmup_momentum, self.cfg.momentum]);
            }
        }

        self.accumulate(ni)
    }
}
