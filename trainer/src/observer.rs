use machine_learning::optimization::ParamGroup;
use ndarray::Array1;

/// What happened in one training iteration.
#[derive(Debug, Clone)]
pub struct BatchReport<'a> {
    pub epoch: usize,
    pub batch: usize,
    pub ni: usize,
    pub accumulate: usize,
    pub groups: &'a [ParamGroup],
    pub tloss: &'a Array1<f32>,
    pub instances: usize,
    pub img_size: usize,
}

/// Hooks into the training loop. Every hook defaults to doing nothing.
pub trait TrainObserver {
    fn on_epoch_start(&mut self, _epoch: usize) {}

    fn on_mosaic_closed(&mut self, _epoch: usize) {}

    fn on_batch_end(&mut self, _report: &BatchReport<'_>) {}

    /// Called whenever an optimizer step is attempted; `stepped` is false
    /// when it was skipped on non-finite gradients.
    fn on_optimizer_step(&mut self, _ni: usize, _stepped: bool) {}

    fn on_epoch_end(&mut self, _epoch: usize, _tloss: Option<&Array1<f32>>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrainObserver for NoopObserver {}
