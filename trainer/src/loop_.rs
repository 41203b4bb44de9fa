use std::{sync::Arc, time::Instant};

use log::{debug, info};
use machine_learning::{
    Batch,
    arch::{Model, loss::Loss},
    optimization::{GroupedParams, Optimizer, Sgd, clip_grad_norm, group_model_params},
    precision::{GradScaler, Precision},
    schedule::{LambdaLr, Warmup},
};

use crate::{
    Result, TrainErr, TrainingConfig, Validator,
    data::{DataLoader, for_each_batch},
    metrics::TrainMetrics,
    observer::{BatchReport, NoopObserver, TrainObserver},
    progress::{Progress, describe, header},
    state::StepState,
};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    EpochRunning(usize),
    BatchRunning { epoch: usize, batch: usize },
    Validating(usize),
    Done,
}

/// Everything a single training iteration touches.
///
/// Kept apart from the loader and the validator so that batches can be
/// produced while a step borrows this mutably.
struct StepRunner<M, L> {
    cfg: Arc<TrainingConfig>,
    model: M,
    loss: L,
    optimizer: Sgd,
    scheduler: LambdaLr,
    precision: Box<dyn Precision>,
    warmup: Warmup,
    state: StepState,
    metrics: TrainMetrics,
    observer: Box<dyn TrainObserver>,
    phase: Phase,
    nb: usize,
}

impl<M, L> StepRunner<M, L>
where
    M: Model,
    L: Loss<M::Output>,
{
    fn begin_epoch(&mut self, epoch: usize) {
        self.phase = Phase::EpochRunning(epoch);
        self.model.set_train(true);
        self.observer.on_epoch_start(epoch);
    }

    fn step(&mut self, epoch: usize, i: usize, batch: Batch, progress: &Progress) -> Result<()> {
        let ni = i + self.nb * epoch;
        self.phase = Phase::BatchRunning { epoch, batch: i };
        self.state.ni = ni;

        if self.warmup.contains(ni) {
            let factor = self.scheduler.factor(epoch);
            self.state.accumulate = self.warmup.apply(ni, factor, &mut self.optimizer);
        }

        let mut x = batch.normalized();
        self.precision.autocast(&mut x);
        let preds = self.model.forward(x)?;
        let out = self.loss.compute(&preds, &batch)?;
        let tloss = self.state.update_loss(i, &out.items)?.clone();

        self.model.backward(out.grad, self.precision.loss_scale())?;

        if self.state.should_step(ni) {
            self.optimizer_step(ni)?;
        }

        self.metrics.bump_batch(batch.len());
        progress.advance(describe(
            epoch,
            self.cfg.epochs,
            &tloss,
            batch.instances(),
            batch.img_size(),
        ));

        self.observer.on_batch_end(&BatchReport {
            epoch,
            batch: i,
            ni,
            accumulate: self.state.accumulate,
            groups: self.optimizer.param_groups(),
            tloss: &tloss,
            instances: batch.instances(),
            img_size: batch.img_size(),
        });

        Ok(())
    }

    fn optimizer_step(&mut self, ni: usize) -> Result<()> {
        let params = self.model.params_mut();

        self.precision.unscale(params)?;
        let norm = clip_grad_norm(params, self.cfg.hyp.max_grad_norm)?;
        let stepped = self.precision.step(&mut self.optimizer, params)?;
        self.precision.update();
        params.zero_grad();

        debug!(ni = ni, grad_norm = norm, stepped = stepped; "optimizer step");

        self.state.mark_step(ni);
        self.metrics.record_step(stepped);
        self.observer.on_optimizer_step(ni, stepped);

        Ok(())
    }

    fn end_epoch(&mut self, epoch: usize) {
        self.scheduler.step(&mut self.optimizer);

        let tloss = self.state.tloss();
        self.metrics
            .epoch_losses
            .push(tloss.map(|t| t.to_vec()).unwrap_or_default());
        self.metrics.bump_epoch();
        self.observer.on_epoch_end(epoch, tloss);
    }
}

/// Trains a single detection model.
///
/// Each epoch puts the model in training mode, closes mosaic augmentation
/// when `close_mosaic` epochs are left, runs every batch through warmup,
/// forward, loss, backward and (every `accumulate` iterations) a clipped
/// optimizer step, then steps the learning rate schedule and validates once.
pub struct TrainingLoop<M, L, D, V> {
    runner: StepRunner<M, L>,
    train_loader: D,
    validator: V,
}

impl<M, L, D, V> TrainingLoop<M, L, D, V>
where
    M: Model,
    L: Loss<M::Output>,
    D: DataLoader,
    V: Validator<M>,
{
    /// Creates a new `TrainingLoop`.
    ///
    /// Groups the model's parameters, builds the optimizer, the epoch schedule
    /// (applying the epoch `0` learning rate), the warmup ramp and the gradient
    /// scaler (enabled by `cfg.amp`).
    ///
    /// # Arguments
    /// * `cfg` - The run configuration, shared with the validator.
    /// * `model` - The network to train.
    /// * `loss` - The criterion.
    /// * `train_loader` - The training batches.
    /// * `validator` - Run once after every epoch.
    ///
    /// # Errors
    /// If the config is invalid, the loader is empty or the optimizer cannot
    /// be built.
    pub fn new(
        cfg: Arc<TrainingConfig>,
        model: M,
        loss: L,
        train_loader: D,
        validator: V,
    ) -> Result<Self> {
        cfg.validate()?;

        let nb = train_loader.len();
        if nb == 0 {
            return Err(TrainErr::Data(
                "the training loader yields no batches".to_string(),
            ));
        }

        let grouped = group_model_params(&model)?;
        log_groups(&cfg, &grouped);

        let mut optimizer = Sgd::new(grouped, model.params(), cfg.sgd())?;
        let scheduler = LambdaLr::new(cfg.lr_lambda(), &mut optimizer);
        let warmup = Warmup::new(cfg.warmup(), nb);
        let state = StepState::new(warmup.base_accumulate());
        let scaler = GradScaler::new(cfg.amp);
        debug!(amp = scaler.is_enabled(), scale = scaler.scale(); "gradient scaler ready");
        let precision: Box<dyn Precision> = Box::new(scaler);

        Ok(Self {
            runner: StepRunner {
                cfg,
                model,
                loss,
                optimizer,
                scheduler,
                precision,
                warmup,
                state,
                metrics: TrainMetrics::default(),
                observer: Box::new(NoopObserver),
                phase: Phase::Idle,
                nb,
            },
            train_loader,
            validator,
        })
    }

    /// Replaces the observer notified of training events.
    pub fn with_observer<O: TrainObserver + 'static>(mut self, observer: O) -> Self {
        self.runner.observer = Box::new(observer);
        self
    }

    /// Replaces the precision strategy picked from `cfg.amp`.
    pub fn with_precision<P: Precision + 'static>(mut self, precision: P) -> Self {
        self.runner.precision = Box::new(precision);
        self
    }

    /// Runs every epoch.
    ///
    /// # Returns
    /// The metrics of the run.
    ///
    /// # Errors
    /// The first error raised by the model, the loss, the loader, the
    /// validator or an optimizer step. Nothing is retried.
    pub fn fit(&mut self) -> Result<TrainMetrics> {
        let cfg = Arc::clone(&self.runner.cfg);
        let nb = self.runner.nb;
        let close_at = cfg.close_mosaic_epoch();

        info!(
            epochs = cfg.epochs,
            batches = nb,
            batch_size = self.train_loader.batch_size(),
            warmup_iters = self.runner.warmup.horizon(),
            accumulate = self.runner.state.accumulate;
            "starting training"
        );

        for epoch in 0..cfg.epochs {
            let start = Instant::now();
            self.runner.begin_epoch(epoch);

            if close_at == Some(epoch) {
                self.close_mosaic(epoch);
            }

            self.runner.model.params_mut().zero_grad();
            self.runner.state.reset_epoch();

            let progress = Progress::new(nb, cfg.verbose);
            progress.println(header(self.runner.loss.names()));

            let runner = &mut self.runner;
            for_each_batch(self.train_loader.batches(), cfg.prefetch, |i, batch| {
                runner.step(epoch, i, batch, &progress)
            })?;
            progress.finish();

            self.runner.end_epoch(epoch);
            self.runner.metrics.train_time += start.elapsed();

            self.runner.phase = Phase::Validating(epoch);
            let start = Instant::now();
            self.validator.validate(&mut self.runner.model)?;
            self.runner.metrics.val_time += start.elapsed();

            debug!(epoch = epoch, lr = self.lr(); "epoch done");
        }

        self.runner.phase = Phase::Done;

        let metrics = &self.runner.metrics;
        info!(
            epochs = metrics.epochs,
            optimizer_steps = metrics.optimizer_steps,
            skipped_steps = metrics.skipped_steps;
            "training finished"
        );

        Ok(metrics.clone())
    }

    fn close_mosaic(&mut self, epoch: usize) {
        info!(epoch = epoch; "closing dataloader mosaic");

        let Some(mosaic) = self.train_loader.mosaic() else {
            debug!(epoch = epoch; "training data has no mosaic augmentation");
            return;
        };

        mosaic.set_mosaic(false);
        mosaic.close_mosaic(&self.runner.cfg);
        self.runner.observer.on_mosaic_closed(epoch);
    }

    /// The learning rate of the first parameter group.
    fn lr(&self) -> f32 {
        self.runner
            .optimizer
            .param_groups()
            .first()
            .map(|g| g.lr)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        self.runner.phase
    }

    pub fn model(&self) -> &M {
        &self.runner.model
    }

    pub fn optimizer(&self) -> &Sgd {
        &self.runner.optimizer
    }

    pub fn state(&self) -> &StepState {
        &self.runner.state
    }

    pub fn metrics(&self) -> &TrainMetrics {
        &self.runner.metrics
    }

    /// The last iteration of the warmup ramp.
    pub fn warmup_horizon(&self) -> usize {
        self.runner.warmup.horizon()
    }

    pub fn train_loader(&self) -> &D {
        &self.train_loader
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Hands back the trained model.
    pub fn into_model(self) -> M {
        self.runner.model
    }
}

fn log_groups(cfg: &TrainingConfig, grouped: &GroupedParams) {
    info!(
        "optimizer: SGD(lr={}, momentum={}, nesterov={}) with parameter groups {} weight(decay=0.0), {} weight(decay={}), {} bias(decay=0.0)",
        cfg.hyp.lr0,
        cfg.hyp.momentum,
        cfg.hyp.nesterov,
        grouped.norm_weights.len(),
        grouped.weights.len(),
        cfg.hyp.weight_decay,
        grouped.biases.len(),
    );
}
