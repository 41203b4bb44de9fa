use std::{fs, path::Path};

use machine_learning::{
    optimization::SgdConfig,
    schedule::{LrLambda, WarmupConfig},
};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Detect,
    Segment,
    Classify,
    Pose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Val,
    Predict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    #[default]
    Val,
    Test,
}

/// Optimization hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Hyperparameters {
    pub lr0: f32,
    /// Final learning rate, as a fraction of `lr0`.
    pub lrf: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    pub nesterov: bool,
    pub warmup_epochs: f32,
    pub warmup_min_iters: usize,
    pub warmup_momentum: f32,
    pub warmup_bias_lr: f32,
    pub max_grad_norm: f32,
    pub cos_lr: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            lr0: 0.01,
            lrf: 0.01,
            momentum: 0.937,
            weight_decay: 5e-4,
            nesterov: true,
            warmup_epochs: 3.0,
            warmup_min_iters: 100,
            warmup_momentum: 0.8,
            warmup_bias_lr: 0.1,
            max_grad_norm: 10.0,
            cos_lr: false,
        }
    }
}

/// Everything a training run needs to know, fixed once the run starts.
///
/// The first block of fields is what the validator reads; the rest drives the
/// training loop itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub data: String,
    pub imgsz: usize,
    pub iou: f32,
    pub single_cls: bool,
    pub max_det: usize,
    pub task: Task,
    pub mode: Mode,
    pub split: Split,
    pub half: bool,
    pub project: Option<String>,
    pub name: Option<String>,
    pub save_txt: bool,
    pub conf: Option<f32>,
    pub save_hybrid: bool,
    pub save_json: bool,
    pub plots: bool,
    pub verbose: bool,

    pub epochs: usize,
    pub batch_size: usize,
    /// Nominal batch size.
    pub nbs: usize,
    /// Amount of final epochs trained without mosaic augmentation.
    pub close_mosaic: usize,
    /// Mixed precision with loss scaling.
    pub amp: bool,
    /// Batches loaded ahead of the training step, `0` loads inline.
    pub prefetch: usize,
    pub seed: u64,
    pub hyp: Hyperparameters,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data: "coco.yaml".to_string(),
            imgsz: 640,
            iou: 0.7,
            single_cls: false,
            max_det: 300,
            task: Task::Detect,
            mode: Mode::Train,
            split: Split::Val,
            half: false,
            project: None,
            name: None,
            save_txt: false,
            conf: None,
            save_hybrid: false,
            save_json: false,
            plots: false,
            verbose: true,
            epochs: 100,
            batch_size: 16,
            nbs: 64,
            close_mosaic: 10,
            amp: false,
            prefetch: 0,
            seed: 0,
            hyp: Hyperparameters::default(),
        }
    }
}

impl TrainingConfig {
    /// Parses and validates a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    /// `TrainErr::Json` on malformed input or unknown fields,
    /// `TrainErr::InvalidConfig` if a value is out of range.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads `path` and parses it with `from_json_str`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    /// Checks every value is usable.
    pub fn validate(&self) -> Result<()> {
        let hyp = &self.hyp;

        let checks = [
            (self.epochs == 0, "epochs must be at least 1"),
            (self.batch_size == 0, "batch_size must be at least 1"),
            (self.nbs == 0, "nbs must be at least 1"),
            (self.imgsz == 0, "imgsz must be at least 1"),
            (!(0.0..=1.0).contains(&self.iou), "iou must be in [0, 1]"),
            (
                self.conf.is_some_and(|c| !(0.0..=1.0).contains(&c)),
                "conf must be in [0, 1]",
            ),
            (!(hyp.lr0 > 0.0), "lr0 must be positive"),
            (!(hyp.lrf >= 0.0), "lrf must not be negative"),
            (
                !(0.0..1.0).contains(&hyp.momentum),
                "momentum must be in [0, 1)",
            ),
            (
                hyp.nesterov && hyp.momentum == 0.0,
                "nesterov requires a positive momentum",
            ),
            (
                !(hyp.weight_decay >= 0.0),
                "weight_decay must not be negative",
            ),
            (
                !(hyp.warmup_epochs >= 0.0),
                "warmup_epochs must not be negative",
            ),
            (
                !(0.0..1.0).contains(&hyp.warmup_momentum),
                "warmup_momentum must be in [0, 1)",
            ),
            (
                !(hyp.warmup_bias_lr >= 0.0),
                "warmup_bias_lr must not be negative",
            ),
            (
                !(hyp.max_grad_norm > 0.0),
                "max_grad_norm must be positive",
            ),
        ];

        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(TrainErr::InvalidConfig(msg.to_string())),
            None => Ok(()),
        }
    }

    /// The epoch mosaic gets turned off at, if it does at all.
    pub fn close_mosaic_epoch(&self) -> Option<usize> {
        self.epochs
            .checked_sub(self.close_mosaic)
            .filter(|&epoch| epoch < self.epochs)
    }

    pub fn sgd(&self) -> SgdConfig {
        SgdConfig {
            lr: self.hyp.lr0,
            momentum: self.hyp.momentum,
            weight_decay: self.hyp.weight_decay,
            nesterov: self.hyp.nesterov,
        }
    }

    pub fn warmup(&self) -> WarmupConfig {
        WarmupConfig {
            warmup_epochs: self.hyp.warmup_epochs,
            min_iters: self.hyp.warmup_min_iters,
            nbs: self.nbs,
            batch_size: self.batch_size,
            warmup_bias_lr: self.hyp.warmup_bias_lr,
            warmup_momentum: self.hyp.warmup_momentum,
            momentum: self.hyp.momentum,
        }
    }

    pub fn lr_lambda(&self) -> LrLambda {
        let epochs = self.epochs;
        let lrf = self.hyp.lrf;

        if self.hyp.cos_lr {
            LrLambda::Cosine { epochs, lrf }
        } else {
            LrLambda::Linear { epochs, lrf }
        }
    }
}
