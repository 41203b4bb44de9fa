use std::{env, sync::Arc};

use anyhow::Context;
use log::info;
use machine_learning::arch::Model;
use trainer::{
    BatchLoader, TrainingConfig, TrainingLoop,
    synthetic::{
        DetectionLoss, LossGains, LossValidator, SyntheticDataset, SyntheticSpec, TinyDetector,
    },
};

const CHANNELS: usize = 3;
const HIDDEN: usize = 16;
const NC: usize = 4;
const MAX_LABELS: usize = 4;
const TRAIN_SAMPLES: usize = 256;
const VAL_SAMPLES: usize = 64;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = match env::args().nth(1) {
        Some(path) => TrainingConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => TrainingConfig {
            epochs: 5,
            close_mosaic: 2,
            imgsz: 32,
            ..Default::default()
        },
    };
    let cfg = Arc::new(cfg);

    let spec = |len, seed| SyntheticSpec {
        len,
        channels: CHANNELS,
        imgsz: cfg.imgsz,
        nc: NC,
        max_labels: MAX_LABELS,
        seed,
    };

    let train = SyntheticDataset::new(spec(TRAIN_SAMPLES, cfg.seed), true)?;
    let val = SyntheticDataset::new(spec(VAL_SAMPLES, cfg.seed.wrapping_add(1)), false)?;

    let train_loader = BatchLoader::new(train, cfg.batch_size, true, cfg.seed);
    let val_loader = BatchLoader::new(val, cfg.batch_size, false, cfg.seed);

    let gains = LossGains::default();
    let validator = LossValidator::new(Arc::clone(&cfg), DetectionLoss::new(NC, gains), val_loader);
    let model = TinyDetector::new(CHANNELS, HIDDEN, NC, cfg.seed);

    let mut training = TrainingLoop::new(
        Arc::clone(&cfg),
        model,
        DetectionLoss::new(NC, gains),
        train_loader,
        validator,
    )?;

    let metrics = training.fit()?;

    info!(
        epochs = metrics.epochs,
        samples = metrics.samples,
        optimizer_steps = metrics.optimizer_steps,
        skipped_steps = metrics.skipped_steps,
        train_secs = metrics.train_time.as_secs_f32(),
        val_secs = metrics.val_time.as_secs_f32();
        "run summary"
    );

    if let Some(last) = training.validator().history().last() {
        info!("final validation loss {last}");
    }

    let model = training.into_model();
    info!(
        params = model.params().num_learnable(),
        training = model.is_training();
        "trained model ready"
    );

    Ok(())
}
