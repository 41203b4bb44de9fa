use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter, Log, Metadata, Record};
use trainer::{
    BatchLoader, Dataset, Result, Sample, TrainingConfig, TrainingLoop,
    synthetic::{DetectionLoss, LossGains, SyntheticDataset, SyntheticSpec, TinyDetector},
};

struct Capture(Mutex<Vec<(Level, String)>>);

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if let Ok(mut lines) = self.0.lock() {
            lines.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

/// Synthetic images without the mosaic capability.
struct Plain(SyntheticDataset);

impl Dataset for Plain {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn get(&mut self, idx: usize) -> Result<Sample> {
        self.0.get(idx)
    }
}

#[test]
fn mosaic_close_is_logged_without_the_capability() {
    log::set_logger(&CAPTURE).unwrap();
    log::set_max_level(LevelFilter::Info);

    let spec = SyntheticSpec {
        len: 32,
        channels: 3,
        imgsz: 8,
        nc: 2,
        max_labels: 2,
        seed: 3,
    };
    let dataset = Plain(SyntheticDataset::new(spec, false).unwrap());
    let cfg = Arc::new(TrainingConfig {
        epochs: 2,
        close_mosaic: 1,
        imgsz: 8,
        verbose: false,
        ..Default::default()
    });

    let mut training = TrainingLoop::new(
        cfg,
        TinyDetector::new(3, 4, 2, 3),
        DetectionLoss::new(2, LossGains::default()),
        BatchLoader::new(dataset, 16, false, 3),
        |_: &mut TinyDetector| -> Result<()> { Ok(()) },
    )
    .unwrap();
    training.fit().unwrap();

    let lines = CAPTURE.0.lock().unwrap();
    let closes = lines
        .iter()
        .filter(|(level, msg)| *level == Level::Info && msg == "closing dataloader mosaic")
        .count();
    assert_eq!(closes, 1);
}
