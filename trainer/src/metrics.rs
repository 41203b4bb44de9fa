use std::time::Duration;

/// Counters gathered over a training run.
#[derive(Debug, Default, Clone)]
pub struct TrainMetrics {
    pub epochs: u64,
    pub batches: u64,
    pub optimizer_steps: u64,
    /// Steps dropped because the gradients were not finite.
    pub skipped_steps: u64,
    pub samples: u64,

    /// Final running loss of every epoch.
    pub epoch_losses: Vec<Vec<f32>>,

    pub train_time: Duration,
    pub val_time: Duration,
}

impl TrainMetrics {
    #[inline]
    pub fn bump_epoch(&mut self) {
        self.epochs += 1;
    }

    #[inline]
    pub fn bump_batch(&mut self, samples: usize) {
        self.batches += 1;
        self.samples += samples as u64;
    }

    #[inline]
    pub fn record_step(&mut self, stepped: bool) {
        if stepped {
            self.optimizer_steps += 1;
        } else {
            self.skipped_steps += 1;
        }
    }
}
