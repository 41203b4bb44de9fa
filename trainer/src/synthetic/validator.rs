use std::sync::Arc;

use log::info;
use machine_learning::arch::{Model, loss::Loss};
use ndarray::{Array1, Array2};

use super::loss::mean_items;
use crate::{Result, TrainingConfig, Validator, data::DataLoader};

/// Runs the training loss over a held-out loader in evaluation mode.
pub struct LossValidator<L, D> {
    cfg: Arc<TrainingConfig>,
    loss: L,
    loader: D,
    history: Vec<Array1<f32>>,
}

impl<L, D> LossValidator<L, D> {
    pub fn new(cfg: Arc<TrainingConfig>, loss: L, loader: D) -> Self {
        Self {
            cfg,
            loss,
            loader,
            history: Vec::new(),
        }
    }

    /// The mean loss components of every validation run so far.
    pub fn history(&self) -> &[Array1<f32>] {
        &self.history
    }
}

impl<M, L, D> Validator<M> for LossValidator<L, D>
where
    M: Model<Output = Array2<f32>>,
    L: Loss<Array2<f32>>,
    D: DataLoader,
{
    fn validate(&mut self, model: &mut M) -> Result<()> {
        let was_training = model.is_training();
        model.set_train(false);

        let mut items = Vec::with_capacity(self.loader.len());
        for batch in self.loader.batches() {
            let batch = batch?;
            let preds = model.forward(batch.normalized())?;
            items.push(self.loss.compute(&preds, &batch)?.items);
        }

        model.set_train(was_training);

        let Some(mean) = mean_items(&items) else {
            return Ok(());
        };

        if self.cfg.verbose {
            let names = self.loss.names();
            for (name, value) in names.iter().zip(&mean) {
                info!(split:? = self.cfg.split, value = value; "val/{name}");
            }
        }

        self.history.push(mean);
        Ok(())
    }
}
