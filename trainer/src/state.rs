use ndarray::Array1;

use crate::{Result, TrainErr};

/// Step bookkeeping carried between batches.
///
/// The running loss is reset at the start of every epoch; the last optimizer
/// step persists for the whole run.
#[derive(Debug, Clone)]
pub struct StepState {
    /// Global iteration, `batch + batches_per_epoch * epoch`.
    pub ni: usize,
    /// Global iteration of the last optimizer step, `None` before the first.
    pub last_opt_step: Option<usize>,
    /// Iterations gradients are accumulated over before stepping.
    pub accumulate: usize,
    tloss: Option<Array1<f32>>,
}

impl StepState {
    pub fn new(accumulate: usize) -> Self {
        Self {
            ni: 0,
            last_opt_step: None,
            accumulate: accumulate.max(1),
            tloss: None,
        }
    }

    /// Returns true if the optimizer should step at iteration `ni`.
    #[inline]
    pub fn should_step(&self, ni: usize) -> bool {
        match self.last_opt_step {
            Some(last) => ni - last >= self.accumulate,
            None => ni + 1 >= self.accumulate,
        }
    }

    #[inline]
    pub fn mark_step(&mut self, ni: usize) {
        self.last_opt_step = Some(ni);
    }

    /// Folds the loss components of batch `i` into the epoch's cumulative mean.
    ///
    /// # Errors
    /// `TrainErr::Data` if `items` has a different amount of components than
    /// the batches before it.
    pub fn update_loss(&mut self, i: usize, items: &Array1<f32>) -> Result<&Array1<f32>> {
        let tloss = match self.tloss.take() {
            Some(tloss) if tloss.len() != items.len() => {
                let expected = tloss.len();
                self.tloss = Some(tloss);
                return Err(TrainErr::Data(format!(
                    "loss has {} components, expected {expected}",
                    items.len()
                )));
            }
            Some(tloss) => (tloss * i as f32 + items) / (i + 1) as f32,
            None => items.clone(),
        };

        Ok(self.tloss.insert(tloss))
    }

    /// The running loss of the current epoch, if a batch went through already.
    pub fn tloss(&self) -> Option<&Array1<f32>> {
        self.tloss.as_ref()
    }

    #[inline]
    pub fn reset_epoch(&mut self) {
        self.tloss = None;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn running_loss_is_the_mean_so_far() {
        let mut state = StepState::new(1);
        state.update_loss(0, &arr1(&[3.0, 0.0])).unwrap();
        state.update_loss(1, &arr1(&[6.0, 3.0])).unwrap();
        let tloss = state.update_loss(2, &arr1(&[0.0, 6.0])).unwrap().clone();

        assert_eq!(tloss, arr1(&[3.0, 3.0]));

        state.reset_epoch();
        assert!(state.tloss().is_none());
        assert_eq!(state.update_loss(0, &arr1(&[1.0, 2.0])).unwrap(), &arr1(&[1.0, 2.0]));
    }

    #[test]
    fn loss_with_another_component_count_is_rejected() {
        let mut state = StepState::new(1);
        state.update_loss(0, &arr1(&[1.0, 2.0, 3.0])).unwrap();

        let err = state.update_loss(1, &arr1(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, TrainErr::Data(_)));
        assert_eq!(state.tloss(), Some(&arr1(&[1.0, 2.0, 3.0])));
    }

    #[test]
    fn accumulation_schedule() {
        let mut state = StepState::new(4);
        let steps: Vec<usize> = (0..12)
            .filter(|&ni| {
                let step = state.should_step(ni);
                if step {
                    state.mark_step(ni);
                }
                step
            })
            .collect();

        assert_eq!(steps, vec![3, 7, 11]);
    }

    #[test]
    fn every_iteration_steps_without_accumulation() {
        let state = StepState::new(0);

        assert_eq!(state.accumulate, 1);
        assert!(state.should_step(0));
    }
}
