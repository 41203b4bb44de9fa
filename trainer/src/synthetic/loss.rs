use machine_learning::{
    Batch, MlErr, Result,
    arch::loss::{Loss, LossFn, LossOutput, Mse, SmoothL1},
};
use ndarray::{Array1, Array2, Axis, s};

const NAMES: [&str; 3] = ["box_loss", "cls_loss", "dfl_loss"];

/// Component gains applied before summing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossGains {
    pub box_gain: f32,
    pub cls_gain: f32,
    pub dfl_gain: f32,
}

impl Default for LossGains {
    fn default() -> Self {
        Self {
            box_gain: 7.5,
            cls_gain: 0.5,
            dfl_gain: 1.5,
        }
    }
}

/// Loss for the `[B, 4 + nc]` predictions of `TinyDetector`.
///
/// Each image's target box is the mean of its label boxes and its class
/// target is the class frequency of its labels. The box is scored with MSE
/// and smooth L1 (the `dfl` slot), the classes with MSE. The total is the
/// gained sum times the batch size.
#[derive(Debug, Clone)]
pub struct DetectionLoss {
    nc: usize,
    gains: LossGains,
    mse: Mse,
    smooth_l1: SmoothL1,
}

impl DetectionLoss {
    pub fn new(nc: usize, gains: LossGains) -> Self {
        Self {
            nc,
            gains,
            mse: Mse::new(),
            smooth_l1: SmoothL1::default(),
        }
    }

    fn targets(&self, batch: &Batch) -> (Array2<f32>, Array2<f32>) {
        let b = batch.len();
        let mut boxes = Array2::zeros((b, 4));
        let mut classes = Array2::zeros((b, self.nc));
        let mut counts = Array1::<f32>::zeros(b);

        for ((&i, &c), bbox) in batch
            .batch_idx()
            .iter()
            .zip(batch.cls())
            .zip(batch.bboxes().rows())
        {
            let c = (c.max(0.0) as usize).min(self.nc.saturating_sub(1));
            boxes.row_mut(i).scaled_add(1.0, &bbox);
            classes[[i, c]] += 1.0;
            counts[i] += 1.0;
        }

        for (i, &n) in counts.iter().enumerate().filter(|&(_, &n)| n > 0.0) {
            boxes.row_mut(i).mapv_inplace(|v| v / n);
            classes.row_mut(i).mapv_inplace(|v| v / n);
        }

        (boxes, classes)
    }
}

impl Loss<Array2<f32>> for DetectionLoss {
    fn names(&self) -> &[&'static str] {
        &NAMES
    }

    fn compute(&mut self, preds: &Array2<f32>, batch: &Batch) -> Result<LossOutput<Array2<f32>>> {
        if preds.dim() != (batch.len(), 4 + self.nc) {
            return Err(MlErr::SizeMismatch {
                what: "detection predictions",
                got: preds.len(),
                expected: batch.len() * (4 + self.nc),
            });
        }

        let (box_t, cls_t) = self.targets(batch);
        let box_p = preds.slice(s![.., ..4]);
        let cls_p = preds.slice(s![.., 4..]);
        let g = self.gains;

        let items = Array1::from(vec![
            g.box_gain * self.mse.loss(box_p, box_t.view()),
            g.cls_gain * self.mse.loss(cls_p, cls_t.view()),
            g.dfl_gain * self.smooth_l1.loss(box_p, box_t.view()),
        ]);

        let bs = batch.len() as f32;
        let mut grad = Array2::zeros(preds.raw_dim());

        let mut d_box = grad.slice_mut(s![.., ..4]);
        d_box.scaled_add(g.box_gain * bs, &self.mse.loss_prime(box_p, box_t.view()));
        d_box.scaled_add(g.dfl_gain * bs, &self.smooth_l1.loss_prime(box_p, box_t.view()));

        let mut d_cls = grad.slice_mut(s![.., 4..]);
        d_cls.scaled_add(g.cls_gain * bs, &self.mse.loss_prime(cls_p, cls_t.view()));

        Ok(LossOutput {
            loss: items.sum() * bs,
            items,
            grad,
        })
    }
}

/// Element-wise mean of per-batch loss components.
pub fn mean_items<'a, I>(items: I) -> Option<Array1<f32>>
where
    I: IntoIterator<Item = &'a Array1<f32>>,
{
    let rows: Vec<_> = items.into_iter().map(|a| a.view()).collect();
    let stacked = ndarray::stack(Axis(0), &rows).ok()?;
    stacked.mean_axis(Axis(0))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array4, arr1, arr2};

    use super::*;

    fn batch() -> Batch {
        Batch::new(
            Array4::zeros((2, 3, 4, 4)),
            arr1(&[0.0, 1.0, 1.0]),
            arr2(&[
                [0.2, 0.2, 0.1, 0.1],
                [0.4, 0.4, 0.3, 0.3],
                [0.5, 0.5, 0.5, 0.5],
            ]),
            arr1(&[0, 0, 1]),
        )
        .unwrap()
    }

    #[test]
    fn targets_average_labels_per_image() {
        let loss = DetectionLoss::new(2, LossGains::default());
        let (boxes, classes) = loss.targets(&batch());

        assert!((boxes[[0, 0]] - 0.3).abs() < 1e-6);
        assert!((boxes[[0, 2]] - 0.2).abs() < 1e-6);
        assert_eq!(boxes.row(1), arr1(&[0.5; 4]));
        assert_eq!(classes, arr2(&[[0.5, 0.5], [0.0, 1.0]]));
    }

    #[test]
    fn perfect_predictions_have_zero_loss() {
        let mut loss = DetectionLoss::new(2, LossGains::default());
        let b = batch();
        let (boxes, classes) = loss.targets(&b);
        let preds = ndarray::concatenate(Axis(1), &[boxes.view(), classes.view()]).unwrap();

        let out = loss.compute(&preds, &b).unwrap();

        assert_eq!(out.loss, 0.0);
        assert_eq!(out.items, arr1(&[0.0, 0.0, 0.0]));
        assert!(out.grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut loss = DetectionLoss::new(2, LossGains::default());
        let b = batch();
        let preds = arr2(&[[0.1, 0.9, 0.3, 0.2, 0.7, -0.2], [0.6, 0.1, 2.0, 0.5, 0.3, 0.4]]);

        let out = loss.compute(&preds, &b).unwrap();

        let h = 1e-2;
        for i in 0..2 {
            for j in 0..6 {
                let mut up = preds.clone();
                up[[i, j]] += h;
                let mut down = preds.clone();
                down[[i, j]] -= h;

                let numeric = (loss.compute(&up, &b).unwrap().loss
                    - loss.compute(&down, &b).unwrap().loss)
                    / (2.0 * h);
                let analytic = out.grad[[i, j]];
                assert!((numeric - analytic).abs() < 1e-2, "{numeric} vs {analytic}");
            }
        }
    }

    #[test]
    fn mismatched_predictions_are_rejected() {
        let mut loss = DetectionLoss::new(3, LossGains::default());
        assert!(loss.compute(&Array2::zeros((2, 6)), &batch()).is_err());
    }

    #[test]
    fn mean_of_items() {
        let a = arr1(&[1.0, 2.0]);
        let b = arr1(&[3.0, 4.0]);

        assert_eq!(mean_items([&a, &b]), Some(arr1(&[2.0, 3.0])));
        assert_eq!(mean_items(std::iter::empty()), None);
    }
}
