mod loader;
mod prefetch;

use machine_learning::{Batch, MlErr};
use ndarray::{Array1, Array2, Array3, Array4, Axis, concatenate};

pub use loader::BatchLoader;
pub use prefetch::for_each_batch;

use crate::{Result, TrainErr, TrainingConfig};

/// The boxed batch iterator a `DataLoader` hands out for one epoch.
pub type Batches<'a> = Box<dyn Iterator<Item = Result<Batch>> + Send + 'a>;

/// Datasets able to turn mosaic augmentation on and off.
pub trait Mosaic {
    fn set_mosaic(&mut self, enabled: bool);

    fn mosaic_enabled(&self) -> bool;

    /// Reconfigures the augmentation pipeline once mosaic is turned off.
    fn close_mosaic(&mut self, _cfg: &TrainingConfig) {}
}

/// A single labelled image.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Pixels shaped `[C, H, W]`.
    pub img: Array3<u8>,
    pub cls: Array1<f32>,
    /// Normalized xywh boxes, one row per label.
    pub bboxes: Array2<f32>,
}

/// Random access to labelled images.
pub trait Dataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads (and augments) the sample at `idx`.
    fn get(&mut self, idx: usize) -> Result<Sample>;

    /// The mosaic capability, for datasets that have it.
    fn mosaic(&mut self) -> Option<&mut dyn Mosaic> {
        None
    }
}

/// An epoch-wise source of collated batches.
pub trait DataLoader {
    /// Amount of batches per epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn batch_size(&self) -> usize;

    /// Iterates one epoch.
    fn batches(&mut self) -> Batches<'_>;

    /// The mosaic capability of the underlying dataset.
    fn mosaic(&mut self) -> Option<&mut dyn Mosaic>;
}

/// Stacks samples into a `Batch`, recording which image each label came from.
///
/// # Errors
/// `TrainErr::Data` on an empty sample list or images of different shapes.
pub fn collate(samples: Vec<Sample>) -> Result<Batch> {
    let Some(first) = samples.first() else {
        return Err(TrainErr::Data("cannot collate an empty batch".to_string()));
    };

    let shape = first.img.dim();
    let labels: usize = samples.iter().map(|s| s.cls.len()).sum();

    let mut img = Array4::zeros((samples.len(), shape.0, shape.1, shape.2));
    let mut cls = Vec::with_capacity(labels);
    let mut bboxes = Vec::with_capacity(samples.len());
    let mut batch_idx = Vec::with_capacity(labels);

    for (i, sample) in samples.iter().enumerate() {
        if sample.img.dim() != shape {
            return Err(TrainErr::Data(format!(
                "image {i} is shaped {:?}, expected {shape:?}",
                sample.img.dim()
            )));
        }

        img.index_axis_mut(Axis(0), i).assign(&sample.img);
        cls.extend(sample.cls.iter().copied());
        bboxes.push(sample.bboxes.view());
        batch_idx.extend(std::iter::repeat_n(i, sample.cls.len()));
    }

    let bboxes = concatenate(Axis(0), bboxes.as_slice()).map_err(MlErr::from)?;
    let batch = Batch::new(img, Array1::from(cls), bboxes, Array1::from(batch_idx))?;

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    fn sample(fill: u8, labels: usize) -> Sample {
        Sample {
            img: Array3::from_elem((3, 4, 4), fill),
            cls: Array1::from_elem(labels, fill as f32),
            bboxes: Array2::from_elem((labels, 4), 0.5),
        }
    }

    #[test]
    fn collate_flattens_labels() {
        let batch = collate(vec![sample(1, 2), sample(2, 0), sample(3, 1)]).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.instances(), 3);
        assert_eq!(batch.cls(), &arr1(&[1.0, 1.0, 3.0]));
        assert_eq!(batch.batch_idx(), &arr1(&[0, 0, 2]));
        assert_eq!(batch.bboxes().row(2), arr2(&[[0.5; 4]]).row(0));
        assert_eq!(batch.img()[[2, 0, 0, 0]], 3);
    }

    #[test]
    fn collate_rejects_mixed_shapes() {
        let mut odd = sample(1, 1);
        odd.img = Array3::zeros((3, 2, 2));

        assert!(matches!(
            collate(vec![sample(1, 1), odd]),
            Err(TrainErr::Data(_))
        ));
        assert!(matches!(collate(Vec::new()), Err(TrainErr::Data(_))));
    }
}
