use ndarray::{Array1, Array2, Array4};

use crate::{MlErr, Result};

/// A collated detection minibatch.
///
/// Labels are flattened across the batch: label `k` belongs to image
/// `batch_idx[k]`, has class `cls[k]` and box `bboxes.row(k)` as normalized xywh.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    img: Array4<u8>,
    cls: Array1<f32>,
    bboxes: Array2<f32>,
    batch_idx: Array1<usize>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Arguments
    /// * `img` - Raw pixels shaped `[B, C, H, W]`.
    /// * `cls` - One class per label.
    /// * `bboxes` - One `[x, y, w, h]` row per label.
    /// * `batch_idx` - The image each label belongs to.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the label arrays disagree in length, the boxes
    /// are not 4 wide or a label points past the last image.
    pub fn new(
        img: Array4<u8>,
        cls: Array1<f32>,
        bboxes: Array2<f32>,
        batch_idx: Array1<usize>,
    ) -> Result<Self> {
        let n = cls.len();

        if bboxes.nrows() != n {
            return Err(MlErr::SizeMismatch {
                what: "batch bboxes",
                got: bboxes.nrows(),
                expected: n,
            });
        }

        if bboxes.ncols() != 4 {
            return Err(MlErr::SizeMismatch {
                what: "batch bbox width",
                got: bboxes.ncols(),
                expected: 4,
            });
        }

        if batch_idx.len() != n {
            return Err(MlErr::SizeMismatch {
                what: "batch indices",
                got: batch_idx.len(),
                expected: n,
            });
        }

        let images = img.shape()[0];
        if let Some(&bad) = batch_idx.iter().find(|&&i| i >= images) {
            return Err(MlErr::SizeMismatch {
                what: "batch index",
                got: bad,
                expected: images,
            });
        }

        Ok(Self {
            img,
            cls,
            bboxes,
            batch_idx,
        })
    }

    pub fn img(&self) -> &Array4<u8> {
        &self.img
    }

    pub fn cls(&self) -> &Array1<f32> {
        &self.cls
    }

    pub fn bboxes(&self) -> &Array2<f32> {
        &self.bboxes
    }

    pub fn batch_idx(&self) -> &Array1<usize> {
        &self.batch_idx
    }

    /// Amount of images.
    #[inline]
    pub fn len(&self) -> usize {
        self.img.shape()[0]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Amount of labels across every image.
    #[inline]
    pub fn instances(&self) -> usize {
        self.cls.len()
    }

    /// Width of the images, the last image axis.
    #[inline]
    pub fn img_size(&self) -> usize {
        self.img.shape()[3]
    }

    /// The images scaled from `0..=255` into `[0, 1]`.
    pub fn normalized(&self) -> Array4<f32> {
        self.img.mapv(|p| p as f32 / 255.0)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    #[test]
    fn batch_reports_sizes() {
        let img = Array4::from_elem((2, 3, 8, 8), 255u8);
        let batch = Batch::new(
            img,
            arr1(&[0.0, 1.0, 1.0]),
            arr2(&[[0.5; 4], [0.2; 4], [0.1; 4]]),
            arr1(&[0, 0, 1]),
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.instances(), 3);
        assert_eq!(batch.img_size(), 8);
        assert!(batch.normalized().iter().all(|&p| p == 1.0));
    }

    #[test]
    fn label_pointing_past_last_image_is_rejected() {
        let img = Array4::zeros((1, 3, 4, 4));
        let err = Batch::new(img, arr1(&[0.0]), arr2(&[[0.5; 4]]), arr1(&[1])).unwrap_err();

        assert!(matches!(
            err,
            MlErr::SizeMismatch {
                what: "batch index",
                got: 1,
                expected: 1
            }
        ));
    }

    #[test]
    fn boxes_must_be_four_wide() {
        let img = Array4::zeros((1, 3, 4, 4));
        let err = Batch::new(img, arr1(&[0.0]), arr2(&[[0.5; 3]]), arr1(&[0])).unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { expected: 4, .. }));
    }
}
