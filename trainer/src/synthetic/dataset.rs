use log::info;
use ndarray::{Array1, Array2, Array3, Axis, s};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::{
    Result, TrainErr, TrainingConfig,
    data::{Dataset, Mosaic, Sample},
};

const NOISE_STD: f32 = 12.0;

/// Shape of the generated data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSpec {
    pub len: usize,
    pub channels: usize,
    /// Square image side, even so mosaics tile evenly.
    pub imgsz: usize,
    pub nc: usize,
    pub max_labels: usize,
    pub seed: u64,
}

/// Deterministic labelled images whose pixel intensities encode the label
/// boxes, with optional 2x2 mosaic augmentation.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    spec: SyntheticSpec,
    noise: Normal<f32>,
    mosaic: bool,
    closes: usize,
    rng: StdRng,
}

impl SyntheticDataset {
    /// Creates a new `SyntheticDataset`.
    ///
    /// # Errors
    /// `TrainErr::Data` if the images are not an even, non zero size or there
    /// are no channels or classes.
    pub fn new(spec: SyntheticSpec, mosaic: bool) -> Result<Self> {
        if spec.imgsz == 0 || spec.imgsz % 2 != 0 {
            return Err(TrainErr::Data(format!(
                "synthetic images must have an even side, got {}",
                spec.imgsz
            )));
        }

        if spec.channels == 0 || spec.nc == 0 {
            return Err(TrainErr::Data(
                "synthetic data needs at least one channel and one class".to_string(),
            ));
        }

        let noise = Normal::new(0.0, NOISE_STD).map_err(|e| TrainErr::Data(e.to_string()))?;

        Ok(Self {
            spec,
            noise,
            mosaic,
            closes: 0,
            rng: StdRng::seed_from_u64(spec.seed),
        })
    }

    /// How many times mosaic augmentation was closed.
    pub fn closes(&self) -> usize {
        self.closes
    }

    /// The sample at `idx` without any augmentation.
    pub fn plain(&self, idx: usize) -> Sample {
        let spec = &self.spec;
        let seed = spec.seed ^ (idx as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let mut rng = StdRng::seed_from_u64(seed);

        let labels = rng.random_range(1..=spec.max_labels.max(1));
        let cls = Array1::from_shape_fn(labels, |_| rng.random_range(0..spec.nc) as f32);
        let bboxes: Array2<f32> = Array2::from_shape_fn((labels, 4), |(_, k)| {
            if k < 2 {
                rng.random_range(0.1..0.9)
            } else {
                rng.random_range(0.05..0.3)
            }
        });

        let mean_box = bboxes.sum_axis(Axis(0)) / labels as f32;
        let img = Array3::from_shape_fn((spec.channels, spec.imgsz, spec.imgsz), |(c, _, _)| {
            let base = 255.0 * mean_box[c % 4];
            (base + self.noise.sample(&mut rng)).clamp(0.0, 255.0) as u8
        });

        Sample { img, cls, bboxes }
    }

    fn mosaic_sample(&mut self, idx: usize) -> Sample {
        let side = self.spec.imgsz;
        let half = side / 2;

        let mut img = Array3::zeros((self.spec.channels, side, side));
        let mut cls = Vec::new();
        let mut bboxes = Vec::new();

        for q in 0..4 {
            let src = if q == 0 {
                idx
            } else {
                self.rng.random_range(0..self.spec.len.max(1))
            };
            let tile = self.plain(src);
            let (qy, qx) = (q / 2, q % 2);

            img.slice_mut(s![.., qy * half..(qy + 1) * half, qx * half..(qx + 1) * half])
                .assign(&tile.img.slice(s![.., ..;2, ..;2]));

            cls.extend(tile.cls.iter().copied());
            for b in tile.bboxes.rows() {
                bboxes.extend([
                    (b[0] + qx as f32) / 2.0,
                    (b[1] + qy as f32) / 2.0,
                    b[2] / 2.0,
                    b[3] / 2.0,
                ]);
            }
        }

        let labels = cls.len();
        Sample {
            img,
            cls: Array1::from(cls),
            bboxes: Array2::from_shape_vec((labels, 4), bboxes)
                .unwrap_or_else(|_| Array2::zeros((0, 4))),
        }
    }
}

impl Dataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.spec.len
    }

    fn get(&mut self, idx: usize) -> Result<Sample> {
        if idx >= self.spec.len {
            return Err(TrainErr::Data(format!(
                "sample {idx} out of range for {} samples",
                self.spec.len
            )));
        }

        if self.mosaic {
            Ok(self.mosaic_sample(idx))
        } else {
            Ok(self.plain(idx))
        }
    }

    fn mosaic(&mut self) -> Option<&mut dyn Mosaic> {
        Some(self)
    }
}

impl Mosaic for SyntheticDataset {
    fn set_mosaic(&mut self, enabled: bool) {
        self.mosaic = enabled;
    }

    fn mosaic_enabled(&self) -> bool {
        self.mosaic
    }

    fn close_mosaic(&mut self, cfg: &TrainingConfig) {
        self.closes += 1;
        info!(imgsz = cfg.imgsz; "mosaic tiling disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SyntheticSpec {
        SyntheticSpec {
            len: 8,
            channels: 3,
            imgsz: 8,
            nc: 2,
            max_labels: 3,
            seed: 1,
        }
    }

    #[test]
    fn samples_are_deterministic() {
        let mut a = SyntheticDataset::new(spec(), false).unwrap();
        let mut b = SyntheticDataset::new(spec(), false).unwrap();

        assert_eq!(a.get(3).unwrap(), b.get(3).unwrap());
        assert_ne!(a.get(3).unwrap(), a.get(4).unwrap());
    }

    #[test]
    fn mosaic_tiles_four_samples() {
        let mut ds = SyntheticDataset::new(spec(), true).unwrap();
        let plain = ds.plain(0);
        let tiled = ds.get(0).unwrap();

        assert_eq!(tiled.img.dim(), (3, 8, 8));
        assert!(tiled.cls.len() >= 4);
        assert_eq!(tiled.cls.len(), tiled.bboxes.nrows());
        assert_eq!(tiled.cls[0], plain.cls[0]);
        assert!((tiled.bboxes[[0, 0]] - plain.bboxes[[0, 0]] / 2.0).abs() < 1e-6);
        assert_eq!(tiled.img.slice(s![.., ..4, ..4]), plain.img.slice(s![.., ..;2, ..;2]));
    }

    #[test]
    fn mosaic_capability_toggles() {
        let mut ds = SyntheticDataset::new(spec(), true).unwrap();
        let mosaic = ds.mosaic().unwrap();

        mosaic.set_mosaic(false);
        mosaic.close_mosaic(&TrainingConfig::default());
        assert!(!mosaic.mosaic_enabled());
        assert_eq!(ds.closes(), 1);
        assert_eq!(ds.get(2).unwrap(), ds.plain(2));
    }

    #[test]
    fn odd_image_size_is_rejected() {
        let odd = SyntheticSpec { imgsz: 7, ..spec() };
        assert!(SyntheticDataset::new(odd, false).is_err());
    }
}
