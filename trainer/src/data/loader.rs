use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{Batches, DataLoader, Dataset, Mosaic, collate};

/// Batches a `Dataset` in order or reshuffled every epoch.
///
/// The last batch of an epoch may be smaller than `batch_size`.
#[derive(Debug, Clone)]
pub struct BatchLoader<D> {
    dataset: D,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    rng: StdRng,
}

impl<D: Dataset> BatchLoader<D> {
    /// Creates a new `BatchLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The samples to batch.
    /// * `batch_size` - Samples per batch, at least 1.
    /// * `shuffle` - Whether to visit the samples in a new random order each epoch.
    /// * `seed` - Seed of the shuffling.
    pub fn new(dataset: D, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        let order = (0..dataset.len()).collect();

        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            order,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }
}

impl<D: Dataset + Send> DataLoader for BatchLoader<D> {
    fn len(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn batches(&mut self) -> Batches<'_> {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }

        let Self {
            dataset,
            order,
            batch_size,
            ..
        } = self;

        Box::new(order.chunks(*batch_size).map(move |idxs| {
            let samples = idxs
                .iter()
                .map(|&i| dataset.get(i))
                .collect::<crate::Result<Vec<_>>>()?;

            collate(samples)
        }))
    }

    fn mosaic(&mut self) -> Option<&mut dyn Mosaic> {
        self.dataset.mosaic()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, Array3};

    use super::*;
    use crate::{Result, data::Sample};

    struct Numbered(usize);

    impl Dataset for Numbered {
        fn len(&self) -> usize {
            self.0
        }

        fn get(&mut self, idx: usize) -> Result<Sample> {
            Ok(Sample {
                img: Array3::from_elem((1, 2, 2), idx as u8),
                cls: Array1::from_elem(1, idx as f32),
                bboxes: Array2::from_elem((1, 4), 0.5),
            })
        }
    }

    fn firsts(loader: &mut BatchLoader<Numbered>) -> Vec<Vec<f32>> {
        loader
            .batches()
            .map(|b| b.unwrap().cls().to_vec())
            .collect()
    }

    #[test]
    fn ordered_batches_keep_a_short_tail() {
        let mut loader = BatchLoader::new(Numbered(5), 2, false, 0);

        assert_eq!(loader.len(), 3);
        assert_eq!(loader.batch_size(), 2);
        assert_eq!(
            firsts(&mut loader),
            vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0]]
        );
        assert!(loader.mosaic().is_none());
    }

    #[test]
    fn batch_size_is_at_least_one() {
        let loader = BatchLoader::new(Numbered(3), 0, false, 0);

        assert_eq!(loader.batch_size(), 1);
        assert_eq!(loader.len(), 3);
    }

    #[test]
    fn shuffled_epochs_visit_every_sample() {
        let mut loader = BatchLoader::new(Numbered(10), 3, true, 7);

        let a: Vec<f32> = firsts(&mut loader).concat();
        let b: Vec<f32> = firsts(&mut loader).concat();
        assert_ne!(a, b);

        let mut sorted = a.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }
}
