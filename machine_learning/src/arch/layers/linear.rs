use ndarray::{Array1, Array2, Axis, Ix1, Ix2, linalg};
use rand::Rng;

use crate::{
    MlErr, Result,
    params::{ParamId, ParamStore},
};

/// Fully connected layer computing `x · W + b`.
///
/// The weight is stored as `[in, out]`.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    weight: ParamId,
    bias: Option<ParamId>,

    // Forward metadata
    x: Option<Array2<f32>>,
}

impl Linear {
    /// Registers the layer's tensors in `store` and returns the layer.
    ///
    /// Values are drawn uniformly from `[-k, k)` with `k = 1 / sqrt(in)`.
    ///
    /// # Arguments
    /// * `store` - Where the weight and bias live.
    /// * `name` - Prefix for the tensor names.
    /// * `dim` - `(in, out)` features.
    /// * `bias` - Whether to add a bias vector.
    /// * `rng` - Random source for the initialization.
    pub fn new<R: Rng>(
        store: &mut ParamStore,
        name: &str,
        dim: (usize, usize),
        bias: bool,
        rng: &mut R,
    ) -> Self {
        let k = 1.0 / (dim.0.max(1) as f32).sqrt();

        let w = Array2::from_shape_fn(dim, |_| rng.random_range(-k..k));
        let weight = store.register(format!("{name}.weight"), w.into_dyn(), true);

        let bias = bias.then(|| {
            let b = Array1::from_shape_fn(dim.1, |_| rng.random_range(-k..k));
            store.register(format!("{name}.bias"), b.into_dyn(), true)
        });

        Self {
            dim,
            weight,
            bias,
            x: None,
        }
    }

    pub fn weight(&self) -> ParamId {
        self.weight
    }

    pub fn bias(&self) -> Option<ParamId> {
        self.bias
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes the layer output for `x` shaped `[N, in]`.
    pub fn forward(&mut self, store: &ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "linear input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let w = store.get(self.weight)?.value().view().into_dimensionality::<Ix2>()?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);

        if let Some(bias) = self.bias {
            let b = store.get(bias)?.value().view().into_dimensionality::<Ix1>()?;
            z += &b;
        }

        self.x = Some(x);
        Ok(z)
    }

    /// Accumulates the weight and bias gradients for `d` and returns the
    /// gradient with respect to the input.
    pub fn backward(&mut self, store: &mut ParamStore, d: Array2<f32>) -> Result<Array2<f32>> {
        let x = self.x.take().ok_or(MlErr::MissingForward("linear"))?;

        let dx = {
            let (w, dw) = store.get_mut(self.weight)?.split_mut();
            let w = w.view().into_dimensionality::<Ix2>()?;
            let mut dw = dw.view_mut().into_dimensionality::<Ix2>()?;
            linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);

            let mut dx = Array2::zeros((d.nrows(), self.dim.0));
            linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);
            dx
        };

        if let Some(bias) = self.bias {
            let mut db = store
                .get_mut(bias)?
                .grad_mut()
                .view_mut()
                .into_dimensionality::<Ix1>()?;
            db += &d.sum_axis(Axis(0));
        }

        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn layer(store: &mut ParamStore) -> Linear {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Linear::new(store, "fc", (2, 1), true, &mut rng);
        store
            .get_mut(layer.weight())
            .unwrap()
            .value_mut()
            .assign(&arr2(&[[2.0], [-1.0]]).into_dyn());
        store
            .get_mut(layer.bias().unwrap())
            .unwrap()
            .value_mut()
            .assign(&arr1(&[0.5]).into_dyn());
        layer
    }

    #[test]
    fn forward_is_affine() {
        let mut store = ParamStore::new();
        let mut fc = layer(&mut store);

        let z = fc.forward(&store, arr2(&[[1.0, 1.0], [3.0, 2.0]])).unwrap();
        assert_eq!(z, arr2(&[[1.5], [4.5]]));
    }

    #[test]
    fn backward_accumulates_gradients() {
        let mut store = ParamStore::new();
        let mut fc = layer(&mut store);
        let x = arr2(&[[1.0, 1.0], [3.0, 2.0]]);
        let d = arr2(&[[1.0], [1.0]]);

        for _ in 0..2 {
            fc.forward(&store, x.clone()).unwrap();
            let dx = fc.backward(&mut store, d.clone()).unwrap();
            assert_eq!(dx, arr2(&[[2.0, -1.0], [2.0, -1.0]]));
        }

        let dw = store[fc.weight()].grad().clone();
        let db = store[fc.bias().unwrap()].grad().clone();
        assert_eq!(dw, arr2(&[[8.0], [6.0]]).into_dyn());
        assert_eq!(db, arr1(&[4.0]).into_dyn());
    }

    #[test]
    fn backward_without_forward_fails() {
        let mut store = ParamStore::new();
        let mut fc = layer(&mut store);

        let err = fc.backward(&mut store, arr2(&[[1.0]])).unwrap_err();
        assert!(matches!(err, MlErr::MissingForward("linear")));
    }

    #[test]
    fn no_bias_registers_a_single_tensor() {
        let mut store = ParamStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let fc = Linear::new(&mut store, "stem", (4, 3), false, &mut rng);

        assert_eq!(store.len(), 1);
        assert!(fc.bias().is_none());
        assert!(store[fc.weight()].value().iter().all(|w| w.abs() <= 0.5));
    }
}
