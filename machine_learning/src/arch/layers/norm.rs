use ndarray::{Array1, Array2, Axis, Ix1};

use crate::{
    MlErr, Result,
    params::{ParamId, ParamStore},
};

const EPS: f32 = 1e-3;
const MOMENTUM: f32 = 0.03;

/// Batch normalization over the feature axis of a `[N, C]` input.
///
/// The affine `weight` and `bias` are learnable, the running mean and
/// variance are registered as buffers.
#[derive(Debug, Clone)]
pub struct BatchNorm1d {
    features: usize,
    weight: ParamId,
    bias: ParamId,
    running_mean: ParamId,
    running_var: ParamId,
    train: bool,

    // Forward metadata
    xhat: Option<Array2<f32>>,
    inv_std: Array1<f32>,
}

impl BatchNorm1d {
    /// Registers the layer's tensors in `store` and returns the layer.
    pub fn new(store: &mut ParamStore, name: &str, features: usize) -> Self {
        let ones = Array1::<f32>::ones(features).into_dyn();
        let zeros = Array1::<f32>::zeros(features).into_dyn();

        Self {
            features,
            weight: store.register(format!("{name}.weight"), ones.clone(), true),
            bias: store.register(format!("{name}.bias"), zeros.clone(), true),
            running_mean: store.register(format!("{name}.running_mean"), zeros, false),
            running_var: store.register(format!("{name}.running_var"), ones, false),
            train: true,
            xhat: None,
            inv_std: Array1::zeros(features),
        }
    }

    pub fn weight(&self) -> ParamId {
        self.weight
    }

    pub fn bias(&self) -> ParamId {
        self.bias
    }

    pub fn set_train(&mut self, train: bool) {
        self.train = train;
    }

    /// Normalizes `x`; in training mode it also updates the running statistics.
    pub fn forward(&mut self, store: &mut ParamStore, x: Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.features {
            return Err(MlErr::SizeMismatch {
                what: "batch norm features",
                got: x.ncols(),
                expected: self.features,
            });
        }

        let (mean, var) = if self.train {
            let n = x.nrows();
            let mean = x
                .mean_axis(Axis(0))
                .ok_or(MlErr::InvalidInput("batch norm over an empty batch"))?;
            let var = (&x - &mean)
                .mapv(|v| v * v)
                .mean_axis(Axis(0))
                .ok_or(MlErr::InvalidInput("batch norm over an empty batch"))?;

            let unbiased = if n > 1 {
                &var * (n as f32 / (n - 1) as f32)
            } else {
                var.clone()
            };
            self.update_running(store, &mean, &unbiased)?;

            (mean, var)
        } else {
            let mean = self.buffer(store, self.running_mean)?;
            let var = self.buffer(store, self.running_var)?;
            (mean, var)
        };

        self.inv_std = var.mapv(|v| 1.0 / (v + EPS).sqrt());
        let xhat = (x - &mean) * &self.inv_std;

        let gamma = self.buffer(store, self.weight)?;
        let beta = self.buffer(store, self.bias)?;
        let y = &xhat * &gamma + &beta;

        self.xhat = Some(xhat);
        Ok(y)
    }

    /// Accumulates the affine gradients and returns the input gradient.
    pub fn backward(&mut self, store: &mut ParamStore, d: Array2<f32>) -> Result<Array2<f32>> {
        let xhat = self.xhat.take().ok_or(MlErr::MissingForward("batch norm"))?;
        let gamma = self.buffer(store, self.weight)?;

        {
            let mut dgamma = store
                .get_mut(self.weight)?
                .grad_mut()
                .view_mut()
                .into_dimensionality::<Ix1>()?;
            dgamma += &(&d * &xhat).sum_axis(Axis(0));
        }
        {
            let mut dbeta = store
                .get_mut(self.bias)?
                .grad_mut()
                .view_mut()
                .into_dimensionality::<Ix1>()?;
            dbeta += &d.sum_axis(Axis(0));
        }

        let dxhat = d * &gamma;
        if !self.train {
            return Ok(dxhat * &self.inv_std);
        }

        let n = dxhat.nrows() as f32;
        let sum = dxhat.sum_axis(Axis(0));
        let dot = (&dxhat * &xhat).sum_axis(Axis(0));
        let dx = (dxhat * n - &sum - &xhat * &dot) * &(&self.inv_std / n);

        Ok(dx)
    }

    fn buffer(&self, store: &ParamStore, id: ParamId) -> Result<Array1<f32>> {
        let v = store.get(id)?.value().view().into_dimensionality::<Ix1>()?;
        Ok(v.to_owned())
    }

    fn update_running(
        &self,
        store: &mut ParamStore,
        mean: &Array1<f32>,
        var: &Array1<f32>,
    ) -> Result<()> {
        for (id, batch) in [(self.running_mean, mean), (self.running_var, var)] {
            let running = store.get_mut(id)?.value_mut();
            running.zip_mut_with(&batch.view().into_dyn(), |r, &b| {
                *r = (1.0 - MOMENTUM) * *r + MOMENTUM * b;
            });
        }

        Ok(())
    }
}
