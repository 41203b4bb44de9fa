use machine_learning::{
    Result,
    arch::{
        LayerKind, Model, Submodule,
        layers::{BatchNorm1d, GlobalAvgPool, Linear, Silu},
    },
    params::ParamStore,
};
use ndarray::{Array2, Array4};
use rand::{SeedableRng, rngs::StdRng};

/// A minimal detector: per-channel pooling, a linear stem with batch norm and
/// SiLU, and a linear head predicting one `xywh` box plus class scores per
/// image.
#[derive(Debug, Clone)]
pub struct TinyDetector {
    params: ParamStore,
    train: bool,
    pool: GlobalAvgPool,
    stem: Linear,
    bn: BatchNorm1d,
    act: Silu,
    head: Linear,
}

impl TinyDetector {
    /// Creates a new `TinyDetector`.
    ///
    /// # Arguments
    /// * `channels` - Image channels.
    /// * `hidden` - Width of the stem.
    /// * `nc` - Number of classes.
    /// * `seed` - Seed of the weight initialization.
    pub fn new(channels: usize, hidden: usize, nc: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = ParamStore::new();

        let stem = Linear::new(&mut params, "stem", (channels, hidden), false, &mut rng);
        let bn = BatchNorm1d::new(&mut params, "bn", hidden);
        let head = Linear::new(&mut params, "head", (hidden, 4 + nc), true, &mut rng);

        Self {
            params,
            train: true,
            pool: GlobalAvgPool::new(),
            stem,
            bn,
            act: Silu::new(),
            head,
        }
    }
}

impl Model for TinyDetector {
    type Output = Array2<f32>;

    fn set_train(&mut self, train: bool) {
        self.train = train;
        self.bn.set_train(train);
    }

    fn is_training(&self) -> bool {
        self.train
    }

    fn submodules(&self) -> Vec<Submodule> {
        vec![
            Submodule::new("model", LayerKind::Container),
            Submodule::new("stem", LayerKind::Linear).with_weight(self.stem.weight()),
            Submodule::new("bn", LayerKind::BatchNorm1d)
                .with_weight(self.bn.weight())
                .with_bias(Some(self.bn.bias())),
            Submodule::new("act", LayerKind::Activation),
            Submodule::new("head", LayerKind::Linear)
                .with_weight(self.head.weight())
                .with_bias(self.head.bias()),
        ]
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn forward(&mut self, x: Array4<f32>) -> Result<Self::Output> {
        let x = self.pool.forward(&x)?;
        let x = self.stem.forward(&self.params, x)?;
        let x = self.bn.forward(&mut self.params, x)?;
        let x = self.act.forward(x);
        self.head.forward(&self.params, x)
    }

    fn backward(&mut self, d: Self::Output, loss_scale: f32) -> Result<()> {
        let d = d * loss_scale;
        let d = self.head.backward(&mut self.params, d)?;
        let d = self.act.backward(d)?;
        let d = self.bn.backward(&mut self.params, d)?;
        let d = self.stem.backward(&mut self.params, d)?;
        self.pool.backward(d)?;

        Ok(())
    }
}
