use crate::params::ParamId;

/// The kinds of layer a model can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Conv2d,
    Linear,
    BatchNorm1d,
    BatchNorm2d,
    GroupNorm,
    InstanceNorm2d,
    LayerNorm,
    RmsNorm,
    Activation,
    Container,
}

/// Normalization layers known to the layer library.
pub const NORM_LAYERS: &[LayerKind] = &[
    LayerKind::BatchNorm1d,
    LayerKind::BatchNorm2d,
    LayerKind::GroupNorm,
    LayerKind::InstanceNorm2d,
    LayerKind::LayerNorm,
    LayerKind::RmsNorm,
];

impl LayerKind {
    #[inline]
    pub fn is_one_of(self, kinds: &[LayerKind]) -> bool {
        kinds.contains(&self)
    }
}

/// Describes one node of a model: what kind of layer it is and which of its
/// tensors act as weight and bias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    pub name: String,
    pub kind: LayerKind,
    pub weight: Option<ParamId>,
    pub bias: Option<ParamId>,
}

impl Submodule {
    /// Creates a `Submodule` with neither weight nor bias.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            weight: None,
            bias: None,
        }
    }

    pub fn with_weight(mut self, weight: ParamId) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_bias(mut self, bias: Option<ParamId>) -> Self {
        self.bias = bias;
        self
    }
}
