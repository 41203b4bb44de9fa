use std::collections::HashSet;

use log::warn;

use crate::{
    Result,
    arch::{LayerKind, Model, Submodule},
    params::{ParamId, ParamStore},
};

/// The decay policy a tensor falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupRole {
    /// Bias vectors, never decayed.
    Bias,
    /// Weights of non normalization layers, decayed.
    Weight,
    /// Weights of normalization layers, never decayed.
    NormWeight,
}

/// A partition of the learnable tensors of a model by `GroupRole`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupedParams {
    pub biases: Vec<ParamId>,
    pub weights: Vec<ParamId>,
    pub norm_weights: Vec<ParamId>,
}

impl GroupedParams {
    /// Amount of grouped tensors.
    pub fn len(&self) -> usize {
        self.biases.len() + self.weights.len() + self.norm_weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn role_of(&self, id: ParamId) -> Option<GroupRole> {
        if self.biases.contains(&id) {
            Some(GroupRole::Bias)
        } else if self.weights.contains(&id) {
            Some(GroupRole::Weight)
        } else if self.norm_weights.contains(&id) {
            Some(GroupRole::NormWeight)
        } else {
            None
        }
    }

    /// Consumes the partition into `(role, ids)` pairs.
    pub fn into_roles(self) -> [(GroupRole, Vec<ParamId>); 3] {
        [
            (GroupRole::Bias, self.biases),
            (GroupRole::Weight, self.weights),
            (GroupRole::NormWeight, self.norm_weights),
        ]
    }
}

/// Partitions the learnable tensors exposed by `submodules`.
///
/// For every submodule, a learnable bias goes to the bias group and a
/// learnable weight goes to the norm weight group when the submodule kind is
/// one of `norm_kinds`, or to the decayed weight group otherwise. A tensor
/// listed by several submodules is grouped where it is first seen.
///
/// # Arguments
/// * `submodules` - The model's nodes in traversal order.
/// * `store` - The tensors the submodules point into.
/// * `norm_kinds` - The layer kinds whose weights are not decayed.
///
/// # Errors
/// `MlErr::UnknownParam` if a submodule points outside of `store`.
pub fn group_params(
    submodules: &[Submodule],
    store: &ParamStore,
    norm_kinds: &[LayerKind],
) -> Result<GroupedParams> {
    let mut grouped = GroupedParams::default();
    let mut seen = HashSet::new();

    for submodule in submodules {
        if let Some(bias) = submodule.bias
            && store.get(bias)?.learnable()
            && seen.insert(bias)
        {
            grouped.biases.push(bias);
        }

        if let Some(weight) = submodule.weight
            && store.get(weight)?.learnable()
            && seen.insert(weight)
        {
            if submodule.kind.is_one_of(norm_kinds) {
                grouped.norm_weights.push(weight);
            } else {
                grouped.weights.push(weight);
            }
        }
    }

    for id in store.learnable().filter(|id| !seen.contains(id)) {
        warn!(
            param = store[id].name();
            "learnable tensor is not exposed by any submodule, it won't be optimized"
        );
    }

    Ok(grouped)
}

/// Partitions a model's tensors using its own submodules and norm kinds.
pub fn group_model_params<M: Model + ?Sized>(model: &M) -> Result<GroupedParams> {
    group_params(&model.submodules(), model.params(), model.norm_kinds())
}
