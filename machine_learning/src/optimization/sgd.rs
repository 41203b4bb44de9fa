use log::debug;
use ndarray::ArrayD;
use rayon::prelude::*;

use super::{GroupRole, GroupedParams, Optimizer, ParamGroup};
use crate::{
    MlErr, Result,
    params::{ParamId, ParamStore},
};

/// Hyperparameters shared by every group at construction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdConfig {
    pub lr: f32,
    pub momentum: f32,
    /// Applied to the `GroupRole::Weight` group only.
    pub weight_decay: f32,
    pub nesterov: bool,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            lr: 0.01,
            momentum: 0.937,
            weight_decay: 5e-4,
            nesterov: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    group: usize,
    buf: Option<ArrayD<f32>>,
}

/// Stochastic gradient descent with (Nesterov) momentum and per-group
/// L2 weight decay.
#[derive(Debug, Clone)]
pub struct Sgd {
    groups: Vec<ParamGroup>,
    slots: Vec<Option<Slot>>,
}

impl Sgd {
    /// Builds an optimizer over the three groups of `grouped`.
    ///
    /// The groups are ordered bias, weight, norm weight; only the weight group
    /// gets `cfg.weight_decay`.
    ///
    /// # Arguments
    /// * `grouped` - The partitioned tensors.
    /// * `params` - The store the ids point into.
    /// * `cfg` - The base hyperparameters.
    ///
    /// # Errors
    /// `MlErr::InvalidInput` on a negative learning rate or Nesterov momentum
    /// without a positive momentum, `MlErr::UnknownParam` on foreign ids.
    pub fn new(grouped: GroupedParams, params: &ParamStore, cfg: SgdConfig) -> Result<Self> {
        if cfg.lr < 0.0 {
            return Err(MlErr::InvalidInput("learning rate must not be negative"));
        }

        if cfg.nesterov && cfg.momentum <= 0.0 {
            return Err(MlErr::InvalidInput(
                "nesterov momentum requires a positive momentum",
            ));
        }

        let mut slots: Vec<Option<Slot>> = vec![None; params.len()];
        let mut groups = Vec::with_capacity(3);

        for (i, (role, ids)) in grouped.into_roles().into_iter().enumerate() {
            for &id in &ids {
                params.get(id)?;
                slots[id.index()] = Some(Slot {
                    group: i,
                    buf: None,
                });
            }

            let weight_decay = match role {
                GroupRole::Weight => cfg.weight_decay,
                GroupRole::Bias | GroupRole::NormWeight => 0.0,
            };

            debug!(
                group = i,
                tensors = ids.len(),
                weight_decay = weight_decay;
                "built sgd parameter group"
            );

            groups.push(ParamGroup {
                role,
                params: ids,
                lr: cfg.lr,
                initial_lr: cfg.lr,
                momentum: Some(cfg.momentum),
                weight_decay,
                nesterov: cfg.nesterov,
            });
        }

        Ok(Self { groups, slots })
    }

    /// The momentum buffer of `id`, if it has taken a step already.
    pub fn momentum_buffer(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(id.index())?.as_ref()?.buf.as_ref()
    }
}

impl Optimizer for Sgd {
    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }

    fn step(&mut self, params: &mut ParamStore) -> Result<()> {
        if self.slots.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "sgd parameter slots",
                got: self.slots.len(),
                expected: params.len(),
            });
        }

        let groups = &self.groups;

        params
            .as_mut_slice()
            .par_iter_mut()
            .zip(self.slots.par_iter_mut())
            .for_each(|(param, slot)| {
                let Some(slot) = slot else {
                    return;
                };

                let group = &groups[slot.group];
                let (value, grad) = param.split_mut();

                let mut d = grad.clone();
                if group.weight_decay != 0.0 {
                    d.scaled_add(group.weight_decay, &*value);
                }

                if let Some(mu) = group.momentum.filter(|&mu| mu != 0.0) {
                    let buf = match slot.buf.take() {
                        Some(mut buf) => {
                            buf.mapv_inplace(|b| b * mu);
                            buf += &d;
                            buf
                        }
                        None => d.clone(),
                    };

                    if group.nesterov {
                        d.scaled_add(mu, &buf);
                    } else {
                        d.assign(&buf);
                    }

                    slot.buf = Some(buf);
                }

                value.scaled_add(-group.lr, &d);
            });

        Ok(())
    }
}
