use half::f16;
use log::debug;
use ndarray::Array4;
use rayon::prelude::*;

use super::Precision;
use crate::{MlErr, Result, optimization::Optimizer, params::ParamStore};

/// Dynamic loss scaling knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradScalerConfig {
    pub init_scale: f32,
    pub growth_factor: f32,
    pub backoff_factor: f32,
    /// Consecutive finite steps before the scale grows.
    pub growth_interval: u32,
}

impl Default for GradScalerConfig {
    fn default() -> Self {
        Self {
            init_scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
        }
    }
}

/// Half precision emulation with dynamic loss scaling.
///
/// Inputs are rounded through `f16` and a scaled gradient that does not fit
/// in `f16` counts as an overflow, which skips the optimizer step and backs
/// the scale off. A disabled scaler runs everything in `f32` untouched.
#[derive(Debug, Clone)]
pub struct GradScaler {
    enabled: bool,
    cfg: GradScalerConfig,
    scale: f32,
    growth_tracker: u32,
    unscaled: bool,
    found_inf: bool,
}

impl GradScaler {
    pub fn new(enabled: bool) -> Self {
        Self::with_config(enabled, GradScalerConfig::default())
    }

    pub fn with_config(enabled: bool, cfg: GradScalerConfig) -> Self {
        Self {
            enabled,
            scale: cfg.init_scale,
            cfg,
            growth_tracker: 0,
            unscaled: false,
            found_inf: false,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }
}

impl Precision for GradScaler {
    fn autocast(&self, x: &mut Array4<f32>) {
        if self.enabled {
            x.par_mapv_inplace(|v| f16::from_f32(v).to_f32());
        }
    }

    fn loss_scale(&self) -> f32 {
        if self.enabled { self.scale } else { 1.0 }
    }

    fn unscale(&mut self, params: &mut ParamStore) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.unscaled {
            return Err(MlErr::UnscaleTwice);
        }

        let inv = 1.0 / self.scale;
        let found_inf = params
            .as_mut_slice()
            .par_iter_mut()
            .filter(|p| p.learnable())
            .map(|p| {
                let mut overflow = false;
                p.grad_mut().mapv_inplace(|g| {
                    overflow |= !g.is_finite() || f16::from_f32(g).is_infinite();
                    g * inv
                });
                overflow
            })
            .reduce(|| false, |a, b| a || b);

        self.found_inf = found_inf;
        self.unscaled = true;
        Ok(())
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer, params: &mut ParamStore) -> Result<bool> {
        if !self.enabled {
            optimizer.step(params)?;
            return Ok(true);
        }

        if !self.unscaled {
            self.unscale(params)?;
        }

        if self.found_inf {
            debug!(scale = self.scale; "skipping optimizer step on non-finite gradients");
            return Ok(false);
        }

        optimizer.step(params)?;
        Ok(true)
    }

    fn update(&mut self) {
        if !self.enabled {
            return;
        }

        if self.found_inf {
            self.scale *= self.cfg.backoff_factor;
            self.growth_tracker = 0;
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker == self.cfg.growth_interval {
                self.scale *= self.cfg.growth_factor;
                self.growth_tracker = 0;
            }
        }

        self.unscaled = false;
        self.found_inf = false;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;
    use crate::optimization::{GroupedParams, Sgd, SgdConfig};

    fn setup(grad: f32) -> (ParamStore, Sgd) {
        let mut store = ParamStore::new();
        let id = store.register("w", arr1(&[1.0]).into_dyn(), true);
        store.get_mut(id).unwrap().grad_mut().fill(grad);

        let grouped = GroupedParams {
            weights: vec![id],
            ..Default::default()
        };
        let cfg = SgdConfig {
            lr: 0.1,
            momentum: 0.9,
            weight_decay: 0.0,
            nesterov: true,
        };
        let sgd = Sgd::new(grouped, &store, cfg).unwrap();
        (store, sgd)
    }

    #[test]
    fn disabled_scaler_is_a_passthrough() {
        let (mut store, mut sgd) = setup(1.0);
        let mut scaler = GradScaler::new(false);
        assert!(!scaler.is_enabled());

        let mut x = Array4::from_elem((1, 1, 1, 1), 0.1f32);
        scaler.autocast(&mut x);
        assert_eq!(x[[0, 0, 0, 0]], 0.1);
        assert_eq!(scaler.loss_scale(), 1.0);

        scaler.unscale(&mut store).unwrap();
        scaler.unscale(&mut store).unwrap();
        assert!(scaler.step(&mut sgd, &mut store).unwrap());
        assert!(store.as_slice()[0].value()[[0]] < 1.0);
    }

    #[test]
    fn finite_step_unscales_gradients() {
        let (mut store, mut sgd) = setup(1024.0);
        let mut scaler = GradScaler::with_config(
            true,
            GradScalerConfig {
                init_scale: 1024.0,
                ..Default::default()
            },
        );

        assert!(scaler.step(&mut sgd, &mut store).unwrap());
        assert_eq!(store.as_slice()[0].grad()[[0]], 1.0);

        scaler.update();
        assert_eq!(scaler.scale(), 1024.0);
    }

    #[test]
    fn overflow_skips_the_step_and_backs_off() {
        let (mut store, mut sgd) = setup(1e6);
        let mut scaler = GradScaler::new(true);

        assert!(!scaler.step(&mut sgd, &mut store).unwrap());
        assert_eq!(store.as_slice()[0].value()[[0]], 1.0);

        scaler.update();
        assert_eq!(scaler.scale(), 32768.0);
    }

    #[test]
    fn scale_grows_after_interval() {
        let (mut store, mut sgd) = setup(0.0);
        let mut scaler = GradScaler::with_config(
            true,
            GradScalerConfig {
                growth_interval: 2,
                ..Default::default()
            },
        );

        for _ in 0..2 {
            assert!(scaler.step(&mut sgd, &mut store).unwrap());
            scaler.update();
        }

        assert_eq!(scaler.scale(), 131072.0);
    }

    #[test]
    fn unscaling_twice_is_an_error() {
        let (mut store, _) = setup(1.0);
        let mut scaler = GradScaler::new(true);

        scaler.unscale(&mut store).unwrap();
        assert!(matches!(
            scaler.unscale(&mut store),
            Err(MlErr::UnscaleTwice)
        ));

        scaler.update();
        assert!(scaler.unscale(&mut store).is_ok());
    }

    #[test]
    fn autocast_rounds_through_half_precision() {
        let scaler = GradScaler::new(true);
        let mut x = Array4::from_elem((1, 1, 1, 1), 0.1f32);

        scaler.autocast(&mut x);

        assert_eq!(x[[0, 0, 0, 0]], f16::from_f32(0.1).to_f32());
        assert_ne!(x[[0, 0, 0, 0]], 0.1);
    }
}
