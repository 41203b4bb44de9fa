use rayon::prelude::*;

use crate::{MlErr, Result, params::ParamStore};

/// Rescales the learnable gradients so that their global L2 norm is at most
/// `max_norm`.
///
/// # Arguments
/// * `params` - The tensors whose gradients get clipped.
/// * `max_norm` - The largest norm allowed.
///
/// # Returns
/// The norm before clipping. It is not finite when some gradient is not.
///
/// # Errors
/// `MlErr::InvalidInput` if `max_norm` is not positive.
pub fn clip_grad_norm(params: &mut ParamStore, max_norm: f32) -> Result<f32> {
    if max_norm.is_nan() || max_norm <= 0.0 {
        return Err(MlErr::InvalidInput("max gradient norm must be positive"));
    }

    let total = params
        .as_slice()
        .par_iter()
        .filter(|p| p.learnable())
        .map(|p| p.grad().iter().map(|g| g * g).sum::<f32>())
        .sum::<f32>()
        .sqrt();

    let coef = max_norm / (total + 1e-6);
    if coef < 1.0 {
        params
            .as_mut_slice()
            .par_iter_mut()
            .filter(|p| p.learnable())
            .for_each(|p| p.grad_mut().mapv_inplace(|g| g * coef));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn large_gradients_are_scaled_down() {
        let mut store = ParamStore::new();
        let a = store.register("a", arr1(&[0.0, 0.0]).into_dyn(), true);
        let b = store.register("b", arr1(&[0.0]).into_dyn(), true);
        store.get_mut(a).unwrap().grad_mut().assign(&arr1(&[3.0, 0.0]).into_dyn());
        store.get_mut(b).unwrap().grad_mut().assign(&arr1(&[4.0]).into_dyn());

        let norm = clip_grad_norm(&mut store, 1.0).unwrap();

        assert!((norm - 5.0).abs() < 1e-6);
        assert!((store[a].grad()[[0]] - 0.6).abs() < 1e-5);
        assert!((store[b].grad()[[0]] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn small_gradients_are_untouched() {
        let mut store = ParamStore::new();
        let a = store.register("a", arr1(&[0.0]).into_dyn(), true);
        store.get_mut(a).unwrap().grad_mut().fill(0.5);

        let norm = clip_grad_norm(&mut store, 10.0).unwrap();

        assert_eq!(norm, 0.5);
        assert_eq!(store[a].grad()[[0]], 0.5);
    }

    #[test]
    fn buffers_do_not_count() {
        let mut store = ParamStore::new();
        let a = store.register("a", arr1(&[0.0]).into_dyn(), true);
        let buf = store.register("running_var", arr1(&[0.0]).into_dyn(), false);
        store.get_mut(a).unwrap().grad_mut().fill(1.0);
        store.get_mut(buf).unwrap().grad_mut().fill(100.0);

        let norm = clip_grad_norm(&mut store, 10.0).unwrap();

        assert_eq!(norm, 1.0);
        assert_eq!(store[buf].grad()[[0]], 100.0);
    }

    #[test]
    fn non_positive_max_norm_is_rejected() {
        let mut store = ParamStore::new();
        assert!(clip_grad_norm(&mut store, 0.0).is_err());
    }
}
