use ndarray::Array2;

use crate::{MlErr, Result};

#[inline]
fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// The `x · sigmoid(x)` activation.
#[derive(Debug, Default, Clone)]
pub struct Silu {
    z: Option<Array2<f32>>,
}

impl Silu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, z: Array2<f32>) -> Array2<f32> {
        let a = z.mapv(|z| z * sigmoid(z));
        self.z = Some(z);
        a
    }

    pub fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        let z = self.z.take().ok_or(MlErr::MissingForward("silu"))?;

        d.zip_mut_with(&z, |d, &z| {
            let s = sigmoid(z);
            *d *= s * (1.0 + z * (1.0 - s));
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn derivative_matches_finite_differences() {
        let z = arr2(&[[-3.0, -0.5, 0.0, 0.7, 4.0]]);
        let mut act = Silu::new();
        act.forward(z.clone());
        let d = act.backward(Array2::ones(z.raw_dim())).unwrap();

        let h = 1e-3;
        for (i, &z) in z.iter().enumerate() {
            let numeric = ((z + h) * sigmoid(z + h) - (z - h) * sigmoid(z - h)) / (2.0 * h);
            assert!((numeric - d[[0, i]]).abs() < 1e-3);
        }
    }
}
