use ndarray::{Array2, Array4, Axis};

use crate::{MlErr, Result};

/// Averages every channel of a `[B, C, H, W]` input into a `[B, C]` output.
#[derive(Debug, Default, Clone)]
pub struct GlobalAvgPool {
    shape: Option<(usize, usize, usize, usize)>,
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: &Array4<f32>) -> Result<Array2<f32>> {
        let (b, c, h, w) = x.dim();
        if h * w == 0 {
            return Err(MlErr::InvalidInput("pooling over an empty image"));
        }

        let flat = x.to_shape((b, c, h * w))?;
        let pooled = flat.sum_axis(Axis(2)) / (h * w) as f32;

        self.shape = Some((b, c, h, w));
        Ok(pooled)
    }

    /// Spreads `d` evenly back over the pooled pixels.
    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array4<f32>> {
        let (b, c, h, w) = self.shape.take().ok_or(MlErr::MissingForward("pooling"))?;
        let scale = 1.0 / (h * w) as f32;

        Ok(Array4::from_shape_fn((b, c, h, w), |(i, j, _, _)| d[[i, j]] * scale))
    }
}
