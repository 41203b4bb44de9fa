use crate::Result;

/// Held-out evaluation run once per epoch, synchronously, on the model being
/// trained.
pub trait Validator<M> {
    fn validate(&mut self, model: &mut M) -> Result<()>;
}

impl<M, F> Validator<M> for F
where
    F: FnMut(&mut M) -> Result<()>,
{
    fn validate(&mut self, model: &mut M) -> Result<()> {
        self(model)
    }
}
