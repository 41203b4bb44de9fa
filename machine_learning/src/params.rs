use std::ops::Index;

use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;

use crate::{MlErr, Result};

/// Handle to a tensor registered in a `ParamStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    /// The position of the tensor inside its store.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A model tensor together with its gradient buffer.
///
/// Tensors that are not `learnable` are buffers (running statistics and
/// such): they live next to the parameters but no optimizer ever touches them.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    value: ArrayD<f32>,
    grad: ArrayD<f32>,
    learnable: bool,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    pub fn grad(&self) -> &ArrayD<f32> {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.grad
    }

    #[inline]
    pub fn learnable(&self) -> bool {
        self.learnable
    }

    /// Amount of scalars in this tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Borrows the value and the gradient at the same time.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut ArrayD<f32>, &mut ArrayD<f32>) {
        (&mut self.value, &mut self.grad)
    }

    #[inline]
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Owns every tensor of a model, indexed by `ParamId`.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    params: Vec<Param>,
}

impl ParamStore {
    /// Creates an empty `ParamStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new tensor and returns its handle.
    ///
    /// # Arguments
    /// * `name` - A dotted path naming the tensor, used in logs.
    /// * `value` - The initial value.
    /// * `learnable` - Whether optimizers should update it.
    ///
    /// # Returns
    /// The id of the new tensor.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        value: ArrayD<f32>,
        learnable: bool,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        let grad = ArrayD::zeros(IxDyn(value.shape()));

        self.params.push(Param {
            name: name.into(),
            value,
            grad,
            learnable,
        });

        id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the tensor behind `id`.
    ///
    /// # Errors
    /// `MlErr::UnknownParam` if `id` was not issued by this store.
    pub fn get(&self, id: ParamId) -> Result<&Param> {
        let len = self.params.len();
        self.params
            .get(id.0)
            .ok_or(MlErr::UnknownParam { id: id.0, len })
    }

    /// Returns the tensor behind `id` mutably.
    ///
    /// # Errors
    /// `MlErr::UnknownParam` if `id` was not issued by this store.
    pub fn get_mut(&mut self, id: ParamId) -> Result<&mut Param> {
        let len = self.params.len();
        self.params
            .get_mut(id.0)
            .ok_or(MlErr::UnknownParam { id: id.0, len })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Param)> {
        self.params.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    /// Ids of every learnable tensor, in registration order.
    pub fn learnable(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.iter().filter(|(_, p)| p.learnable).map(|(id, _)| id)
    }

    /// Total amount of learnable scalars.
    pub fn num_learnable(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.learnable)
            .map(Param::len)
            .sum()
    }

    pub fn as_slice(&self) -> &[Param] {
        &self.params
    }

    pub fn as_mut_slice(&mut self) -> &mut [Param] {
        &mut self.params
    }

    /// Zeroes the gradient of every tensor.
    pub fn zero_grad(&mut self) {
        self.params.par_iter_mut().for_each(Param::zero_grad);
    }
}

impl Index<ParamId> for ParamStore {
    type Output = Param;

    fn index(&self, id: ParamId) -> &Self::Output {
        &self.params[id.0]
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn register_issues_sequential_ids() {
        let mut store = ParamStore::new();
        let a = store.register("a", arr1(&[1.0, 2.0]).into_dyn(), true);
        let b = store.register("b", arr1(&[0.0]).into_dyn(), false);

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(store[a].name(), "a");
        assert_eq!(store[a].grad().shape(), &[2]);
        assert_eq!(store.learnable().collect::<Vec<_>>(), vec![a]);
        assert_eq!(store.num_learnable(), 2);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut other = ParamStore::new();
        other.register("x", arr1(&[1.0]).into_dyn(), true);
        let id = other.register("y", arr1(&[1.0]).into_dyn(), true);

        let store = ParamStore::new();
        assert!(matches!(
            store.get(id),
            Err(MlErr::UnknownParam { id: 1, len: 0 })
        ));
    }

    #[test]
    fn zero_grad_clears_every_tensor() {
        let mut store = ParamStore::new();
        let a = store.register("a", arr1(&[1.0, 2.0]).into_dyn(), true);
        let b = store.register("b", arr1(&[3.0]).into_dyn(), false);
        store.get_mut(a).unwrap().grad_mut().fill(4.0);
        store.get_mut(b).unwrap().grad_mut().fill(4.0);

        store.zero_grad();

        assert!(store[a].grad().iter().all(|&g| g == 0.0));
        assert!(store[b].grad().iter().all(|&g| g == 0.0));
    }
}
