//! Persistent chain bank: the carried state of the MCMC chains across
//! training iterations.
//!
//! One slot per chain, addressed by a stable index. Capacity is fixed at
//! creation; the only mutation is an in-place overwrite of selected slots.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;

use crate::error::EbmError;
use crate::sampling::noise::uniform_states;

/// Fixed-capacity store of chain states, shape `(capacity, c, h, w)`.
#[derive(Debug, Clone)]
pub struct PersistentBank<B: Backend> {
    states: Tensor<B, 4>,
}

impl<B: Backend> PersistentBank<B> {
    /// Create a bank of `capacity` chains filled with uniform noise in `[-1, 1]`.
    pub fn initialize<R: Rng + ?Sized>(
        capacity: usize,
        state_shape: [usize; 3],
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let [c, h, w] = state_shape;
        Self {
            states: uniform_states([capacity, c, h, w], 1.0, rng, device),
        }
    }

    /// Wrap existing states as a bank.
    pub fn from_states(states: Tensor<B, 4>) -> Self {
        Self { states }
    }

    /// Number of chains.
    pub fn capacity(&self) -> usize {
        self.states.dims()[0]
    }

    /// Shape of one chain state, `[c, h, w]`.
    pub fn state_shape(&self) -> [usize; 3] {
        let [_, c, h, w] = self.states.dims();
        [c, h, w]
    }

    /// Draw `k` distinct chain indices uniformly at random and return their states.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `k` exceeds the bank capacity.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        k: usize,
        rng: &mut R,
    ) -> Result<(Tensor<B, 4>, Vec<usize>), EbmError> {
        let capacity = self.capacity();
        if k > capacity {
            return Err(EbmError::config(format!(
                "cannot draw {k} persistent chains from a bank of {capacity}"
            )));
        }
        let indices = rand::seq::index::sample(rng, capacity, k).into_vec();
        Ok((self.gather(&indices), indices))
    }

    /// States at the given indices, in the given order.
    pub fn gather(&self, indices: &[usize]) -> Tensor<B, 4> {
        let device = self.states.device();
        let idx: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let idx = Tensor::<B, 1, Int>::from_data(TensorData::new(idx, [indices.len()]), &device);
        self.states.clone().select(0, idx)
    }

    /// Overwrite the chains at `indices` with the rows of `values`, in order.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the row count or state shape does not match,
    /// or an index is out of range.
    pub fn write(&mut self, indices: &[usize], values: Tensor<B, 4>) -> Result<(), EbmError> {
        let [rows, c, h, w] = values.dims();
        if rows != indices.len() {
            return Err(EbmError::config(format!(
                "bank write got {rows} states for {} indices",
                indices.len()
            )));
        }
        if [c, h, w] != self.state_shape() {
            return Err(EbmError::config(format!(
                "bank holds states of shape {:?}, got {:?}",
                self.state_shape(),
                [c, h, w]
            )));
        }
        let capacity = self.capacity();
        if let Some(&bad) = indices.iter().find(|&&i| i >= capacity) {
            return Err(EbmError::config(format!(
                "bank index {bad} out of range for capacity {capacity}"
            )));
        }

        // Take the storage out so slice_assign can reuse the buffer in place.
        let device = self.states.device();
        let mut states = std::mem::replace(&mut self.states, Tensor::zeros([1, 1, 1, 1], &device));
        for (row, &index) in indices.iter().enumerate() {
            let value = values.clone().slice([row..row + 1]);
            states = states.slice_assign([index..index + 1], value);
        }
        self.states = states;
        Ok(())
    }

    /// The first `n` chains, for visualization.
    pub fn head(&self, n: usize) -> Tensor<B, 4> {
        let n = n.min(self.capacity());
        self.states.clone().slice([0..n])
    }

    /// All chain states.
    pub fn states(&self) -> &Tensor<B, 4> {
        &self.states
    }
}
