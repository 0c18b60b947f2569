//! Maximum-likelihood loss for short-run MCMC training.
//!
//! Convention: lower energy = more likely. Descending
//! `mean f(x_data) − mean f(x_sample)` lowers the energy of data and raises
//! the energy of the sampler's states.

use burn::prelude::*;

/// ML loss `d_s_t = mean(pos_energy) − mean(neg_energy)`, scaled by `2/ε²`
/// when `epsilon > 0`.
///
/// # Arguments
/// - `pos_energy`: shape `(batch,)`, energies of positive (data) states
/// - `neg_energy`: shape `(batch,)`, energies of short-run samples
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn ml_loss<B: Backend>(
    pos_energy: Tensor<B, 1>,
    neg_energy: Tensor<B, 1>,
    epsilon: f64,
) -> Tensor<B, 1> {
    let diff = pos_energy.mean() - neg_energy.mean();
    if epsilon > 0.0 {
        diff * (2.0 / (epsilon * epsilon))
    } else {
        diff
    }
}
