//! Energy functions: the scalar-valued networks whose input gradient drives
//! Langevin sampling and whose parameters are trained by the ML loss.

pub mod bridge;
pub mod kind;
pub mod nonlocal;
pub mod toy;
pub mod vanilla;

use burn::prelude::*;

pub use kind::NetType;
pub use nonlocal::{NonlocalNet, NonlocalNetConfig};
pub use toy::{ToyNet, ToyNetConfig};
pub use vanilla::{VanillaNet, VanillaNetConfig};

/// A differentiable map from a batch of states to one energy per state.
///
/// Input shape: `(batch, channels, height, width)`; toy states use
/// `(batch, 2, 1, 1)`. Output shape: `(batch,)`. Lower energy = more likely.
pub trait EnergyFunction<B: Backend> {
    fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1>;
}
