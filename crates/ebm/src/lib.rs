//! Energy-Based Model (EBM) training by maximum likelihood with short-run MCMC.
//!
//! Negative samples come from a few steps of Langevin dynamics started from a
//! persistent chain bank, data, or noise. The trainer contrasts the energy of
//! data against those samples and follows the gradient of the energy
//! difference. Works for image datasets and 2D toy distributions.

pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod sampling;
pub mod training;
pub mod viz;

pub use error::EbmError;
