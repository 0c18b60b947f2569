//! Short-run MCMC: the persistent chain bank, the initialization policy and
//! the Langevin sampler that turns initial states into negative samples.

pub mod bank;
pub mod init;
pub mod langevin;
pub mod noise;

pub use bank::PersistentBank;
pub use init::{InitSources, InitType};
pub use langevin::{frozen, SampleRequest, ShortRunOutput, ShortRunSampler};
