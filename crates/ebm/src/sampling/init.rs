//! Initialization policy for short-run chains.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::bank::PersistentBank;
use super::noise::{gaussian_states, uniform_states};
use crate::data::PositiveSource;
use crate::error::EbmError;

/// Where a short-run chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitType {
    /// Resume chains from distinct random slots of the persistent bank.
    Persistent,
    /// Start from a fresh positive batch.
    Data,
    /// I.i.d. uniform noise in `[-s, s]`.
    Uniform,
    /// I.i.d. normal noise with standard deviation `s`.
    Gaussian,
}

impl InitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Data => "data",
            Self::Uniform => "uniform",
            Self::Gaussian => "gaussian",
        }
    }
}

impl fmt::Display for InitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitType {
    type Err = EbmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistent" => Ok(Self::Persistent),
            "data" => Ok(Self::Data),
            "uniform" => Ok(Self::Uniform),
            "gaussian" => Ok(Self::Gaussian),
            other => Err(EbmError::config(format!(
                "unknown init type '{other}' (expected persistent, data, uniform or gaussian)"
            ))),
        }
    }
}

/// What a chain may be initialized from. The bank is borrowed mutably so the
/// sampler can write finished persistent chains back.
pub struct InitSources<'a, B: Backend, S> {
    pub bank: Option<&'a mut PersistentBank<B>>,
    pub positives: &'a S,
}

impl<'a, B: Backend, S> InitSources<'a, B, S> {
    pub fn new(bank: Option<&'a mut PersistentBank<B>>, positives: &'a S) -> Self {
        Self { bank, positives }
    }
}

/// Build the starting states for `batch_size` chains.
///
/// Returns the states and, for persistent init only, the bank indices they
/// were read from.
pub(crate) fn initial_states<B, S, R>(
    init: InitType,
    batch_size: usize,
    state_shape: [usize; 3],
    scale: f64,
    sources: &InitSources<'_, B, S>,
    rng: &mut R,
    device: &B::Device,
) -> Result<(Tensor<B, 4>, Option<Vec<usize>>), EbmError>
where
    B: Backend,
    S: PositiveSource<B>,
    R: Rng + ?Sized,
{
    let [c, h, w] = state_shape;
    let shape = [batch_size, c, h, w];
    match init {
        InitType::Persistent => {
            let bank = sources
                .bank
                .as_deref()
                .ok_or_else(|| EbmError::config("persistent init requires a chain bank"))?;
            let (states, indices) = bank.sample(batch_size, rng)?;
            Ok((states, Some(indices)))
        }
        InitType::Data => Ok((sources.positives.sample(batch_size, rng, device)?, None)),
        InitType::Uniform => Ok((uniform_states(shape, scale, rng, device), None)),
        InitType::Gaussian => Ok((gaussian_states(shape, scale, rng, device), None)),
    }
}
