//! Sampling and scoring with a trained energy network.
//!
//! `EnergySampler` pairs a loaded model with a Langevin sampler so saved
//! checkpoints can be inspected after training: long-run chains from noise or
//! data show what the model's steady state looks like, and `energies` scores
//! arbitrary states.

use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use crate::data::PositiveSource;
use crate::error::EbmError;
use crate::model::bridge::tensor_to_vec;
use crate::model::EnergyFunction;
use crate::sampling::{InitSources, InitType, SampleRequest, ShortRunOutput, ShortRunSampler};
use crate::training::artifacts::load_checkpoint;

/// A trained energy network ready for sampling.
///
/// Convention: **lower energy = more likely** under the model.
pub struct EnergySampler<B: AutodiffBackend, M> {
    model: M,
    sampler: ShortRunSampler,
    device: B::Device,
}

impl<B, M> EnergySampler<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EnergyFunction<B>,
    M::InnerModule: EnergyFunction<B::InnerBackend>,
{
    /// Wrap an in-memory model. Its parameters stop tracking gradients.
    pub fn new(model: M, sampler: ShortRunSampler, device: B::Device) -> Self {
        Self {
            model: model.no_grad(),
            sampler,
            device,
        }
    }

    /// Load weights from a checkpoint into a freshly initialized `model`.
    pub fn load(
        path: &Path,
        model: M,
        sampler: ShortRunSampler,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let model = load_checkpoint::<B, M>(model, path, &device)?;
        tracing::info!(path = %path.display(), "Loaded energy network");
        Ok(Self::new(model, sampler, device))
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Energies of a batch of states, one per state.
    pub fn energies(&self, states: Tensor<B::InnerBackend, 4>) -> Vec<f64> {
        if states.dims()[0] == 0 {
            return vec![];
        }
        tensor_to_vec(self.model.valid().energy(states))
    }

    /// Run `steps` Langevin steps on `batch_size` fresh chains.
    ///
    /// # Errors
    /// `InvalidConfiguration` for persistent init, since chain banks are not
    /// part of a checkpoint, and for zero steps.
    pub fn sample<S, R>(
        &self,
        steps: usize,
        init: InitType,
        batch_size: usize,
        positives: &S,
        rng: &mut R,
    ) -> Result<ShortRunOutput<B::InnerBackend>, EbmError>
    where
        S: PositiveSource<B::InnerBackend>,
        R: Rng + ?Sized,
    {
        if init == InitType::Persistent {
            return Err(EbmError::config(
                "persistent init needs the training chain bank; use data, uniform or gaussian",
            ));
        }
        let mut sources = InitSources::new(None, positives);
        let request = SampleRequest {
            steps,
            init,
            batch_size,
            update_bank: false,
        };
        self.sampler
            .sample::<B, _, _, _>(&self.model, request, &mut sources, rng, &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ToyConfig, ToyDistribution, ToySource};
    use crate::model::bridge::points_to_states;
    use crate::model::{ToyNet, ToyNetConfig};
    use crate::training::artifacts::ExperimentDir;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn sampler(device: &<TestBackend as Backend>::Device) -> EnergySampler<TestBackend, ToyNet<TestBackend>> {
        let model = ToyNetConfig::new().with_n_f(8).init(device);
        EnergySampler::new(model, ShortRunSampler::new(0.05, 1.0, [2, 1, 1]), device.clone())
    }

    fn toy_source() -> ToySource {
        ToySource::new(ToyDistribution::new(&ToyConfig::default()).unwrap())
    }

    #[test]
    fn test_longrun_shape() {
        let device = Default::default();
        let sampler = sampler(&device);
        let out = sampler
            .sample(20, InitType::Gaussian, 12, &toy_source(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(out.states.dims(), [12, 2, 1, 1]);
        assert!(out.grad_norm.is_finite());
    }

    #[test]
    fn test_persistent_rejected() {
        let device = Default::default();
        let err = sampler(&device)
            .sample(5, InitType::Persistent, 4, &toy_source(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, EbmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_energies() {
        let device = Default::default();
        let sampler = sampler(&device);
        let states = points_to_states(&[[0.0, 0.0], [1.0, 1.0], [-1.0, 0.5]], &device);
        let energies = sampler.energies(states);
        assert_eq!(energies.len(), 3);
        assert!(energies.iter().all(|e| e.is_finite()));
    }

    #[test]
    fn test_load_matches_saved_model() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExperimentDir::create(&tmp.path().join("exp"), true).unwrap();
        let device = Default::default();
        let saved = sampler(&device);
        let path = dir.save_checkpoint::<TestBackend, _>(saved.model(), 1, 1e-4).unwrap();

        let loaded = EnergySampler::<TestBackend, _>::load(
            &path,
            ToyNetConfig::new().with_n_f(8).init(&device),
            ShortRunSampler::new(0.05, 1.0, [2, 1, 1]),
            device,
        )
        .unwrap();

        let points = points_to_states(&[[0.2, -0.4], [0.9, 0.1]], &device);
        assert_eq!(saved.energies(points.clone()), loaded.energies(points));
    }
}
