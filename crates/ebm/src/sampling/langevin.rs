//! Short-run Langevin sampler.
//!
//! Each step computes the input gradient of the summed energy and moves
//! every chain by `x ← x − ∇f(x) + ε·N(0, I)`. The chain state lives on the
//! inner (non-autodiff) backend between steps; it is lifted onto the autodiff
//! backend only for the gradient of a single step, so the graph never spans
//! more than one step and the final states carry no graph at all.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use super::init::{initial_states, InitSources, InitType};
use super::noise::gaussian_states;
use crate::data::PositiveSource;
use crate::error::EbmError;
use crate::model::bridge::tensor_to_f64;
use crate::model::EnergyFunction;

/// Fixed sampler parameters for one run.
#[derive(Debug, Clone, Copy)]
pub struct ShortRunSampler {
    /// Langevin noise standard deviation.
    pub epsilon: f64,
    /// Scale of uniform/gaussian initial noise.
    pub noise_init_factor: f64,
    /// Shape of one state, `[c, h, w]`.
    pub state_shape: [usize; 3],
}

/// Parameters of a single sampling call.
#[derive(Debug, Clone, Copy)]
pub struct SampleRequest {
    /// Number of Langevin steps `L`.
    pub steps: usize,
    pub init: InitType,
    pub batch_size: usize,
    /// Write the final states back into the bank (persistent init only).
    pub update_bank: bool,
}

/// Result of one sampling call.
#[derive(Debug, Clone)]
pub struct ShortRunOutput<B: Backend> {
    /// Final, graph-free states.
    pub states: Tensor<B, 4>,
    /// Batch-mean per-sample gradient L2 norm, averaged over steps.
    pub grad_norm: f64,
    /// Bank indices the chains started from (persistent init only).
    pub indices: Option<Vec<usize>>,
}

impl ShortRunSampler {
    pub fn new(epsilon: f64, noise_init_factor: f64, state_shape: [usize; 3]) -> Self {
        Self {
            epsilon,
            noise_init_factor,
            state_shape,
        }
    }

    /// Run `request.steps` Langevin steps on `request.batch_size` chains.
    ///
    /// # Errors
    /// - `InvalidConfiguration` for zero steps, persistent init without a
    ///   bank, or a batch larger than the bank or dataset.
    /// - `MissingInputGradient` if the energy does not depend on its input.
    pub fn sample<B, F, S, R>(
        &self,
        energy: &F,
        request: SampleRequest,
        sources: &mut InitSources<'_, B::InnerBackend, S>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<ShortRunOutput<B::InnerBackend>, EbmError>
    where
        B: AutodiffBackend,
        F: EnergyFunction<B>,
        S: PositiveSource<B::InnerBackend>,
        R: Rng + ?Sized,
    {
        if request.steps == 0 {
            return Err(EbmError::config("number of Langevin steps must be at least 1"));
        }

        let (mut state, indices) = initial_states(
            request.init,
            request.batch_size,
            self.state_shape,
            self.noise_init_factor,
            sources,
            rng,
            device,
        )?;
        let shape = state.dims();

        let mut norm_sum = Tensor::<B::InnerBackend, 1>::zeros([1], device);
        for _ in 0..request.steps {
            let grad = input_gradient(energy, state.clone())?;

            let per_sample = grad.clone().flatten::<2>(1, 3).powf_scalar(2.0).sum_dim(1).sqrt();
            norm_sum = norm_sum + per_sample.mean();

            state = state - grad;
            if self.epsilon != 0.0 {
                state = state + gaussian_states(shape, self.epsilon, rng, device);
            }
        }
        let grad_norm = tensor_to_f64(norm_sum) / request.steps as f64;

        if request.init == InitType::Persistent && request.update_bank {
            if let (Some(bank), Some(idx)) = (sources.bank.as_deref_mut(), indices.as_deref()) {
                bank.write(idx, state.clone())?;
            }
        }

        Ok(ShortRunOutput {
            states: state,
            grad_norm,
            indices,
        })
    }
}

/// Copy of `model` with parameter tracking switched off.
///
/// Langevin steps differentiate with respect to the chain states only; a
/// trainable model would also build weight gradients on every step. Take a
/// fresh copy after each optimizer step so sampling sees current weights.
pub fn frozen<B: AutodiffBackend, M: AutodiffModule<B>>(model: &M) -> M {
    model.clone().no_grad()
}

/// `∇ₓ Σᵢ f(xᵢ)` evaluated at `state`, returned on the inner backend.
fn input_gradient<B, F>(
    energy: &F,
    state: Tensor<B::InnerBackend, 4>,
) -> Result<Tensor<B::InnerBackend, 4>, EbmError>
where
    B: AutodiffBackend,
    F: EnergyFunction<B>,
{
    let (x, grads) = backward_at(energy, state);
    x.grad(&grads).ok_or(EbmError::MissingInputGradient)
}

/// Reverse pass of the summed energy at `state`, tracking the input.
fn backward_at<B, F>(energy: &F, state: Tensor<B::InnerBackend, 4>) -> (Tensor<B, 4>, B::Gradients)
where
    B: AutodiffBackend,
    F: EnergyFunction<B>,
{
    let x = Tensor::<B, 4>::from_inner(state).require_grad();
    let grads = energy.energy(x.clone()).sum().backward();
    (x, grads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ToyConfig, ToyDistribution, ToySource};
    use crate::model::bridge::{points_to_states, tensor_to_flat};
    use crate::model::{ToyNet, ToyNetConfig};
    use crate::sampling::PersistentBank;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::module::Param;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    type TestBackend = Autodiff<NdArray<f32>>;
    type Inner = NdArray<f32>;

    /// `f(x) = ½‖x − b‖²` with a trainable centre `b`.
    #[derive(Module, Debug)]
    struct Centered<B: Backend> {
        center: Param<Tensor<B, 1>>,
    }

    impl<B: Backend> EnergyFunction<B> for Centered<B> {
        fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
            let x: Tensor<B, 2> = x.flatten(1, 3);
            let diff = x - self.center.val().unsqueeze::<2>();
            diff.powf_scalar(2.0).sum_dim(1).squeeze::<1>(1) * 0.5
        }
    }

    /// `f(x) = ½‖x‖²`, so `∇f(x) = x`.
    struct Quadratic;

    impl<B: Backend> EnergyFunction<B> for Quadratic {
        fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
            x.powf_scalar(2.0).flatten::<2>(1, 3).sum_dim(1).squeeze::<1>(1) * 0.5
        }
    }

    fn toy_source() -> ToySource {
        ToySource::new(ToyDistribution::new(&ToyConfig::default()).unwrap())
    }

    fn toy_net(device: &<TestBackend as Backend>::Device) -> ToyNet<TestBackend> {
        ToyNetConfig::new().with_n_f(8).init(device)
    }

    fn request(steps: usize, init: InitType, batch_size: usize) -> SampleRequest {
        SampleRequest {
            steps,
            init,
            batch_size,
            update_bank: true,
        }
    }

    #[test]
    fn test_uniform_init_shape_and_bank_untouched() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let mut rng = StdRng::seed_from_u64(0);
        let mut bank = PersistentBank::<Inner>::initialize(20, [2, 1, 1], &mut rng, &device);
        let before = tensor_to_flat(bank.states().clone());

        let sampler = ShortRunSampler::new(0.01, 1.0, [2, 1, 1]);
        for init in [InitType::Uniform, InitType::Gaussian] {
            let mut sources = InitSources::new(Some(&mut bank), &source);
            let out = sampler
                .sample::<TestBackend, _, _, _>(&net, request(3, init, 6), &mut sources, &mut rng, &device)
                .unwrap();
            assert_eq!(out.states.dims(), [6, 2, 1, 1]);
            assert!(out.indices.is_none());
            assert!(out.grad_norm.is_finite());
        }
        assert_eq!(tensor_to_flat(bank.states().clone()), before);
    }

    #[test]
    fn test_persistent_write_back() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let mut rng = StdRng::seed_from_u64(4);
        let mut bank = PersistentBank::<Inner>::initialize(100, [2, 1, 1], &mut rng, &device);
        let before = tensor_to_flat(bank.states().clone());

        let sampler = ShortRunSampler::new(0.01, 1.0, [2, 1, 1]);
        let mut sources = InitSources::new(Some(&mut bank), &source);
        let out = sampler
            .sample::<TestBackend, _, _, _>(
                &net,
                request(5, InitType::Persistent, 10),
                &mut sources,
                &mut rng,
                &device,
            )
            .unwrap();

        let indices = out.indices.clone().unwrap();
        let unique: HashSet<usize> = indices.iter().copied().collect();
        assert_eq!(unique.len(), 10);
        assert!(indices.iter().all(|&i| i < 100));

        // Selected slots hold exactly the returned states.
        assert_eq!(tensor_to_flat(bank.gather(&indices)), tensor_to_flat(out.states));

        // Every other slot is unchanged.
        let after = tensor_to_flat(bank.states().clone());
        for slot in (0..100).filter(|s| !unique.contains(s)) {
            assert_eq!(&after[slot * 2..slot * 2 + 2], &before[slot * 2..slot * 2 + 2]);
        }
    }

    #[test]
    fn test_persistent_without_write_back() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let mut rng = StdRng::seed_from_u64(4);
        let mut bank = PersistentBank::<Inner>::initialize(30, [2, 1, 1], &mut rng, &device);
        let before = tensor_to_flat(bank.states().clone());

        let sampler = ShortRunSampler::new(0.01, 1.0, [2, 1, 1]);
        let mut sources = InitSources::new(Some(&mut bank), &source);
        let req = SampleRequest {
            update_bank: false,
            ..request(2, InitType::Persistent, 5)
        };
        sampler
            .sample::<TestBackend, _, _, _>(&net, req, &mut sources, &mut rng, &device)
            .unwrap();
        assert_eq!(tensor_to_flat(bank.states().clone()), before);
    }

    #[test]
    fn test_batch_larger_than_bank() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let mut rng = StdRng::seed_from_u64(0);
        let mut bank = PersistentBank::<Inner>::initialize(8, [2, 1, 1], &mut rng, &device);

        let sampler = ShortRunSampler::new(0.01, 1.0, [2, 1, 1]);
        let mut sources = InitSources::new(Some(&mut bank), &source);
        let err = sampler
            .sample::<TestBackend, _, _, _>(
                &net,
                request(1, InitType::Persistent, 9),
                &mut sources,
                &mut rng,
                &device,
            )
            .unwrap_err();
        assert!(matches!(err, EbmError::InvalidConfiguration(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_steps_rejected() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let mut sources = InitSources::<Inner, _>::new(None, &source);
        let err = ShortRunSampler::new(0.01, 1.0, [2, 1, 1])
            .sample::<TestBackend, _, _, _>(
                &net,
                request(0, InitType::Uniform, 4),
                &mut sources,
                &mut StdRng::seed_from_u64(0),
                &device,
            )
            .unwrap_err();
        assert!(matches!(err, EbmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_noise_free_step_is_gradient_descent() {
        let device = Default::default();
        let source = toy_source();
        let start = points_to_states::<Inner>(&[[3.0, 4.0]], &device);
        let mut bank = PersistentBank::from_states(start);

        // With ∇f(x) = x and no noise, one step maps every chain to zero.
        let sampler = ShortRunSampler::new(0.0, 1.0, [2, 1, 1]);
        let mut sources = InitSources::new(Some(&mut bank), &source);
        let out = sampler
            .sample::<TestBackend, _, _, _>(
                &Quadratic,
                request(1, InitType::Persistent, 1),
                &mut sources,
                &mut StdRng::seed_from_u64(0),
                &device,
            )
            .unwrap();

        assert_eq!(tensor_to_flat(out.states), vec![0.0, 0.0]);
        assert!((out.grad_norm - 5.0).abs() < 1e-5, "grad norm {}", out.grad_norm);
    }

    #[test]
    fn test_frozen_model_tracks_only_the_input() {
        let device = Default::default();
        let model = Centered::<TestBackend> {
            center: Param::from_tensor(Tensor::from_floats([1.0, -1.0], &device)),
        };
        let state = points_to_states::<Inner>(&[[3.0, 4.0], [0.0, 0.5]], &device);

        // The trainable model builds a weight gradient on every reverse pass.
        let (_, grads) = backward_at::<TestBackend, _>(&model, state.clone());
        assert!(model.center.val().grad(&grads).is_some());

        let sampling = frozen(&model);
        let (x, grads) = backward_at::<TestBackend, _>(&sampling, state.clone());
        assert!(sampling.center.val().grad(&grads).is_none());
        assert_eq!(
            tensor_to_flat(x.grad(&grads).unwrap()),
            vec![2.0, 5.0, -1.0, 1.5]
        );

        // The original keeps tracking its parameters for the ML update.
        let (_, grads) = backward_at::<TestBackend, _>(&model, state);
        assert!(model.center.val().grad(&grads).is_some());
    }

    #[test]
    fn test_same_seed_same_chains() {
        let device = Default::default();
        let net = toy_net(&device);
        let source = toy_source();
        let sampler = ShortRunSampler::new(0.05, 1.0, [2, 1, 1]);

        let run = |seed: u64| {
            let mut sources = InitSources::<Inner, _>::new(None, &source);
            sampler
                .sample::<TestBackend, _, _, _>(
                    &net,
                    request(4, InitType::Gaussian, 8),
                    &mut sources,
                    &mut StdRng::seed_from_u64(seed),
                    &device,
                )
                .unwrap()
        };
        let (a, b) = (run(21), run(21));
        assert_eq!(tensor_to_flat(a.states), tensor_to_flat(b.states));
        assert_eq!(a.grad_norm, b.grad_norm);
    }
}
