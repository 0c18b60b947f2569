//! Maximum-likelihood training loop with short-run Langevin negatives.
//!
//! Every iteration draws a positive batch, runs the short-run sampler from
//! the configured initialization, contrasts the energies of the two batches
//! and takes one optimizer step. The learning rate is annealed after every
//! step. Logging, checkpoints, sample grids and diagnostic plots are written
//! at `log_freq`; toy runs also render density landscapes at `log_viz_freq`.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::PositiveSource;
use crate::error::EbmError;
use crate::model::bridge::states_to_points;
use crate::model::EnergyFunction;
use crate::sampling::{frozen, InitSources, InitType, PersistentBank, SampleRequest, ShortRunSampler};
use crate::training::artifacts::ExperimentDir;
use crate::training::config::{ExperimentConfig, NonFinitePolicy, OptimizerType};
use crate::training::loss::ml_loss;
use crate::training::metrics::DiagnosticsRecord;
use crate::training::schedule::LrAnneal;
use crate::viz::{plot_diagnostics, plot_ims, Landscape};

/// State handed back when the loop finishes.
pub struct TrainOutput<B: AutodiffBackend, M> {
    pub model: M,
    pub record: DiagnosticsRecord,
    pub bank: PersistentBank<B::InnerBackend>,
    /// Annealed learning rate after the last iteration.
    pub lr: f64,
}

/// Run the training loop.
///
/// # Arguments
/// - `config`: validated experiment configuration
/// - `model`: freshly initialized energy network (consumed and returned trained)
/// - `positives`: data source; its state shape must match `config`
/// - `exp_dir`: output directory for checkpoints, images and plots
/// - `device`: burn device for all tensors
///
/// # Errors
/// `EbmError::InvalidConfiguration` for unusable settings (checked before
/// the first iteration), `EbmError::NonFinite` under the abort policy, and
/// I/O or recorder failures while writing artifacts.
pub fn train<B, M, S>(
    config: &ExperimentConfig,
    model: M,
    positives: &S,
    exp_dir: &ExperimentDir,
    device: &B::Device,
) -> anyhow::Result<TrainOutput<B, M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EnergyFunction<B>,
    M::InnerModule: EnergyFunction<B::InnerBackend>,
    S: PositiveSource<B::InnerBackend>,
{
    config.validate()?;
    match config.optimizer_type {
        OptimizerType::Adam => {
            let optimizer = AdamConfig::new().with_epsilon(1e-8).init::<B, M>();
            run::<B, M, _, S>(config, model, optimizer, positives, exp_dir, device)
        }
        OptimizerType::Sgd => {
            let optimizer = SgdConfig::new().init::<B, M>();
            run::<B, M, _, S>(config, model, optimizer, positives, exp_dir, device)
        }
    }
}

fn run<B, M, O, S>(
    config: &ExperimentConfig,
    mut model: M,
    mut optimizer: O,
    positives: &S,
    exp_dir: &ExperimentDir,
    device: &B::Device,
) -> anyhow::Result<TrainOutput<B, M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EnergyFunction<B>,
    M::InnerModule: EnergyFunction<B::InnerBackend>,
    O: Optimizer<M, B>,
    S: PositiveSource<B::InnerBackend>,
{
    let state_shape = positives.state_shape();
    if state_shape != config.state_shape() {
        return Err(EbmError::config(format!(
            "data states have shape {state_shape:?}, configuration expects {:?}",
            config.state_shape()
        ))
        .into());
    }

    let capacity = positives.num_examples().unwrap_or(config.bank_size);
    let uses_bank = config.shortrun_init == InitType::Persistent
        || (config.log_longrun && config.longrun_init == InitType::Persistent);
    if uses_bank && config.batch_size > capacity {
        return Err(EbmError::config(format!(
            "persistent batch of {} exceeds bank capacity {capacity}",
            config.batch_size
        ))
        .into());
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut bank = PersistentBank::<B::InnerBackend>::initialize(capacity, state_shape, &mut rng, device);
    let sampler = ShortRunSampler::new(config.epsilon, config.noise_init_factor, state_shape);
    let (lr_init, lr_min) = config.effective_lr();
    let mut anneal = LrAnneal::new(lr_init, lr_min, config.lr_decay);
    let mut record = DiagnosticsRecord::new(config.num_train_iters);

    tracing::info!(
        net = %config.net_type,
        optimizer = %config.optimizer_type,
        data = config.data.name(),
        lr_init,
        lr_min,
        epsilon = config.epsilon,
        batch_size = config.batch_size,
        shortrun_init = %config.shortrun_init,
        steps = config.num_shortrun_steps,
        state_shape = ?state_shape,
        bank_capacity = capacity,
        "Training has started"
    );

    let pb = if config.show_progress {
        let pb = ProgressBar::new(config.num_train_iters as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };
    let toy = positives.ground_truth();
    let train_start = Instant::now();

    for i in 0..config.num_train_iters {
        let iteration = i + 1;

        // Positive and negative samples
        let x_q = positives.sample(config.batch_size, &mut rng, device)?;
        let shortrun = {
            let mut sources = InitSources::new(Some(&mut bank), positives);
            let request = SampleRequest {
                steps: config.num_shortrun_steps,
                init: config.shortrun_init,
                batch_size: config.batch_size,
                update_bank: true,
            };
            sampler.sample::<B, _, _, _>(&frozen::<B, _>(&model), request, &mut sources, &mut rng, device)?
        };

        // ML update
        let pos_energy = model.energy(Tensor::from_inner(x_q));
        let neg_energy = model.energy(Tensor::from_inner(shortrun.states.clone()));
        let loss = ml_loss(pos_energy, neg_energy, config.epsilon);
        let d_s_t: f64 = loss.clone().into_scalar().elem();
        let r_s_t = shortrun.grad_norm;

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(anneal.lr(), model, grads);

        record.record(i, d_s_t, r_s_t);
        for (quantity, value) in [("d_s_t", d_s_t), ("r_s_t", r_s_t)] {
            if value.is_finite() {
                continue;
            }
            match config.nonfinite_policy {
                NonFinitePolicy::Abort => {
                    pb.abandon();
                    return Err(EbmError::NonFinite {
                        iteration,
                        quantity,
                        value,
                    }
                    .into());
                }
                NonFinitePolicy::Warn => {
                    tracing::warn!(iteration, quantity, value, "Non-finite training quantity");
                }
            }
        }

        let lr = anneal.step();

        if iteration == 1 || iteration % config.log_freq == 0 {
            tracing::info!(
                iteration,
                d_s_t = format!("{d_s_t:>14.9}"),
                r_s_t = format!("{r_s_t:>14.9}"),
                lr = format!("{lr:.2e}"),
                "Short-run diagnostics"
            );
            if toy.is_none() {
                plot_ims(
                    &exp_dir.shortrun().join(format!("x_s_t_{iteration:06}.png")),
                    shortrun.states.clone(),
                )?;
                if config.shortrun_init == InitType::Persistent {
                    plot_ims(
                        &exp_dir.shortrun().join(format!("x_s_t_0_{iteration:06}.png")),
                        bank.head(config.batch_size),
                    )?;
                }
            }
            exp_dir.save_checkpoint::<B, M>(&model, iteration, lr)?;
            if iteration > 1 {
                plot_diagnostics(&exp_dir.plots(), &record)?;
            }
        }

        if let Some(dist) = toy {
            if iteration % config.log_viz_freq == 0 {
                tracing::info!(iteration, "Visualizing true density, learned density and short-run KDE");
                let mut sources = InitSources::new(Some(&mut bank), positives);
                let request = SampleRequest {
                    steps: config.num_shortrun_steps,
                    init: config.shortrun_init,
                    batch_size: config.batch_size_kde,
                    update_bank: false,
                };
                let kde = sampler.sample::<B, _, _, _>(&frozen::<B, _>(&model), request, &mut sources, &mut rng, device)?;
                let inner = model.valid();
                Landscape::evaluate::<B::InnerBackend, _>(
                    dist,
                    &inner,
                    config.epsilon,
                    &states_to_points(kde.states),
                    config.kde_bw,
                    config.viz_res,
                    device,
                )
                .plot(&exp_dir.landscape().join(format!("toy_viz_{iteration:06}.png")))?;
            }
        }

        if config.log_longrun && iteration % config.log_longrun_freq == 0 {
            tracing::info!(
                iteration,
                steps = config.num_longrun_steps,
                "Generating long-run samples"
            );
            let mut sources = InitSources::new(Some(&mut bank), positives);
            let request = SampleRequest {
                steps: config.num_longrun_steps,
                init: config.longrun_init,
                batch_size: config.batch_size,
                update_bank: false,
            };
            let longrun = sampler.sample::<B, _, _, _>(&frozen::<B, _>(&model), request, &mut sources, &mut rng, device)?;
            match toy {
                Some(dist) => {
                    let inner = model.valid();
                    Landscape::evaluate::<B::InnerBackend, _>(
                        dist,
                        &inner,
                        config.epsilon,
                        &states_to_points(longrun.states),
                        config.kde_bw,
                        config.viz_res,
                        device,
                    )
                    .plot(&exp_dir.landscape().join(format!("longrun_{iteration:06}.png")))?;
                }
                None => plot_ims(
                    &exp_dir.longrun().join(format!("longrun_{iteration:06}.png")),
                    longrun.states,
                )?,
            }
            tracing::info!(iteration, "Long-run samples saved");
        }

        pb.set_message(format!("d_s_t={d_s_t:.3}"));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    tracing::info!(
        iterations = config.num_train_iters,
        lr = format!("{:.2e}", anneal.lr()),
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    Ok(TrainOutput {
        model,
        record,
        bank,
        lr: anneal.lr(),
    })
}
