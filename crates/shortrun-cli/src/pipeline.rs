/// Training and sampling pipelines behind the CLI subcommands.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ebm::data::{DataConfig, ImageDataset, ImageSource, PositiveSource, ToyDistribution, ToySource};
use ebm::inference::EnergySampler;
use ebm::model::bridge::states_to_points;
use ebm::model::{EnergyFunction, NetType, NonlocalNetConfig, ToyNetConfig, VanillaNetConfig};
use ebm::sampling::{InitType, ShortRunSampler};
use ebm::training::{load_checkpoint_meta, train, DiagnosticsRecord, ExperimentConfig, ExperimentDir};
use ebm::viz::{plot_ims, Landscape};

use crate::config::{apply_overrides, load_run_toml, TrainOverrides};

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the run config file.
    pub config: PathBuf,
    pub seed: Option<u64>,
    pub iters: Option<usize>,
    pub exp_dir: Option<PathBuf>,
}

/// Arguments for the `sample` subcommand.
#[derive(Debug)]
pub struct SampleArgs {
    /// Run config the checkpoint was trained with.
    pub config: PathBuf,
    /// Path to a `net_*.mpk` checkpoint.
    pub checkpoint: PathBuf,
    /// Number of Langevin steps.
    pub steps: usize,
    pub init: InitType,
    /// Output PNG (image grid, or landscape for toy runs).
    pub output: PathBuf,
    /// Overrides the config's batch size.
    pub batch_size: Option<usize>,
    /// Overrides the config's seed.
    pub seed: Option<u64>,
}

fn toy_source(config: &ExperimentConfig) -> anyhow::Result<ToySource> {
    match &config.data {
        DataConfig::Toy(toy) => Ok(ToySource::new(ToyDistribution::new(toy)?)),
        other => anyhow::bail!("{} data is not a toy distribution", other.name()),
    }
}

fn image_source<B: Backend>(config: &ExperimentConfig, device: &B::Device) -> anyhow::Result<ImageSource<B>> {
    let dataset = ImageDataset::load(&config.data, config.im_sz, config.im_ch, device)?;
    Ok(ImageSource::new(dataset, config.data_epsilon))
}

/// Train an energy network from a run config and print a summary.
pub fn run_train<B: AutodiffBackend>(args: TrainArgs, device: &B::Device) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config, CLI flags last
    let mut run = load_run_toml(&args.config)?;
    apply_overrides(
        &mut run,
        TrainOverrides {
            seed: args.seed,
            iters: args.iters,
            exp_dir: args.exp_dir,
        },
    );
    let config = run.experiment;
    config.validate()?;
    B::seed(config.seed);

    // 2. Output directory
    let exp_dir = ExperimentDir::create(&run.exp_dir, config.is_toy())?;
    exp_dir.write_config(&config)?;

    // 3. Data, model and training
    let record = match config.net_type {
        NetType::Toy => {
            let source = toy_source(&config)?;
            let model = ToyNetConfig::new().with_n_f(config.n_f).init::<B>(device);
            train(&config, model, &source, &exp_dir, device)?.record
        }
        NetType::Vanilla => {
            let source = image_source::<B::InnerBackend>(&config, device)?;
            let model = VanillaNetConfig::new()
                .with_n_c(config.im_ch)
                .with_n_f(config.n_f)
                .init::<B>(device);
            train(&config, model, &source, &exp_dir, device)?.record
        }
        NetType::Nonlocal => {
            let source = image_source::<B::InnerBackend>(&config, device)?;
            let model = NonlocalNetConfig::new()
                .with_n_c(config.im_ch)
                .with_n_f(config.n_f)
                .with_im_sz(config.im_sz)
                .init::<B>(device);
            train(&config, model, &source, &exp_dir, device)?.record
        }
    };

    print_summary(&config, &record, exp_dir.root(), start);
    Ok(())
}

fn print_summary(config: &ExperimentConfig, record: &DiagnosticsRecord, exp_dir: &Path, start: Instant) {
    let seen = record.seen();
    let tail = seen.filled.min(config.log_freq).max(1);
    let mean = |values: &[f64]| {
        let window = &values[values.len().saturating_sub(tail)..];
        window.iter().sum::<f64>() / window.len().max(1) as f64
    };

    println!("\n--- Training Summary ---");
    println!("Iterations: {}", seen.filled);
    println!("Mean d_s_t (last {tail}): {:.6}", mean(seen.d_s_t_seen()));
    println!("Mean r_s_t (last {tail}): {:.6}", mean(seen.r_s_t_seen()));
    println!("Output: {}", exp_dir.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
}

/// Draw long-run samples from a saved checkpoint and write them as a PNG.
pub fn run_sample<B: AutodiffBackend>(args: SampleArgs, device: &B::Device) -> anyhow::Result<()> {
    let config = load_run_toml(&args.config)?.experiment;
    config.validate()?;
    let seed = args.seed.unwrap_or(config.seed);
    B::seed(seed);
    let mut rng = StdRng::seed_from_u64(seed);

    if let Ok(meta) = load_checkpoint_meta(&args.checkpoint) {
        tracing::info!(iteration = meta.iteration, lr = meta.lr, "Checkpoint metadata");
    }
    let sampler = ShortRunSampler::new(config.epsilon, config.noise_init_factor, config.state_shape());
    let batch_size = args.batch_size.unwrap_or(config.batch_size);

    match config.net_type {
        NetType::Toy => {
            let source = toy_source(&config)?;
            let model = ToyNetConfig::new().with_n_f(config.n_f).init::<B>(device);
            let energy = EnergySampler::<B, _>::load(&args.checkpoint, model, sampler, device.clone())?;
            let out = energy.sample(args.steps, args.init, batch_size, &source, &mut rng)?;
            tracing::info!(steps = args.steps, grad_norm = out.grad_norm, "Long-run sampling finished");
            let inner = energy.model().valid();
            Landscape::evaluate::<B::InnerBackend, _>(
                source.distribution(),
                &inner,
                config.epsilon,
                &states_to_points(out.states),
                config.kde_bw,
                config.viz_res,
                device,
            )
            .plot(&args.output)?;
        }
        NetType::Vanilla => {
            let source = image_source::<B::InnerBackend>(&config, device)?;
            let model = VanillaNetConfig::new()
                .with_n_c(config.im_ch)
                .with_n_f(config.n_f)
                .init::<B>(device);
            sample_images(&args, model, sampler, batch_size, &source, &mut rng, device)?;
        }
        NetType::Nonlocal => {
            let source = image_source::<B::InnerBackend>(&config, device)?;
            let model = NonlocalNetConfig::new()
                .with_n_c(config.im_ch)
                .with_n_f(config.n_f)
                .with_im_sz(config.im_sz)
                .init::<B>(device);
            sample_images(&args, model, sampler, batch_size, &source, &mut rng, device)?;
        }
    }

    println!("Samples written to {}", args.output.display());
    Ok(())
}

fn sample_images<B, M, S>(
    args: &SampleArgs,
    model: M,
    sampler: ShortRunSampler,
    batch_size: usize,
    source: &S,
    rng: &mut StdRng,
    device: &B::Device,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EnergyFunction<B>,
    M::InnerModule: EnergyFunction<B::InnerBackend>,
    S: PositiveSource<B::InnerBackend>,
{
    let energy = EnergySampler::<B, M>::load(&args.checkpoint, model, sampler, device.clone())?;
    let out = energy.sample(args.steps, args.init, batch_size, source, rng)?;
    tracing::info!(steps = args.steps, grad_norm = out.grad_norm, "Long-run sampling finished");
    plot_ims(&args.output, out.states)
}
