mod config;
mod pipeline;

use std::path::PathBuf;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ebm::sampling::InitType;
use pipeline::{SampleArgs, TrainArgs};

type TrainBackend = Autodiff<NdArray<f32>>;

/// shortrun-ebm: maximum-likelihood EBM training with short-run Langevin MCMC.
#[derive(Parser)]
#[command(name = "shortrun-ebm", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and long-run sampling.
#[derive(Subcommand)]
enum Command {
    /// Train an energy network.
    Train {
        /// Path to the run config (TOML, or JSON with a .json extension).
        #[arg(long, default_value = "configs/cifar10.toml")]
        config: PathBuf,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the number of training iterations.
        #[arg(long)]
        iters: Option<usize>,
        /// Override the output directory (must not exist).
        #[arg(long)]
        exp_dir: Option<PathBuf>,
    },
    /// Run long Langevin chains from a saved checkpoint.
    Sample {
        /// Run config the checkpoint was trained with.
        #[arg(long)]
        config: PathBuf,
        /// Path to a net_*.mpk checkpoint.
        #[arg(long)]
        checkpoint: PathBuf,
        /// Number of Langevin steps.
        #[arg(long, default_value_t = 2000)]
        steps: usize,
        /// Chain initialization: data, uniform or gaussian.
        #[arg(long, default_value = "uniform")]
        init: InitType,
        /// Output PNG path.
        #[arg(long)]
        output: PathBuf,
        /// Override the config's batch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the config's seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let device = Default::default();

    match cli.command {
        Command::Train {
            config,
            seed,
            iters,
            exp_dir,
        } => pipeline::run_train::<TrainBackend>(
            TrainArgs {
                config,
                seed,
                iters,
                exp_dir,
            },
            &device,
        ),
        Command::Sample {
            config,
            checkpoint,
            steps,
            init,
            output,
            batch_size,
            seed,
        } => pipeline::run_sample::<TrainBackend>(
            SampleArgs {
                config,
                checkpoint,
                steps,
                init,
                output,
                batch_size,
                seed,
            },
            &device,
        ),
    }
}
