//! Run file loading for the CLI.
//!
//! A run file is an `ExperimentConfig` plus the top-level `exp_dir` key.
//! TOML by default, JSON when the path ends in `.json`. Flags given on the
//! command line are applied last and win over the file.

use std::path::{Path, PathBuf};

use ebm::training::{load_config_file, ExperimentConfig};
use serde::Deserialize;

fn default_exp_dir() -> PathBuf {
    PathBuf::from("out/experiment")
}

/// Top-level structure of a run file.
#[derive(Debug, Deserialize)]
pub struct RunToml {
    /// Output directory; must not exist yet.
    #[serde(default = "default_exp_dir")]
    pub exp_dir: PathBuf,
    #[serde(flatten)]
    pub experiment: ExperimentConfig,
}

/// Command-line overrides for `train`.
#[derive(Debug, Default)]
pub struct TrainOverrides {
    pub seed: Option<u64>,
    pub iters: Option<usize>,
    pub exp_dir: Option<PathBuf>,
}

/// Load and deserialize a `RunToml` from a TOML or JSON file.
///
/// Parse failures surface as `EbmError::InvalidConfiguration`.
pub fn load_run_toml(path: &Path) -> anyhow::Result<RunToml> {
    let run: RunToml = load_config_file(path)?;
    tracing::info!(path = %path.display(), "Loaded experiment config");
    Ok(run)
}

/// Apply CLI flags on top of the file values.
pub fn apply_overrides(run: &mut RunToml, overrides: TrainOverrides) {
    if let Some(seed) = overrides.seed {
        run.experiment.seed = seed;
    }
    if let Some(iters) = overrides.iters {
        run.experiment.num_train_iters = iters;
    }
    if let Some(exp_dir) = overrides.exp_dir {
        run.exp_dir = exp_dir;
    }
}
