//! Experiment directory layout and checkpoint I/O.
//!
//! ```text
//! <exp_dir>/
//!   checkpoints/  net_000001.mpk + net_000001.json
//!   shortrun/     x_s_t_*.png, x_s_t_0_*.png     (image runs)
//!   longrun/      longrun_*.png                  (image runs)
//!   landscape/    toy_viz_*.png                  (toy runs)
//!   plots/        diagnostics.png, diagnostics.json
//!   code/         config.json
//! ```

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::error::EbmError;
use crate::training::config::ExperimentConfig;

/// Metadata saved alongside each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// 1-based iteration the weights were saved after.
    pub iteration: usize,
    /// Learning rate in effect for the next iteration.
    pub lr: f64,
}

/// A freshly created experiment output directory.
#[derive(Debug, Clone)]
pub struct ExperimentDir {
    root: PathBuf,
}

impl ExperimentDir {
    /// Create `root` and its subfolders.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `root` already exists, so earlier runs are
    /// never overwritten.
    pub fn create(root: &Path, toy: bool) -> Result<Self, EbmError> {
        if root.exists() {
            return Err(EbmError::config(format!(
                "experiment directory {} already exists; choose a different exp_dir",
                root.display()
            )));
        }
        let folders: &[&str] = if toy {
            &["checkpoints", "landscape", "plots", "code"]
        } else {
            &["checkpoints", "shortrun", "longrun", "plots", "code"]
        };
        for folder in folders {
            std::fs::create_dir_all(root.join(folder))?;
        }
        tracing::info!(path = %root.display(), "Created experiment directory");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoints(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn shortrun(&self) -> PathBuf {
        self.root.join("shortrun")
    }

    pub fn longrun(&self) -> PathBuf {
        self.root.join("longrun")
    }

    pub fn landscape(&self) -> PathBuf {
        self.root.join("landscape")
    }

    pub fn plots(&self) -> PathBuf {
        self.root.join("plots")
    }

    pub fn code(&self) -> PathBuf {
        self.root.join("code")
    }

    /// Write the resolved configuration to `code/config.json`.
    pub fn write_config(&self, config: &ExperimentConfig) -> anyhow::Result<()> {
        let path = self.code().join("config.json");
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
        Ok(())
    }

    /// Save `model` as `checkpoints/net_{iteration:06}` with its metadata.
    ///
    /// Returns the path of the weights file.
    pub fn save_checkpoint<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        iteration: usize,
        lr: f64,
    ) -> anyhow::Result<PathBuf> {
        let stem = self.checkpoints().join(format!("net_{iteration:06}"));
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(stem.clone(), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save model at iteration {iteration}: {e}"))?;

        let meta_path = stem.with_extension("json");
        serde_json::to_writer(
            std::fs::File::create(&meta_path)?,
            &CheckpointMeta { iteration, lr },
        )?;

        tracing::debug!(iteration, path = %stem.display(), "Checkpoint saved");
        Ok(stem.with_extension("mpk"))
    }
}

/// Load weights from `path` into a freshly initialized `model`.
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<M> {
    model
        .load_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", path.display()))
}

/// Read the metadata saved next to a checkpoint.
pub fn load_checkpoint_meta(path: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = path.with_extension("json");
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))
}
