//! Experiment configuration.
//!
//! One immutable `ExperimentConfig` per run, deserialized from TOML or JSON
//! with per-field defaults and checked once by [`ExperimentConfig::validate`]
//! before anything is allocated.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::data::DataConfig;
use crate::error::EbmError;
use crate::model::NetType;
use crate::sampling::InitType;

/// Parameter optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerType {
    Adam,
    /// Plain SGD; learning rates are prescaled by `ε²/2` when `ε > 0`.
    Sgd,
}

impl std::fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::Sgd => write!(f, "sgd"),
        }
    }
}

/// What to do when `d_s_t` or `r_s_t` stops being finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonFinitePolicy {
    /// Stop the run with `EbmError::NonFinite`.
    Abort,
    /// Log a warning and keep training.
    Warn,
}

/// Full configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_net_type")]
    pub net_type: NetType,

    /// Base channel/hidden width of the energy network.
    #[serde(default = "default_n_f")]
    pub n_f: usize,

    #[serde(default = "default_optimizer_type")]
    pub optimizer_type: OptimizerType,

    #[serde(default = "default_lr_init")]
    pub lr_init: f64,

    /// Floor for the annealed learning rate.
    #[serde(default = "default_lr_min")]
    pub lr_min: f64,

    /// Multiplicative learning-rate decay applied after every iteration.
    #[serde(default = "default_lr_decay")]
    pub lr_decay: f64,

    /// Langevin noise standard deviation.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Standard deviation of the noise added to positive image batches.
    #[serde(default = "default_data_epsilon")]
    pub data_epsilon: f64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_num_train_iters")]
    pub num_train_iters: usize,

    #[serde(default = "default_num_shortrun_steps")]
    pub num_shortrun_steps: usize,

    #[serde(default = "default_num_longrun_steps")]
    pub num_longrun_steps: usize,

    #[serde(default = "default_shortrun_init")]
    pub shortrun_init: InitType,

    #[serde(default = "default_longrun_init")]
    pub longrun_init: InitType,

    /// Iterations between log lines, checkpoints and diagnostic plots.
    #[serde(default = "default_log_freq")]
    pub log_freq: usize,

    /// Periodically run long-run chains to inspect the model's steady state.
    #[serde(default)]
    pub log_longrun: bool,

    #[serde(default = "default_log_longrun_freq")]
    pub log_longrun_freq: usize,

    #[serde(default = "default_im_sz")]
    pub im_sz: usize,

    #[serde(default = "default_im_ch")]
    pub im_ch: usize,

    /// Scale of uniform/gaussian chain initialization.
    #[serde(default = "default_noise_init_factor")]
    pub noise_init_factor: f64,

    /// Persistent bank size for toy data (image banks hold one chain per image).
    #[serde(default = "default_bank_size")]
    pub bank_size: usize,

    /// Iterations between toy landscape renderings.
    #[serde(default = "default_log_viz_freq")]
    pub log_viz_freq: usize,

    /// Number of short-run samples behind the toy KDE panel.
    #[serde(default = "default_batch_size_kde")]
    pub batch_size_kde: usize,

    /// Grid resolution of the toy landscape panels.
    #[serde(default = "default_viz_res")]
    pub viz_res: usize,

    /// Gaussian KDE bandwidth for the toy landscape.
    #[serde(default = "default_kde_bw")]
    pub kde_bw: f64,

    #[serde(default = "default_nonfinite_policy")]
    pub nonfinite_policy: NonFinitePolicy,

    /// Show an indicatif progress bar over training iterations.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    #[serde(default = "default_data")]
    pub data: DataConfig,
}

fn default_seed() -> u64 {
    123
}
fn default_net_type() -> NetType {
    NetType::Vanilla
}
fn default_n_f() -> usize {
    32
}
fn default_optimizer_type() -> OptimizerType {
    OptimizerType::Adam
}
fn default_lr_init() -> f64 {
    1e-4
}
fn default_lr_min() -> f64 {
    1e-5
}
fn default_lr_decay() -> f64 {
    1.0
}
fn default_epsilon() -> f64 {
    0.01
}
fn default_data_epsilon() -> f64 {
    0.02
}
fn default_batch_size() -> usize {
    100
}
fn default_num_train_iters() -> usize {
    100_000
}
fn default_num_shortrun_steps() -> usize {
    100
}
fn default_num_longrun_steps() -> usize {
    2_000
}
fn default_shortrun_init() -> InitType {
    InitType::Uniform
}
fn default_longrun_init() -> InitType {
    InitType::Uniform
}
fn default_log_freq() -> usize {
    1_000
}
fn default_log_longrun_freq() -> usize {
    20_000
}
fn default_im_sz() -> usize {
    32
}
fn default_im_ch() -> usize {
    3
}
fn default_noise_init_factor() -> f64 {
    1.0
}
fn default_bank_size() -> usize {
    10_000
}
fn default_log_viz_freq() -> usize {
    5_000
}
fn default_batch_size_kde() -> usize {
    8_000
}
fn default_viz_res() -> usize {
    500
}
fn default_kde_bw() -> f64 {
    0.075
}
fn default_nonfinite_policy() -> NonFinitePolicy {
    NonFinitePolicy::Abort
}
fn default_show_progress() -> bool {
    true
}
fn default_data() -> DataConfig {
    DataConfig::Cifar10 {
        root: PathBuf::from("./data/cifar10"),
        max_images: None,
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            net_type: default_net_type(),
            n_f: default_n_f(),
            optimizer_type: default_optimizer_type(),
            lr_init: default_lr_init(),
            lr_min: default_lr_min(),
            lr_decay: default_lr_decay(),
            epsilon: default_epsilon(),
            data_epsilon: default_data_epsilon(),
            batch_size: default_batch_size(),
            num_train_iters: default_num_train_iters(),
            num_shortrun_steps: default_num_shortrun_steps(),
            num_longrun_steps: default_num_longrun_steps(),
            shortrun_init: default_shortrun_init(),
            longrun_init: default_longrun_init(),
            log_freq: default_log_freq(),
            log_longrun: false,
            log_longrun_freq: default_log_longrun_freq(),
            im_sz: default_im_sz(),
            im_ch: default_im_ch(),
            noise_init_factor: default_noise_init_factor(),
            bank_size: default_bank_size(),
            log_viz_freq: default_log_viz_freq(),
            batch_size_kde: default_batch_size_kde(),
            viz_res: default_viz_res(),
            kde_bw: default_kde_bw(),
            nonfinite_policy: default_nonfinite_policy(),
            show_progress: default_show_progress(),
            data: default_data(),
        }
    }
}

/// Parse a configuration file, TOML or JSON chosen by extension.
///
/// # Errors
/// `InvalidConfiguration` if the file cannot be read or does not
/// deserialize, including unknown enum values such as an init type.
pub fn load_config_file<T: DeserializeOwned>(path: &Path) -> Result<T, EbmError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| EbmError::config(format!("cannot read {}: {e}", path.display())))?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        _ => toml::from_str(&contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| EbmError::config(format!("{}: {e}", path.display())))
}

impl ExperimentConfig {
    /// Whether the run trains on a 2D toy distribution.
    pub fn is_toy(&self) -> bool {
        self.data.is_toy()
    }

    /// Shape of one state, `[c, h, w]`.
    pub fn state_shape(&self) -> [usize; 3] {
        if self.is_toy() {
            [2, 1, 1]
        } else {
            [self.im_ch, self.im_sz, self.im_sz]
        }
    }

    /// `(lr_init, lr_min)` as handed to the optimizer.
    ///
    /// For SGD with `ε > 0` both are multiplied by `ε²/2`, which makes the
    /// rate invariant to the `2/ε²` loss scaling.
    pub fn effective_lr(&self) -> (f64, f64) {
        match self.optimizer_type {
            OptimizerType::Sgd if self.epsilon > 0.0 => {
                let scale = self.epsilon * self.epsilon / 2.0;
                (self.lr_init * scale, self.lr_min * scale)
            }
            _ => (self.lr_init, self.lr_min),
        }
    }

    /// Reject configurations that can never produce a valid run.
    ///
    /// Bank-versus-batch checks for image data need the dataset size and
    /// happen when the bank is created.
    pub fn validate(&self) -> Result<(), EbmError> {
        if self.net_type.is_image() == self.is_toy() {
            return Err(EbmError::config(format!(
                "net_type '{}' cannot be trained on {} data",
                self.net_type,
                self.data.name()
            )));
        }
        if self.net_type.is_image() && (self.im_sz < 32 || self.im_sz % 8 != 0) {
            return Err(EbmError::config(format!(
                "im_sz must be a multiple of 8 and at least 32, got {}",
                self.im_sz
            )));
        }
        if self.net_type.is_image() && self.im_ch == 0 {
            return Err(EbmError::config("im_ch must be at least 1"));
        }
        if self.n_f == 0 {
            return Err(EbmError::config("n_f must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(EbmError::config("batch_size must be at least 1"));
        }
        if self.num_shortrun_steps == 0 {
            return Err(EbmError::config("num_shortrun_steps must be at least 1"));
        }
        if self.log_freq == 0 {
            return Err(EbmError::config("log_freq must be at least 1"));
        }
        if self.log_longrun && (self.num_longrun_steps == 0 || self.log_longrun_freq == 0) {
            return Err(EbmError::config(
                "long-run logging needs num_longrun_steps and log_longrun_freq of at least 1",
            ));
        }
        if !(self.lr_init > 0.0) || !(self.lr_min >= 0.0) || !(self.lr_decay > 0.0) {
            return Err(EbmError::config(
                "lr_init and lr_decay must be positive and lr_min non-negative",
            ));
        }
        if !(self.epsilon >= 0.0) || !(self.data_epsilon >= 0.0) || !(self.noise_init_factor >= 0.0) {
            return Err(EbmError::config(
                "epsilon, data_epsilon and noise_init_factor must be non-negative",
            ));
        }

        if self.is_toy() {
            if self.log_viz_freq == 0 || self.viz_res < 2 || self.batch_size_kde == 0 {
                return Err(EbmError::config(
                    "toy runs need log_viz_freq and batch_size_kde of at least 1 and viz_res of at least 2",
                ));
            }
            if !(self.kde_bw > 0.0) {
                return Err(EbmError::config("kde_bw must be positive"));
            }
            if self.shortrun_init == InitType::Persistent {
                let largest = self.batch_size.max(self.batch_size_kde);
                if largest > self.bank_size {
                    return Err(EbmError::config(format!(
                        "persistent batch of {largest} exceeds bank_size {}",
                        self.bank_size
                    )));
                }
            }
            if self.log_longrun && self.longrun_init == InitType::Persistent && self.batch_size > self.bank_size {
                return Err(EbmError::config(format!(
                    "persistent batch of {} exceeds bank_size {}",
                    self.batch_size, self.bank_size
                )));
            }
        }

        if self.lr_min > self.lr_init {
            tracing::warn!(
                lr_init = self.lr_init,
                lr_min = self.lr_min,
                "lr_min exceeds lr_init; the learning rate is pinned at lr_min"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ToyConfig;

    fn toy_config() -> ExperimentConfig {
        ExperimentConfig {
            net_type: NetType::Toy,
            data: DataConfig::Toy(ToyConfig::default()),
            batch_size: 16,
            bank_size: 100,
            batch_size_kde: 50,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        ExperimentConfig::default().validate().unwrap();
        toy_config().validate().unwrap();
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let toml_str = r#"
seed = 7
net_type = "nonlocal"
optimizer_type = "sgd"
epsilon = 0.005
shortrun_init = "persistent"

[data]
type = "mnist"
root = "/data/mnist"
"#;
        let config: ExperimentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.net_type, NetType::Nonlocal);
        assert_eq!(config.optimizer_type, OptimizerType::Sgd);
        assert_eq!(config.shortrun_init, InitType::Persistent);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.nonfinite_policy, NonFinitePolicy::Abort);
        assert!(matches!(config.data, DataConfig::Mnist { .. }));
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{"net_type": "toy", "batch_size": 8, "data": {"type": "toy", "toy_type": "rings"}}"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.batch_size, 8);
        assert!(config.is_toy());
        assert_eq!(config.state_shape(), [2, 1, 1]);
    }

    #[test]
    fn test_unknown_init_rejected_at_parse() {
        let result: Result<ExperimentConfig, _> = toml::from_str(r#"shortrun_init = "warm""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_file_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let toml_path = tmp.path().join("run.toml");
        std::fs::write(&toml_path, "batch_size = 12\n").unwrap();
        let config: ExperimentConfig = load_config_file(&toml_path).unwrap();
        assert_eq!(config.batch_size, 12);

        let json_path = tmp.path().join("run.json");
        std::fs::write(&json_path, r#"{"batch_size": 13}"#).unwrap();
        let config: ExperimentConfig = load_config_file(&json_path).unwrap();
        assert_eq!(config.batch_size, 13);
    }

    #[test]
    fn test_load_config_file_unknown_variant() {
        let tmp = tempfile::tempdir().unwrap();
        for (i, line) in [
            r#"shortrun_init = "langevin""#,
            r#"net_type = "resnet""#,
            r#"optimizer_type = "rmsprop""#,
        ]
        .into_iter()
        .enumerate()
        {
            let path = tmp.path().join(format!("bad_{i}.toml"));
            std::fs::write(&path, line).unwrap();
            let err = load_config_file::<ExperimentConfig>(&path).unwrap_err();
            assert!(matches!(err, EbmError::InvalidConfiguration(_)), "{line}: {err:?}");
        }
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file::<ExperimentConfig>(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, EbmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_effective_lr_sgd_prescaled() {
        let config = ExperimentConfig {
            optimizer_type: OptimizerType::Sgd,
            epsilon: 0.1,
            lr_init: 1.0,
            lr_min: 0.5,
            ..ExperimentConfig::default()
        };
        let (lr, lr_min) = config.effective_lr();
        assert!((lr - 0.005).abs() < 1e-12);
        assert!((lr_min - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_effective_lr_unscaled() {
        let adam = ExperimentConfig {
            lr_init: 2e-4,
            ..ExperimentConfig::default()
        };
        assert_eq!(adam.effective_lr(), (2e-4, 1e-5));

        let noiseless_sgd = ExperimentConfig {
            optimizer_type: OptimizerType::Sgd,
            epsilon: 0.0,
            ..ExperimentConfig::default()
        };
        assert_eq!(noiseless_sgd.effective_lr(), (1e-4, 1e-5));
    }

    #[test]
    fn test_net_data_mismatch() {
        let config = ExperimentConfig {
            net_type: NetType::Toy,
            ..ExperimentConfig::default()
        };
        assert!(matches!(config.validate(), Err(EbmError::InvalidConfiguration(_))));

        let config = ExperimentConfig {
            net_type: NetType::Vanilla,
            ..toy_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_counts_rejected() {
        for config in [
            ExperimentConfig { num_shortrun_steps: 0, ..ExperimentConfig::default() },
            ExperimentConfig { batch_size: 0, ..ExperimentConfig::default() },
            ExperimentConfig { log_freq: 0, ..ExperimentConfig::default() },
            ExperimentConfig {
                log_longrun: true,
                num_longrun_steps: 0,
                ..ExperimentConfig::default()
            },
        ] {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_bad_image_size() {
        let config = ExperimentConfig {
            im_sz: 28,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toy_bank_smaller_than_batch() {
        let config = ExperimentConfig {
            shortrun_init: InitType::Persistent,
            batch_size: 200,
            ..toy_config()
        };
        assert!(matches!(config.validate(), Err(EbmError::InvalidConfiguration(_))));
    }
}
