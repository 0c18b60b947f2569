//! Maximum-likelihood training: experiment configuration, the ML loss,
//! learning-rate annealing, diagnostics, artifacts and the training loop.

pub mod artifacts;
pub mod config;
pub mod loss;
pub mod metrics;
pub mod schedule;
pub mod trainer;

pub use artifacts::{load_checkpoint, load_checkpoint_meta, CheckpointMeta, ExperimentDir};
pub use config::{load_config_file, ExperimentConfig, NonFinitePolicy, OptimizerType};
pub use metrics::DiagnosticsRecord;
pub use trainer::{train, TrainOutput};
