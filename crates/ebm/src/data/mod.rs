//! Positive-sample sources: where the "data" side of the ML loss comes from.
//!
//! Two sources exist: an in-memory image dataset (with a small amount of
//! Gaussian noise added to every draw) and exact draws from a synthetic 2D
//! toy distribution. The `[data]` section of the experiment file selects one
//! via `#[serde(tag = "type")]`.
//!
//! # Example (TOML)
//!
//! ```toml
//! [data]
//! type = "cifar10"
//! root = "./data/cifar10"
//! ```
//!
//! ```toml
//! [data]
//! type = "toy"
//! toy_type = "rings"
//! toy_groups = 4
//! ```

pub mod image;
pub mod toy;

use std::path::PathBuf;

use burn::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EbmError;

pub use image::{ImageDataset, ImageSource};
pub use toy::{ToyConfig, ToyDistribution, ToySource, ToyType};

/// Draws batches of positive (data) states.
pub trait PositiveSource<B: Backend> {
    /// Shape of one state, `[c, h, w]`.
    fn state_shape(&self) -> [usize; 3];

    /// Number of distinct examples, or `None` for an unbounded generator.
    fn num_examples(&self) -> Option<usize>;

    /// Closed-form density, when the source has one.
    fn ground_truth(&self) -> Option<&ToyDistribution> {
        None
    }

    /// Draw `batch_size` states of shape `(batch_size, c, h, w)`.
    fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, EbmError>;
}

/// Dataset selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataConfig {
    /// CIFAR-10 binary batches (`data_batch_{1..5}.bin`).
    Cifar10 {
        root: PathBuf,
        /// Load at most this many images.
        #[serde(default)]
        max_images: Option<usize>,
    },
    /// MNIST IDX training images (`train-images-idx3-ubyte`).
    Mnist {
        root: PathBuf,
        /// Load at most this many images.
        #[serde(default)]
        max_images: Option<usize>,
    },
    /// Synthetic 2D distribution.
    Toy(ToyConfig),
}

impl DataConfig {
    pub fn is_toy(&self) -> bool {
        matches!(self, Self::Toy(_))
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cifar10 { .. } => "cifar10",
            Self::Mnist { .. } => "mnist",
            Self::Toy(_) => "toy",
        }
    }
}
