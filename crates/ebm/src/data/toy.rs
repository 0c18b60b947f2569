//! Synthetic 2D toy distributions with exact samplers and closed-form
//! densities.
//!
//! - `gmm`: `toy_groups` isotropic Gaussians evenly spaced on a circle of
//!   radius `toy_radius`, equal weights.
//! - `rings`: `toy_groups` concentric rings at radii `toy_radius·(k+1)/groups`
//!   with Gaussian radial spread; ring weight proportional to its radius.

use std::f64::consts::PI;

use burn::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, WeightedIndex};
use serde::{Deserialize, Serialize};

use super::PositiveSource;
use crate::error::EbmError;
use crate::model::bridge::points_to_states;

/// Toy distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToyType {
    Gmm,
    Rings,
}

/// Toy distribution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyConfig {
    #[serde(default = "default_toy_type")]
    pub toy_type: ToyType,
    /// Number of mixture components (Gaussians or rings).
    #[serde(default = "default_toy_groups")]
    pub toy_groups: usize,
    /// Standard deviation of each component.
    #[serde(default = "default_toy_sd")]
    pub toy_sd: f64,
    /// Radius of the circle (gmm) or of the outermost ring (rings).
    #[serde(default = "default_toy_radius")]
    pub toy_radius: f64,
}

fn default_toy_type() -> ToyType {
    ToyType::Gmm
}
fn default_toy_groups() -> usize {
    8
}
fn default_toy_sd() -> f64 {
    0.15
}
fn default_toy_radius() -> f64 {
    1.0
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            toy_type: default_toy_type(),
            toy_groups: default_toy_groups(),
            toy_sd: default_toy_sd(),
            toy_radius: default_toy_radius(),
        }
    }
}

/// Mixture over 2D points with an exact sampler.
#[derive(Debug, Clone)]
pub struct ToyDistribution {
    toy_type: ToyType,
    sd: f64,
    weights: Vec<f64>,
    /// Component centers (gmm) or ring radii stored as `[r, 0]` (rings).
    centers: Vec<[f64; 2]>,
    extent: f64,
}

impl ToyDistribution {
    /// # Errors
    /// `InvalidConfiguration` if there are no groups or the spread is not positive.
    pub fn new(config: &ToyConfig) -> Result<Self, EbmError> {
        let groups = config.toy_groups;
        if groups == 0 {
            return Err(EbmError::config("toy_groups must be at least 1"));
        }
        if !(config.toy_sd > 0.0) || !(config.toy_radius > 0.0) {
            return Err(EbmError::config("toy_sd and toy_radius must be positive"));
        }

        let (weights, centers) = match config.toy_type {
            ToyType::Gmm => {
                let centers = (0..groups)
                    .map(|k| {
                        let angle = 2.0 * PI * k as f64 / groups as f64;
                        [config.toy_radius * angle.cos(), config.toy_radius * angle.sin()]
                    })
                    .collect();
                (vec![1.0 / groups as f64; groups], centers)
            }
            ToyType::Rings => {
                let total: f64 = (1..=groups).map(|k| k as f64).sum();
                let weights = (1..=groups).map(|k| k as f64 / total).collect();
                let centers = (1..=groups)
                    .map(|k| [config.toy_radius * k as f64 / groups as f64, 0.0])
                    .collect();
                (weights, centers)
            }
        };

        Ok(Self {
            toy_type: config.toy_type,
            sd: config.toy_sd,
            weights,
            centers,
            extent: (config.toy_radius + 3.0 * config.toy_sd) * 1.1,
        })
    }

    /// Half-width of the square `[-extent, extent]²` that holds nearly all mass.
    pub fn extent(&self) -> f64 {
        self.extent
    }

    /// Mixture weights, one per group.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Draw `n` exact samples. Group sizes are multinomial in the weights;
    /// points are returned grouped by component.
    pub fn sample_points<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<[f32; 2]> {
        let mut counts = vec![0usize; self.weights.len()];
        if let Ok(picker) = WeightedIndex::new(&self.weights) {
            for _ in 0..n {
                counts[picker.sample(rng)] += 1;
            }
        }

        let mut points = Vec::with_capacity(n);
        for (center, &count) in self.centers.iter().zip(&counts) {
            for _ in 0..count {
                let z1: f64 = StandardNormal.sample(rng);
                let point = match self.toy_type {
                    ToyType::Gmm => {
                        let z2: f64 = StandardNormal.sample(rng);
                        [center[0] + self.sd * z1, center[1] + self.sd * z2]
                    }
                    ToyType::Rings => {
                        let radius = center[0] + self.sd * z1;
                        let theta = 2.0 * PI * rng.gen::<f64>();
                        [radius * theta.cos(), radius * theta.sin()]
                    }
                };
                points.push([point[0] as f32, point[1] as f32]);
            }
        }
        points
    }

    /// Ground-truth density at `(x, y)`.
    pub fn density(&self, x: f64, y: f64) -> f64 {
        let var = self.sd * self.sd;
        match self.toy_type {
            ToyType::Gmm => self
                .weights
                .iter()
                .zip(&self.centers)
                .map(|(w, c)| {
                    let d2 = (x - c[0]).powi(2) + (y - c[1]).powi(2);
                    w * (-d2 / (2.0 * var)).exp() / (2.0 * PI * var)
                })
                .sum(),
            ToyType::Rings => {
                let r = (x * x + y * y).sqrt();
                self.weights
                    .iter()
                    .zip(&self.centers)
                    .map(|(w, c)| {
                        let ring = c[0];
                        let radial = (-(r - ring).powi(2) / (2.0 * var)).exp() / (2.0 * PI * var).sqrt();
                        w * radial / (2.0 * PI * ring)
                    })
                    .sum()
            }
        }
    }
}

/// Positive source backed by a toy distribution. Draws are exact, no noise is added.
#[derive(Debug, Clone)]
pub struct ToySource {
    distribution: ToyDistribution,
}

impl ToySource {
    pub fn new(distribution: ToyDistribution) -> Self {
        Self { distribution }
    }

    pub fn distribution(&self) -> &ToyDistribution {
        &self.distribution
    }
}

impl<B: Backend> PositiveSource<B> for ToySource {
    fn state_shape(&self) -> [usize; 3] {
        [2, 1, 1]
    }

    fn num_examples(&self) -> Option<usize> {
        None
    }

    fn ground_truth(&self) -> Option<&ToyDistribution> {
        Some(&self.distribution)
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, EbmError> {
        let points = self.distribution.sample_points(batch_size, rng);
        Ok(points_to_states(&points, device))
    }
}
