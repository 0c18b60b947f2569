use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

use super::EnergyFunction;

/// Configuration for the ToyNet MLP.
///
/// ```text
/// (batch, dim, 1, 1) → flatten → (batch, dim)
///   → Linear(dim→n_f) → LeakyReLU
///   → Linear(n_f→2n_f) → LeakyReLU
///   → Linear(2n_f→2n_f) → LeakyReLU
///   → Linear(2n_f→2n_f) → LeakyReLU
///   → Linear(2n_f→1) → squeeze
///   → energy: (batch,)
/// ```
#[derive(Config, Debug)]
pub struct ToyNetConfig {
    /// Dimension of a toy state.
    #[config(default = 2)]
    pub dim: usize,
    /// Width of the first hidden layer; later layers use twice this.
    #[config(default = 32)]
    pub n_f: usize,
    /// Negative slope of the leaky ReLU activations.
    #[config(default = 0.05)]
    pub leak: f64,
}

/// Energy MLP over 2D points, laid out as `(batch, 2, 1, 1)` state tensors.
#[derive(Module, Debug)]
pub struct ToyNet<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
    linear3: Linear<B>,
    linear4: Linear<B>,
    out: Linear<B>,
    leak: f64,
}

impl ToyNetConfig {
    /// Initialize a ToyNet with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ToyNet<B> {
        let wide = self.n_f * 2;
        ToyNet {
            linear1: LinearConfig::new(self.dim, self.n_f).init(device),
            linear2: LinearConfig::new(self.n_f, wide).init(device),
            linear3: LinearConfig::new(wide, wide).init(device),
            linear4: LinearConfig::new(wide, wide).init(device),
            out: LinearConfig::new(wide, 1).init(device),
            leak: self.leak,
        }
    }
}

impl<B: Backend> ToyNet<B> {
    /// Input shape: `(batch, dim, 1, 1)`. Output shape: `(batch,)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = leaky_relu(self.linear1.forward(x), self.leak);
        let x = leaky_relu(self.linear2.forward(x), self.leak);
        let x = leaky_relu(self.linear3.forward(x), self.leak);
        let x = leaky_relu(self.linear4.forward(x), self.leak);
        self.out.forward(x).squeeze::<1>(1)
    }
}

impl<B: Backend> EnergyFunction<B> for ToyNet<B> {
    fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward(x)
    }
}
