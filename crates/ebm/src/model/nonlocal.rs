use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, softmax};

use super::EnergyFunction;

/// Configuration for the NonlocalNet image energy function.
///
/// ```text
/// (batch, n_c, S, S)
///   → Conv3x3(n_c→n_f) → LeakyReLU → AvgPool2        (S/2)
///   → NonlocalBlock(n_f)
///   → Conv3x3(n_f→2n_f) → LeakyReLU → AvgPool2       (S/4)
///   → NonlocalBlock(2n_f)
///   → Conv3x3(2n_f→4n_f) → LeakyReLU → AvgPool2      (S/8)
///   → Conv3x3(4n_f→8n_f) → LeakyReLU
///   → flatten → Linear(8n_f·(S/8)²→1)
///   → energy: (batch,)
/// ```
#[derive(Config, Debug)]
pub struct NonlocalNetConfig {
    /// Number of image channels.
    #[config(default = 3)]
    pub n_c: usize,
    /// Base number of filters.
    #[config(default = 32)]
    pub n_f: usize,
    /// Side length of the (square) input images. Must be a multiple of 8.
    #[config(default = 32)]
    pub im_sz: usize,
    /// Negative slope of the leaky ReLU activations.
    #[config(default = 0.05)]
    pub leak: f64,
}

/// Embedded-Gaussian non-local (self-attention) block with a residual path.
#[derive(Module, Debug)]
pub struct NonlocalBlock<B: Backend> {
    theta: Conv2d<B>,
    phi: Conv2d<B>,
    g: Conv2d<B>,
    out: Conv2d<B>,
    inter: usize,
}

impl<B: Backend> NonlocalBlock<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let inter = (channels / 2).max(1);
        let pointwise = |d_in: usize, d_out: usize| Conv2dConfig::new([d_in, d_out], [1, 1]).init(device);
        Self {
            theta: pointwise(channels, inter),
            phi: pointwise(channels, inter),
            g: pointwise(channels, inter),
            out: pointwise(inter, channels),
            inter,
        }
    }

    /// Shape-preserving: `(batch, c, h, w)` → `(batch, c, h, w)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _c, h, w] = x.dims();
        let n = h * w;

        let theta: Tensor<B, 3> = self
            .theta
            .forward(x.clone())
            .reshape([batch, self.inter, n])
            .swap_dims(1, 2); // (batch, n, inter)
        let phi: Tensor<B, 3> = self.phi.forward(x.clone()).reshape([batch, self.inter, n]);
        let g: Tensor<B, 3> = self
            .g
            .forward(x.clone())
            .reshape([batch, self.inter, n])
            .swap_dims(1, 2); // (batch, n, inter)

        let attention = softmax(theta.matmul(phi), 2); // (batch, n, n)
        let y: Tensor<B, 4> = attention
            .matmul(g)
            .swap_dims(1, 2)
            .reshape([batch, self.inter, h, w]);

        x + self.out.forward(y)
    }
}

/// ConvNet energy function with non-local attention at the two finest scales.
#[derive(Module, Debug)]
pub struct NonlocalNet<B: Backend> {
    conv1: Conv2d<B>,
    nonlocal1: NonlocalBlock<B>,
    conv2: Conv2d<B>,
    nonlocal2: NonlocalBlock<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    pool: AvgPool2d,
    fc: Linear<B>,
    leak: f64,
}

impl NonlocalNetConfig {
    /// Initialize a NonlocalNet with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NonlocalNet<B> {
        let n_f = self.n_f;
        let conv3x3 = |d_in: usize, d_out: usize| {
            Conv2dConfig::new([d_in, d_out], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        let side = self.im_sz / 8;

        NonlocalNet {
            conv1: conv3x3(self.n_c, n_f),
            nonlocal1: NonlocalBlock::new(n_f, device),
            conv2: conv3x3(n_f, n_f * 2),
            nonlocal2: NonlocalBlock::new(n_f * 2, device),
            conv3: conv3x3(n_f * 2, n_f * 4),
            conv4: conv3x3(n_f * 4, n_f * 8),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc: LinearConfig::new(n_f * 8 * side * side, 1).init(device),
            leak: self.leak,
        }
    }
}

impl<B: Backend> NonlocalNet<B> {
    /// Input shape: `(batch, n_c, im_sz, im_sz)`. Output shape: `(batch,)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let x = self.pool.forward(leaky_relu(self.conv1.forward(x), self.leak));
        let x = self.nonlocal1.forward(x);
        let x = self.pool.forward(leaky_relu(self.conv2.forward(x), self.leak));
        let x = self.nonlocal2.forward(x);
        let x = self.pool.forward(leaky_relu(self.conv3.forward(x), self.leak));
        let x = leaky_relu(self.conv4.forward(x), self.leak);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        self.fc.forward(x).squeeze::<1>(1)
    }
}

impl<B: Backend> EnergyFunction<B> for NonlocalNet<B> {
    fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward(x)
    }
}
