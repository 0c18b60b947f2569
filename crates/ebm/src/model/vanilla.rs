use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

use super::EnergyFunction;

/// Configuration for the VanillaNet image energy function.
///
/// ```text
/// (batch, n_c, 32, 32)
///   → Conv3x3(n_c→n_f, s1, p1) → LeakyReLU          (32x32)
///   → Conv4x4(n_f→2n_f, s2, p1) → LeakyReLU         (16x16)
///   → Conv4x4(2n_f→4n_f, s2, p1) → LeakyReLU        (8x8)
///   → Conv4x4(4n_f→8n_f, s2, p1) → LeakyReLU        (4x4)
///   → Conv4x4(8n_f→1, s1, p0)                        (1x1)
///   → energy: (batch,)
/// ```
///
/// Larger images leave a spatial map after the last conv; it is averaged.
#[derive(Config, Debug)]
pub struct VanillaNetConfig {
    /// Number of image channels.
    #[config(default = 3)]
    pub n_c: usize,
    /// Base number of filters.
    #[config(default = 32)]
    pub n_f: usize,
    /// Negative slope of the leaky ReLU activations.
    #[config(default = 0.05)]
    pub leak: f64,
}

/// Plain strided ConvNet energy function.
#[derive(Module, Debug)]
pub struct VanillaNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    leak: f64,
}

fn downsample<B: Backend>(d_in: usize, d_out: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([d_in, d_out], [4, 4])
        .with_stride([2, 2])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

impl VanillaNetConfig {
    /// Initialize a VanillaNet with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VanillaNet<B> {
        let n_f = self.n_f;
        VanillaNet {
            conv1: Conv2dConfig::new([self.n_c, n_f], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: downsample(n_f, n_f * 2, device),
            conv3: downsample(n_f * 2, n_f * 4, device),
            conv4: downsample(n_f * 4, n_f * 8, device),
            conv5: Conv2dConfig::new([n_f * 8, 1], [4, 4]).init(device),
            leak: self.leak,
        }
    }
}

impl<B: Backend> VanillaNet<B> {
    /// Input shape: `(batch, n_c, H, W)` with `H, W >= 32`. Output shape: `(batch,)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let x = leaky_relu(self.conv1.forward(x), self.leak);
        let x = leaky_relu(self.conv2.forward(x), self.leak);
        let x = leaky_relu(self.conv3.forward(x), self.leak);
        let x = leaky_relu(self.conv4.forward(x), self.leak);
        let x: Tensor<B, 2> = self.conv5.forward(x).flatten(1, 3);
        x.mean_dim(1).squeeze::<1>(1)
    }
}

impl<B: Backend> EnergyFunction<B> for VanillaNet<B> {
    fn energy(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = VanillaNetConfig::new().with_n_f(4).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 32, 32],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let output = model.forward(input);
        assert_eq!(output.dims(), [2]);
    }

    #[test]
    fn test_larger_images_are_pooled() {
        let device = Default::default();
        let model = VanillaNetConfig::new()
            .with_n_c(1)
            .with_n_f(2)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random(
            [3, 1, 64, 64],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let output = model.forward(input);
        assert_eq!(output.dims(), [3]);
    }

    #[test]
    fn test_parameter_count() {
        let device = Default::default();
        let model = VanillaNetConfig::new().with_n_f(4).init::<TestBackend>(&device);

        // conv1: 3*4*9+4 = 112
        // conv2: 4*8*16+8 = 520
        // conv3: 8*16*16+16 = 2064
        // conv4: 16*32*16+32 = 8224
        // conv5: 32*1*16+1 = 513
        assert_eq!(model.num_params(), 11_433);
    }
}
