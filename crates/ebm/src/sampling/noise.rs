//! Host-side random state tensors.
//!
//! All randomness flows from the caller's seeded RNG instead of the backend's
//! global generator, so a fixed seed reproduces a run bit for bit.

use burn::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

use crate::model::bridge::flat_to_states;

/// I.i.d. uniform values in `[-scale, scale]`.
pub fn uniform_states<B: Backend, R: Rng + ?Sized>(
    shape: [usize; 4],
    scale: f64,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 4> {
    let n: usize = shape.iter().product();
    let scale = scale.abs() as f32;
    let dist = Uniform::new_inclusive(-scale, scale);
    let flat: Vec<f32> = (0..n).map(|_| dist.sample(rng)).collect();
    flat_to_states(flat, shape, device)
}

/// I.i.d. normal values with mean zero and standard deviation `std`.
pub fn gaussian_states<B: Backend, R: Rng + ?Sized>(
    shape: [usize; 4],
    std: f64,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 4> {
    let n: usize = shape.iter().product();
    let std = std as f32;
    let flat: Vec<f32> = (0..n)
        .map(|_| {
            let z: f32 = StandardNormal.sample(rng);
            z * std
        })
        .collect();
    flat_to_states(flat, shape, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::tensor_to_flat;
    use burn::backend::ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_uniform_range() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(0);
        let states = uniform_states::<TestBackend, _>([16, 3, 4, 4], 0.5, &mut rng, &device);

        assert_eq!(states.dims(), [16, 3, 4, 4]);
        let values = tensor_to_flat(states);
        assert!(values.iter().all(|v| (-0.5..=0.5).contains(v)));
    }

    #[test]
    fn test_gaussian_moments() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(1);
        let states = gaussian_states::<TestBackend, _>([1000, 2, 1, 1], 2.0, &mut rng, &device);

        let values = tensor_to_flat(states);
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.2, "mean {mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.2, "std {}", var.sqrt());
    }

    #[test]
    fn test_same_seed_same_draws() {
        let device = Default::default();
        let a = gaussian_states::<TestBackend, _>([4, 1, 2, 2], 1.0, &mut StdRng::seed_from_u64(7), &device);
        let b = gaussian_states::<TestBackend, _>([4, 1, 2, 2], 1.0, &mut StdRng::seed_from_u64(7), &device);
        assert_eq!(tensor_to_flat(a), tensor_to_flat(b));
    }
}
