//! Tensor bridge: conversions between host buffers (`Vec<f32>`, 2D points)
//! and burn state tensors.
//!
//! Random draws, dataset decoding and rendering all happen on the host; the
//! energy functions need `Tensor<B, 4>` inputs. Everything crossing that
//! boundary goes through here.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Build a `(batch, channels, height, width)` tensor from a flat row-major buffer.
///
/// # Panics
/// Panics if `flat.len()` does not match the product of `shape`.
pub fn flat_to_states<B: Backend>(
    flat: Vec<f32>,
    shape: [usize; 4],
    device: &B::Device,
) -> Tensor<B, 4> {
    let expected: usize = shape.iter().product();
    assert_eq!(
        flat.len(),
        expected,
        "buffer has {} values, shape {shape:?} needs {expected}",
        flat.len()
    );
    Tensor::from_data(TensorData::new(flat, shape), device)
}

/// Lay out 2D points as toy states of shape `(batch, 2, 1, 1)`.
pub fn points_to_states<B: Backend>(points: &[[f32; 2]], device: &B::Device) -> Tensor<B, 4> {
    let flat: Vec<f32> = points.iter().flat_map(|p| p.iter().copied()).collect();
    flat_to_states(flat, [points.len(), 2, 1, 1], device)
}

/// Extract all values of a tensor as `f32`, row-major.
pub fn tensor_to_flat<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Extract f64 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor.into_data().iter::<f64>().collect()
}

/// Extract a single f64 scalar from a burn 1D tensor.
///
/// # Panics
/// Panics if the tensor does not contain exactly one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Read toy states `(batch, 2, 1, 1)` back into 2D points.
pub fn states_to_points<B: Backend>(states: Tensor<B, 4>) -> Vec<[f32; 2]> {
    tensor_to_flat(states)
        .chunks_exact(2)
        .map(|p| [p[0], p[1]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_flat_to_states_layout() {
        let device = Default::default();
        let flat: Vec<f32> = (0..8).map(|v| v as f32).collect();

        let tensor = flat_to_states::<TestBackend>(flat, [2, 1, 2, 2], &device);
        assert_eq!(tensor.dims(), [2, 1, 2, 2]);

        let second: Vec<f32> = tensor_to_flat(tensor.slice([1..2, 0..1, 0..2, 0..2]));
        assert_eq!(second, vec![4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    #[should_panic(expected = "needs 8")]
    fn test_flat_to_states_rejects_bad_length() {
        let device = Default::default();
        let _ = flat_to_states::<TestBackend>(vec![0.0; 7], [2, 1, 2, 2], &device);
    }

    #[test]
    fn test_points_layout() {
        let device = Default::default();
        let points = vec![[1.0_f32, -1.0], [0.5, 2.5], [-3.0, 0.0]];

        let states = points_to_states::<TestBackend>(&points, &device);
        assert_eq!(states.dims(), [3, 2, 1, 1]);
        assert_eq!(states_to_points(states), points);
    }

    #[test]
    fn test_tensor_to_vec() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_data(
            TensorData::from([1.0_f32, 2.5, -3.0]),
            &device,
        );

        let values = tensor_to_vec::<TestBackend>(tensor);
        assert_eq!(values.len(), 3);
        assert!((values[1] - 2.5).abs() < 1e-6);

        let scalar_tensor = Tensor::<TestBackend, 1>::from_data(
            TensorData::from([42.0_f32]),
            &device,
        );
        assert!((tensor_to_f64::<TestBackend>(scalar_tensor) - 42.0).abs() < 1e-6);
    }
}
