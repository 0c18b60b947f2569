//! In-memory image datasets and the noisy positive source built on them.
//!
//! Images are decoded from the standard binary distributions (CIFAR-10
//! `data_batch_*.bin`, MNIST IDX), resized bilinearly to `im_sz × im_sz`,
//! and normalized from `[0, 255]` to `[-1, 1]`. The whole set is held as one
//! `(n, c, im_sz, im_sz)` tensor.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;

use super::{DataConfig, PositiveSource};
use crate::error::EbmError;
use crate::sampling::noise::gaussian_states;

const CIFAR_SIDE: usize = 32;
const CIFAR_CHANNELS: usize = 3;
const CIFAR_RECORD: usize = 1 + CIFAR_CHANNELS * CIFAR_SIDE * CIFAR_SIDE;
const IDX3_MAGIC: u32 = 2051;

/// Decoded 8-bit images, channel-major per image.
#[derive(Debug)]
struct RawImages {
    pixels: Vec<u8>,
    count: usize,
    channels: usize,
    height: usize,
    width: usize,
}

/// A normalized image dataset held as a single tensor.
#[derive(Debug, Clone)]
pub struct ImageDataset<B: Backend> {
    images: Tensor<B, 4>,
}

impl<B: Backend> ImageDataset<B> {
    /// Load the dataset named by `config`, resized to `im_sz` with `im_ch` channels.
    ///
    /// # Errors
    /// `Dataset` if the files are missing or malformed, `InvalidConfiguration`
    /// if the channel count does not match or `config` names a toy dataset.
    pub fn load(
        config: &DataConfig,
        im_sz: usize,
        im_ch: usize,
        device: &B::Device,
    ) -> Result<Self, EbmError> {
        let raw = match config {
            DataConfig::Cifar10 { root, max_images } => read_cifar10(root, *max_images)?,
            DataConfig::Mnist { root, max_images } => read_mnist(root, *max_images)?,
            DataConfig::Toy(_) => {
                return Err(EbmError::config("toy data has no image dataset"));
            }
        };
        if raw.channels != im_ch {
            return Err(EbmError::config(format!(
                "{} images have {} channels, im_ch is {im_ch}",
                config.name(),
                raw.channels
            )));
        }
        if raw.count == 0 {
            return Err(EbmError::Dataset(format!("{} dataset is empty", config.name())));
        }

        let flat = resize_normalize(&raw, im_sz);
        let images = Tensor::from_data(
            TensorData::new(flat, [raw.count, raw.channels, im_sz, im_sz]),
            device,
        );
        tracing::info!(
            dataset = config.name(),
            images = raw.count,
            im_sz,
            "Loaded image dataset"
        );
        Ok(Self { images })
    }

    /// Wrap an already-normalized `(n, c, h, w)` tensor.
    pub fn from_tensor(images: Tensor<B, 4>) -> Self {
        Self { images }
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn images(&self) -> &Tensor<B, 4> {
        &self.images
    }
}

/// Positive source drawing dataset images without replacement plus
/// `N(0, data_epsilon²)` noise.
#[derive(Debug, Clone)]
pub struct ImageSource<B: Backend> {
    dataset: ImageDataset<B>,
    data_epsilon: f64,
}

impl<B: Backend> ImageSource<B> {
    pub fn new(dataset: ImageDataset<B>, data_epsilon: f64) -> Self {
        Self {
            dataset,
            data_epsilon,
        }
    }
}

impl<B: Backend> PositiveSource<B> for ImageSource<B> {
    fn state_shape(&self) -> [usize; 3] {
        let [_, c, h, w] = self.dataset.images.dims();
        [c, h, w]
    }

    fn num_examples(&self) -> Option<usize> {
        Some(self.dataset.len())
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, EbmError> {
        let n = self.dataset.len();
        if batch_size > n {
            return Err(EbmError::config(format!(
                "batch of {batch_size} exceeds dataset size {n}"
            )));
        }
        let idx: Vec<i64> = rand::seq::index::sample(rng, n, batch_size)
            .into_iter()
            .map(|i| i as i64)
            .collect();
        let idx = Tensor::<B, 1, Int>::from_data(TensorData::new(idx, [batch_size]), device);
        let batch = self.dataset.images.clone().select(0, idx);

        if self.data_epsilon > 0.0 {
            let [_, c, h, w] = batch.dims();
            let noise = gaussian_states([batch_size, c, h, w], self.data_epsilon, rng, device);
            Ok(batch + noise)
        } else {
            Ok(batch)
        }
    }
}

/// Read CIFAR-10 binary batches from `root` or `root/cifar-10-batches-bin`.
fn read_cifar10(root: &Path, max_images: Option<usize>) -> Result<RawImages, EbmError> {
    let nested = root.join("cifar-10-batches-bin");
    let dir = if nested.is_dir() { nested } else { root.to_path_buf() };

    let files: Vec<PathBuf> = (1..=5)
        .map(|i| dir.join(format!("data_batch_{i}.bin")))
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(EbmError::Dataset(format!(
            "no CIFAR-10 data_batch_*.bin files under {}",
            dir.display()
        )));
    }

    let limit = max_images.unwrap_or(usize::MAX);
    let image_bytes = CIFAR_RECORD - 1;
    let mut pixels = Vec::new();
    let mut count = 0;
    'files: for path in &files {
        let bytes = fs::read(path)?;
        if bytes.len() % CIFAR_RECORD != 0 {
            return Err(EbmError::Dataset(format!(
                "{} is not a whole number of {CIFAR_RECORD}-byte records",
                path.display()
            )));
        }
        for record in bytes.chunks_exact(CIFAR_RECORD) {
            if count >= limit {
                break 'files;
            }
            // First byte is the class label.
            pixels.extend_from_slice(&record[1..=image_bytes]);
            count += 1;
        }
    }

    Ok(RawImages {
        pixels,
        count,
        channels: CIFAR_CHANNELS,
        height: CIFAR_SIDE,
        width: CIFAR_SIDE,
    })
}

/// Read the MNIST training images IDX file from `root`.
fn read_mnist(root: &Path, max_images: Option<usize>) -> Result<RawImages, EbmError> {
    let path = ["train-images-idx3-ubyte", "train-images.idx3-ubyte"]
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            EbmError::Dataset(format!(
                "no MNIST train-images-idx3-ubyte under {}",
                root.display()
            ))
        })?;

    let bytes = fs::read(&path)?;
    parse_idx3(&bytes, max_images)
        .map_err(|e| EbmError::Dataset(format!("{}: {e}", path.display())))
}

fn parse_idx3(bytes: &[u8], max_images: Option<usize>) -> Result<RawImages, String> {
    let header = |i: usize| -> Result<u32, String> {
        bytes
            .get(i * 4..i * 4 + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| "truncated IDX header".to_string())
    };
    let magic = header(0)?;
    if magic != IDX3_MAGIC {
        return Err(format!("bad IDX magic {magic:#x}"));
    }
    let total = header(1)? as usize;
    let height = header(2)? as usize;
    let width = header(3)? as usize;
    if height == 0 || width == 0 {
        return Err(format!("IDX images are {height}x{width}"));
    }

    let count = max_images.map_or(total, |m| m.min(total));
    let needed = count
        .checked_mul(height * width)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| format!("{count} images of {height}x{width} overflow"))?;
    if bytes.len() < needed {
        return Err(format!("expected at least {needed} bytes, found {}", bytes.len()));
    }

    Ok(RawImages {
        pixels: bytes[16..needed].to_vec(),
        count,
        channels: 1,
        height,
        width,
    })
}

/// Bilinear resize (half-pixel centers) to `side × side`, then map
/// `[0, 255]` to `[-1, 1]`.
fn resize_normalize(raw: &RawImages, side: usize) -> Vec<f32> {
    let (h, w) = (raw.height, raw.width);
    let plane = h * w;
    let mut out = Vec::with_capacity(raw.count * raw.channels * side * side);

    let coords = |out_len: usize, in_len: usize| -> Vec<(usize, usize, f32)> {
        let scale = in_len as f32 / out_len as f32;
        (0..out_len)
            .map(|o| {
                let src = ((o as f32 + 0.5) * scale - 0.5).clamp(0.0, (in_len - 1) as f32);
                let lo = src.floor() as usize;
                let hi = (lo + 1).min(in_len - 1);
                (lo, hi, src - lo as f32)
            })
            .collect()
    };
    let ys = coords(side, h);
    let xs = coords(side, w);

    for chan in raw.pixels.chunks_exact(plane) {
        let px = |y: usize, x: usize| chan[y * w + x] as f32;
        for &(y0, y1, fy) in &ys {
            for &(x0, x1, fx) in &xs {
                let top = px(y0, x0) * (1.0 - fx) + px(y0, x1) * fx;
                let bottom = px(y1, x0) * (1.0 - fx) + px(y1, x1) * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                out.push(value / 127.5 - 1.0);
            }
        }
    }
    out
}
