//! PNG rendering of sample grids, training diagnostics and toy landscapes.
//!
//! Everything is drawn as raw pixels and line series on a bitmap backend; no
//! text is rendered, so no font stack is needed.

use std::path::Path;

use burn::prelude::*;
use plotters::prelude::*;

use crate::data::ToyDistribution;
use crate::model::bridge::{points_to_states, tensor_to_flat};
use crate::model::EnergyFunction;
use crate::training::metrics::DiagnosticsRecord;

/// Gap between grid tiles, in pixels.
const PAD: u32 = 2;
/// Grid points per energy evaluation batch.
const GRID_CHUNK: usize = 4096;

/// Save a batch of image states as a square grid. Values in `[-1, 1]` map
/// to `[0, 255]`; one channel renders as grayscale, three as RGB.
pub fn plot_ims<B: Backend>(path: &Path, states: Tensor<B, 4>) -> anyhow::Result<()> {
    let [n, c, h, w] = states.dims();
    if n == 0 {
        return Ok(());
    }
    let values = tensor_to_flat(states);
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    // Upscale small images so tiles stay visible.
    let scale = (64 / h.max(w)).max(1) as u32;
    let tile_w = w as u32 * scale + PAD;
    let tile_h = h as u32 * scale + PAD;

    let size = (cols as u32 * tile_w + PAD, rows as u32 * tile_h + PAD);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let to_u8 = |v: f32| ((v.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8;
    let plane = h * w;
    for (k, image) in values.chunks_exact(c * plane).enumerate() {
        let x0 = PAD + (k % cols) as u32 * tile_w;
        let y0 = PAD + (k / cols) as u32 * tile_h;
        for y in 0..h {
            for x in 0..w {
                let at = y * w + x;
                let color = if c >= 3 {
                    RGBColor(to_u8(image[at]), to_u8(image[plane + at]), to_u8(image[2 * plane + at]))
                } else {
                    let g = to_u8(image[at]);
                    RGBColor(g, g, g)
                };
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = (x0 + x as u32 * scale + dx) as i32;
                        let py = (y0 + y as u32 * scale + dy) as i32;
                        root.draw_pixel((px, py), &color)?;
                    }
                }
            }
        }
    }
    root.present()?;
    Ok(())
}

/// Render `d_s_t` (top, with the zero line) and `r_s_t` (bottom) over the
/// iterations recorded so far into `dir/diagnostics.png`, and dump the same
/// records to `dir/diagnostics.json`.
pub fn plot_diagnostics(dir: &Path, record: &DiagnosticsRecord) -> anyhow::Result<()> {
    let seen = record.seen();
    serde_json::to_writer(std::fs::File::create(dir.join("diagnostics.json"))?, &seen)?;
    if seen.filled < 2 {
        return Ok(());
    }

    let png = dir.join("diagnostics.png");
    let root = BitMapBackend::new(&png, (1000, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 1));

    let x_max = (seen.filled - 1) as f32;
    for (panel, (series, color)) in panels
        .iter()
        .zip([(&seen.d_s_t, &BLUE), (&seen.r_s_t, &RED)])
    {
        let finite = series.iter().copied().filter(|v| v.is_finite());
        let (lo, hi) = finite.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let pad = ((hi - lo) * 0.05).max(1e-6);
        let y_range = (lo - pad) as f32..(hi + pad) as f32;

        let mut chart = ChartBuilder::on(panel)
            .margin(20)
            .build_cartesian_2d(0.0f32..x_max.max(1.0), y_range)?;
        chart.draw_series(LineSeries::new(
            [(0.0f32, 0.0f32), (x_max, 0.0f32)],
            &BLACK,
        ))?;
        chart.draw_series(LineSeries::new(
            series
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, &v)| (i as f32, v as f32)),
            color,
        ))?;
    }
    root.present()?;
    Ok(())
}

/// Density grids of a toy run, each `res × res`, row 0 at the top (`y = +extent`).
#[derive(Debug, Clone)]
pub struct Landscape {
    pub res: usize,
    pub extent: f64,
    pub true_density: Vec<f64>,
    /// Normalized `exp(−2f/ε²)` (or `exp(−f)` when `ε = 0`).
    pub learned_density: Vec<f64>,
    /// Gaussian KDE of the short-run samples.
    pub kde_density: Vec<f64>,
}

impl Landscape {
    /// Evaluate the three densities on a `res × res` grid covering the toy
    /// distribution's support.
    pub fn evaluate<B: Backend, F: EnergyFunction<B>>(
        dist: &ToyDistribution,
        energy: &F,
        epsilon: f64,
        samples: &[[f32; 2]],
        bandwidth: f64,
        res: usize,
        device: &B::Device,
    ) -> Self {
        let extent = dist.extent();
        let cell = 2.0 * extent / res as f64;
        let center = |k: usize| -extent + (k as f64 + 0.5) * cell;

        let grid: Vec<[f32; 2]> = (0..res)
            .flat_map(|row| {
                let y = -center(row);
                (0..res).map(move |col| [center(col) as f32, y as f32])
            })
            .collect();

        let true_density = grid
            .iter()
            .map(|p| dist.density(p[0] as f64, p[1] as f64))
            .collect();

        let temperature = if epsilon > 0.0 { 2.0 / (epsilon * epsilon) } else { 1.0 };
        let mut logits = Vec::with_capacity(grid.len());
        for chunk in grid.chunks(GRID_CHUNK) {
            let f = tensor_to_flat(energy.energy(points_to_states(chunk, device)));
            logits.extend(f.into_iter().map(|e| -(e as f64) * temperature));
        }
        let learned_density = normalize_density(softmax_weights(&logits), cell);

        let kde_density = kde_grid(samples, extent, res, bandwidth);

        Self {
            res,
            extent,
            true_density,
            learned_density,
            kde_density,
        }
    }

    /// Render densities (top row) and log-densities (bottom row) for ground
    /// truth, learned energy and short-run KDE, left to right.
    pub fn plot(&self, path: &Path) -> anyhow::Result<()> {
        let res = self.res as u32;
        let root = BitMapBackend::new(path, (3 * res, 2 * res)).into_drawing_area();
        root.fill(&WHITE)?;
        let panels = root.split_evenly((2, 3));

        let grids = [&self.true_density, &self.learned_density, &self.kde_density];
        for (k, panel) in panels.iter().enumerate() {
            let grid = grids[k % 3];
            let values: Vec<f64> = if k < 3 {
                grid.clone()
            } else {
                grid.iter().map(|d| d.max(1e-12).ln()).collect()
            };
            draw_heatmap(panel, &values, self.res)?;
        }
        root.present()?;
        Ok(())
    }
}

/// `exp(l − max l)` for each logit.
fn softmax_weights(logits: &[f64]) -> Vec<f64> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    logits
        .iter()
        .map(|l| if l.is_finite() { (l - max).exp() } else { 0.0 })
        .collect()
}

/// Scale non-negative weights so they integrate to one over cells of side `cell`.
fn normalize_density(weights: Vec<f64>, cell: f64) -> Vec<f64> {
    let mass: f64 = weights.iter().sum::<f64>() * cell * cell;
    if mass > 0.0 {
        weights.into_iter().map(|w| w / mass).collect()
    } else {
        weights
    }
}

/// Gaussian KDE on the grid: bin the samples, then blur with a separable
/// kernel of standard deviation `bandwidth`.
fn kde_grid(samples: &[[f32; 2]], extent: f64, res: usize, bandwidth: f64) -> Vec<f64> {
    let cell = 2.0 * extent / res as f64;
    let mut hist = vec![0.0; res * res];
    for p in samples {
        let col = ((p[0] as f64 + extent) / cell).floor();
        let row = ((extent - p[1] as f64) / cell).floor();
        if (0.0..res as f64).contains(&col) && (0.0..res as f64).contains(&row) {
            hist[row as usize * res + col as usize] += 1.0;
        }
    }

    let sigma = (bandwidth / cell).max(1e-3);
    let radius = ((3.0 * sigma).ceil() as usize).min(res);
    let kernel: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let d = k as f64 - radius as f64;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    let kernel: Vec<f64> = kernel.into_iter().map(|k| k / total).collect();

    let blur = |src: &[f64], horizontal: bool| -> Vec<f64> {
        let mut out = vec![0.0; res * res];
        for row in 0..res {
            for col in 0..res {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let offset = k as isize - radius as isize;
                    let (r, c) = if horizontal {
                        (row as isize, col as isize + offset)
                    } else {
                        (row as isize + offset, col as isize)
                    };
                    if (0..res as isize).contains(&r) && (0..res as isize).contains(&c) {
                        acc += weight * src[r as usize * res + c as usize];
                    }
                }
                out[row * res + col] = acc;
            }
        }
        out
    };
    let smoothed = blur(&blur(&hist, true), false);

    let n = samples.len().max(1) as f64;
    smoothed.into_iter().map(|v| v / (n * cell * cell)).collect()
}

fn draw_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    values: &[f64],
    res: usize,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    for row in 0..res {
        for col in 0..res {
            let v = values[row * res + col];
            let t = if v.is_finite() { (v - lo) / span } else { 0.0 };
            area.draw_pixel((col as i32, row as i32), &heat_color(t))?;
        }
    }
    Ok(())
}

/// Dark blue → teal → yellow ramp for `t ∈ [0, 1]`.
fn heat_color(t: f64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 4] = [
        (68.0, 1.0, 84.0),
        (49.0, 104.0, 142.0),
        (53.0, 183.0, 121.0),
        (253.0, 231.0, 37.0),
    ];
    let t = t.clamp(0.0, 1.0) * (STOPS.len() - 1) as f64;
    let i = (t.floor() as usize).min(STOPS.len() - 2);
    let f = t - i as f64;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    let mix = |x: f64, y: f64| (x + (y - x) * f).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}
