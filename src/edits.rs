//! Destructive voxel transforms. Each produces a new array of the same shape; the
//! session snapshots the previous voxels into the edit history before applying one.

use ndarray::{Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geometry::Dims;
use crate::intensity::IntensityStats;
use crate::volume::VoxelData;

const HISTOGRAM_BINS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    GammaBrighten,
    GammaDarken,
    Sigmoid,
    /// Stretches the 2nd..98th percentile range onto `[0, 1]`.
    RescaleIntensity,
    HistogramEqualization,
    GaussianSmoothing { sigma: f64 },
    /// Cubic window; even sizes are rounded up, sizes below 3 become 3.
    MedianFilter { size: usize },
    BinaryThreshold { threshold: f64 },
    BinaryInverted { threshold: f64 },
    /// Caps values above the threshold.
    Truncate { threshold: f64 },
    /// Keeps `[threshold, 2 * threshold]`, zeroes the rest.
    RangePass { threshold: f64 },
    Otsu,
    /// Shifts negatives up, rounds and stores the result as `u16` labels.
    ConvertToLabels,
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::GammaBrighten => "gamma brighten",
            EditOp::GammaDarken => "gamma darken",
            EditOp::Sigmoid => "sigmoid",
            EditOp::RescaleIntensity => "rescale intensity",
            EditOp::HistogramEqualization => "histogram equalization",
            EditOp::GaussianSmoothing { .. } => "gaussian smoothing",
            EditOp::MedianFilter { .. } => "median filter",
            EditOp::BinaryThreshold { .. } => "binary threshold",
            EditOp::BinaryInverted { .. } => "binary inverted threshold",
            EditOp::Truncate { .. } => "truncate",
            EditOp::RangePass { .. } => "range pass",
            EditOp::Otsu => "otsu threshold",
            EditOp::ConvertToLabels => "integer label conversion",
        }
    }

    /// Checks the parameters against a volume of shape `dims` without touching voxels.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidParameter`] for non-finite thresholds, a non-positive sigma, and
    /// Gaussian or median windows reaching further than the volume's largest extent.
    pub fn validate(&self, dims: Dims) -> Result<()> {
        let largest = dims.depth.max(dims.height).max(dims.width);
        match *self {
            EditOp::GaussianSmoothing { sigma } => {
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(EngineError::InvalidParameter(format!(
                        "sigma must be positive, got {sigma}"
                    )));
                }
                let radius = kernel_radius(sigma);
                if radius > largest as f64 {
                    return Err(EngineError::InvalidParameter(format!(
                        "sigma {sigma} needs a kernel radius of {radius}, volume extent is {largest}"
                    )));
                }
            }
            EditOp::MedianFilter { size } => {
                let size = median_size(size);
                if size / 2 > largest {
                    return Err(EngineError::InvalidParameter(format!(
                        "median window {size} exceeds volume extent {largest}"
                    )));
                }
            }
            EditOp::BinaryThreshold { threshold }
            | EditOp::BinaryInverted { threshold }
            | EditOp::Truncate { threshold }
            | EditOp::RangePass { threshold } => {
                finite(threshold)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Runs the transform on `data`, returning new voxels of the same shape.
    pub fn apply(&self, data: &VoxelData) -> Result<VoxelData> {
        self.validate(data.dims())?;
        let (min, max) = data.min_max();
        let input = data.to_intensity();
        let output = match *self {
            EditOp::ConvertToLabels => return Ok(VoxelData::Labels(convert_to_labels(data))),
            EditOp::GammaBrighten => gamma(&input, min, max, 0.5),
            EditOp::GammaDarken => gamma(&input, min, max, 2.0),
            EditOp::Sigmoid => sigmoid(&input, min, max),
            EditOp::RescaleIntensity => rescale_intensity(data, &input)?,
            EditOp::HistogramEqualization => equalize_histogram(&input, min, max),
            EditOp::GaussianSmoothing { sigma } => gaussian_smoothing(&input, sigma)?,
            EditOp::MedianFilter { size } => median_filter(&input, size),
            EditOp::BinaryThreshold { threshold } => {
                let t = finite(threshold)?;
                input.mapv(|v| if v > t { max } else { 0.0 })
            }
            EditOp::BinaryInverted { threshold } => {
                let t = finite(threshold)?;
                input.mapv(|v| if v > t { 0.0 } else { max })
            }
            EditOp::Truncate { threshold } => {
                let t = finite(threshold)?;
                input.mapv(|v| if v > t { t } else { v })
            }
            EditOp::RangePass { threshold } => {
                let t = finite(threshold)?;
                let upper = t * 2.0;
                input.mapv(|v| if v >= t && v <= upper { v } else { 0.0 })
            }
            EditOp::Otsu => {
                let t = otsu_threshold(&input, min, max);
                input.mapv(|v| if v > t { max } else { 0.0 })
            }
        };
        Ok(VoxelData::Intensity(output))
    }
}

fn finite(threshold: f64) -> Result<f32> {
    if !threshold.is_finite() {
        return Err(EngineError::InvalidParameter(format!(
            "threshold must be finite, got {threshold}"
        )));
    }
    Ok(threshold as f32)
}

fn gamma(input: &Array3<f32>, min: f32, max: f32, exponent: f32) -> Array3<f32> {
    let span = max - min;
    let mut out = input.clone();
    out.par_mapv_inplace(|v| {
        let norm = ((v - min) / (span + 1e-5)).max(0.0);
        norm.powf(exponent) * span + min
    });
    out
}

fn sigmoid(input: &Array3<f32>, min: f32, max: f32) -> Array3<f32> {
    let span = max - min;
    let gain = if span > 0.0 { 10.0 / span } else { 0.0 };
    let mean = input.mean().unwrap_or(0.0);
    let mut out = input.clone();
    out.par_mapv_inplace(|v| span * (1.0 / (1.0 + (-gain * (v - mean)).exp())) + min);
    out
}

fn rescale_intensity(data: &VoxelData, input: &Array3<f32>) -> Result<Array3<f32>> {
    let stats = IntensityStats::from_data(data);
    let low = stats.percentile(2.0) as f32;
    let high = stats.percentile(98.0) as f32;
    if high <= low {
        return Err(EngineError::InvalidParameter(
            "intensity range between the 2nd and 98th percentile is empty".to_string(),
        ));
    }
    let mut out = input.clone();
    out.par_mapv_inplace(|v| ((v - low) / (high - low)).clamp(0.0, 1.0));
    Ok(out)
}

fn histogram(input: &Array3<f32>, min: f32, max: f32) -> [u64; HISTOGRAM_BINS] {
    let span = (max - min).max(f32::EPSILON);
    let mut bins = [0u64; HISTOGRAM_BINS];
    for &value in input.iter().filter(|v| !v.is_nan()) {
        let normalized = ((value - min) / span).clamp(0.0, 1.0);
        let bin = ((normalized * HISTOGRAM_BINS as f32) as usize).min(HISTOGRAM_BINS - 1);
        bins[bin] += 1;
    }
    bins
}

fn equalize_histogram(input: &Array3<f32>, min: f32, max: f32) -> Array3<f32> {
    if max <= min {
        return input.clone();
    }
    let bins = histogram(input, min, max);
    let mut cdf = [0f64; HISTOGRAM_BINS];
    let mut running = 0u64;
    for (slot, count) in cdf.iter_mut().zip(bins) {
        running += count;
        *slot = running as f64;
    }
    let (cdf_min, cdf_max) = (cdf[0], cdf[HISTOGRAM_BINS - 1]);
    if cdf_max <= cdf_min {
        return input.clone();
    }
    let (min, max) = (f64::from(min), f64::from(max));
    let scaled: Vec<f64> = cdf
        .iter()
        .map(|c| (c - cdf_min) * (max - min) / (cdf_max - cdf_min) + min)
        .collect();
    let width = (max - min) / HISTOGRAM_BINS as f64;

    let mut out = input.clone();
    out.par_mapv_inplace(|v| {
        // Piecewise-linear through the left bin edges.
        let position = (f64::from(v) - min) / width;
        if position <= 0.0 {
            return scaled[0] as f32;
        }
        let lower = position.floor() as usize;
        if lower >= HISTOGRAM_BINS - 1 {
            return scaled[HISTOGRAM_BINS - 1] as f32;
        }
        let t = position - lower as f64;
        (scaled[lower] + (scaled[lower + 1] - scaled[lower]) * t) as f32
    });
    out
}

/// Mirror index into `[0, len)`, `d c b a | a b c d` at both ends.
fn reflect(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let wrapped = index.rem_euclid(period);
    if wrapped < len as isize {
        wrapped as usize
    } else {
        (period - 1 - wrapped) as usize
    }
}

fn kernel_radius(sigma: f64) -> f64 {
    (4.0 * sigma + 0.5).floor()
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn gaussian_smoothing(input: &Array3<f32>, sigma: f64) -> Result<Array3<f32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "sigma must be positive, got {sigma}"
        )));
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let mut work = input.mapv(f64::from);
    for axis in 0..3 {
        Zip::from(work.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
            let source = lane.to_vec();
            let len = source.len();
            for (i, out) in lane.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * source[reflect(i as isize + k as isize - radius, len)])
                    .sum();
            }
        });
    }
    Ok(work.mapv(|v| v as f32))
}

/// Odd window size of at least 3.
fn median_size(size: usize) -> usize {
    let size = size.max(3);
    if size % 2 == 0 { size.saturating_add(1) } else { size }
}

fn median_filter(input: &Array3<f32>, size: usize) -> Array3<f32> {
    let size = median_size(size);
    let radius = (size / 2) as isize;
    let (depth, height, width) = input.dim();
    let mut out = Array3::<f32>::zeros(input.dim());
    Zip::indexed(&mut out).par_for_each(|(z, y, x), value| {
        let mut window = Vec::with_capacity(size * size * size);
        for dz in -radius..=radius {
            let zz = reflect(z as isize + dz, depth);
            for dy in -radius..=radius {
                let yy = reflect(y as isize + dy, height);
                for dx in -radius..=radius {
                    let xx = reflect(x as isize + dx, width);
                    window.push(input[[zz, yy, xx]]);
                }
            }
        }
        let middle = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable_by(middle, f32::total_cmp);
        *value = *median;
    });
    out
}

fn otsu_threshold(input: &Array3<f32>, min: f32, max: f32) -> f32 {
    if max <= min {
        return min;
    }
    let bins = histogram(input, min, max);
    let total: f64 = bins.iter().map(|&c| c as f64).sum();
    let weighted_sum: f64 = bins
        .iter()
        .enumerate()
        .map(|(index, &count)| index as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0_f64;
    let mut weight_background = 0.0_f64;
    let mut best_variance = -1.0_f64;
    let mut best_bin = 0usize;
    for (index, &count) in bins.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }
        sum_background += index as f64 * count as f64;
        let mean_background = sum_background / weight_background;
        let mean_foreground = (weighted_sum - sum_background) / weight_foreground;
        let between =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);
        if between > best_variance {
            best_variance = between;
            best_bin = index;
        }
    }
    // Upper edge of the best background bin.
    min + (max - min) * (best_bin + 1) as f32 / HISTOGRAM_BINS as f32
}

fn convert_to_labels(data: &VoxelData) -> Array3<u16> {
    match data {
        VoxelData::Labels(labels) => labels.clone(),
        VoxelData::Intensity(values) => {
            let (min, _) = data.min_max();
            let shift = if min < 0.0 { -f64::from(min) } else { 0.0 };
            let mut out = Array3::<u16>::zeros(values.dim());
            Zip::from(&mut out).and(values).par_for_each(|label, &v| {
                // `as` saturates and maps NaN to zero.
                *label = (f64::from(v) + shift).round_ties_even() as u16;
            });
            out
        }
    }
}
