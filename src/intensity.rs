//! Intensity statistics and window/level derivation.

use rayon::prelude::*;

use crate::enums::WindowPreset;
use crate::volume::VoxelData;

/// Display window width and centre in intensity units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub window: f64,
    pub level: f64,
}

impl WindowLevel {
    /// Window spanning `[min, max]`. A degenerate range yields a unit window.
    pub fn from_range(min: f64, max: f64) -> Self {
        Self::new(max - min, (max + min) / 2.0)
    }

    pub fn new(window: f64, level: f64) -> Self {
        let window = if window.is_finite() && window > 0.0 {
            window
        } else {
            1.0
        };
        Self { window, level }
    }

    /// Maps an intensity to `[0, 1]`.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        let low = self.level - self.window / 2.0;
        ((value - low) / self.window).clamp(0.0, 1.0)
    }
}

/// Sorted, NaN-free copy of the samples used for percentile queries.
pub struct IntensityStats {
    sorted: Vec<f32>,
    mean: f64,
}

impl IntensityStats {
    pub fn from_data(data: &VoxelData) -> Self {
        Self::from_values(data.values_f32())
    }

    pub fn from_values(mut values: Vec<f32>) -> Self {
        values.retain(|v| !v.is_nan());
        values.par_sort_unstable_by(f32::total_cmp);
        let mean = if values.is_empty() {
            0.0
        } else {
            values.par_iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
        };
        Self {
            sorted: values,
            mean,
        }
    }

    pub fn min(&self) -> f64 {
        self.sorted.first().copied().map_or(0.0, f64::from)
    }

    pub fn max(&self) -> f64 {
        self.sorted.last().copied().map_or(0.0, f64::from)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Linear-interpolated percentile, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let rank = (p.clamp(0.0, 100.0) / 100.0) * (self.sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let fraction = rank - lower as f64;
        let a = f64::from(self.sorted[lower]);
        let b = f64::from(self.sorted[upper]);
        a + (b - a) * fraction
    }

    pub fn window_level(&self, preset: WindowPreset) -> WindowLevel {
        let (min, max) = (self.min(), self.max());
        let (p1, p99) = (self.percentile(1.0), self.percentile(99.0));
        let robust = p99 - p1;
        match preset {
            WindowPreset::FullDynamicRange => WindowLevel::from_range(min, max),
            WindowPreset::Brain => WindowLevel::new(robust * 0.6, self.mean),
            WindowPreset::SoftTissue => WindowLevel::new(robust * 1.2, self.mean),
            WindowPreset::Stroke => WindowLevel::new(robust * 0.3, self.mean),
            WindowPreset::Bone => WindowLevel::new((max - min) * 0.3, p99),
        }
    }
}
