//! Segmentation label volume co-registered with the scan.

use log::info;
use ndarray::Array3;
use ndarray::parallel::prelude::*;

use crate::error::{EngineError, Result};
use crate::geometry::Dims;
use crate::volume::check_raw_len;

/// RGBA colour with components in `[0, 1]`.
pub type Rgba = [f32; 4];

/// Overlay hues. Index 0 is never used for label 0, which is always transparent.
pub const PALETTE: [[f32; 3]; 9] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.5, 0.0],
    [0.5, 0.0, 1.0],
    [0.0, 0.5, 0.0],
];

pub const TRANSPARENT: Rgba = [0.0, 0.0, 0.0, 0.0];

/// Deterministic overlay colour of a label.
pub fn color_of(label: u16) -> Rgba {
    if label == 0 {
        return TRANSPARENT;
    }
    let [r, g, b] = PALETTE[usize::from(label) % PALETTE.len()];
    [r, g, b, 1.0]
}

/// Voxel count per label value, zero included, in ascending label order.
///
/// Each parallel split keeps a dense table that only grows to the largest label it has
/// seen, so masks with few small label values stay cheap.
pub fn label_counts(labels: &Array3<u16>) -> Vec<(u16, usize)> {
    let counts = labels
        .par_iter()
        .fold(Vec::new, |mut acc: Vec<usize>, &label| {
            let slot = usize::from(label);
            if slot >= acc.len() {
                acc.resize(slot + 1, 0);
            }
            acc[slot] += 1;
            acc
        })
        .reduce(Vec::new, |a, b| {
            let (mut long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            long.iter_mut().zip(short).for_each(|(x, y)| *x += y);
            long
        });
    counts
        .into_iter()
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| (label as u16, count))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct LabelMask {
    labels: Option<Array3<u16>>,
    present_values: Vec<u16>,
}

impl LabelMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a label volume for a grid of shape `grid_dims`.
    ///
    /// # Errors
    ///
    /// [`EngineError::ShapeMismatch`] when `dims` differs from `grid_dims`, and
    /// [`EngineError::Shape`] when `raw` does not hold `dims` elements. Either way the
    /// previously loaded mask is left untouched.
    pub fn load(&mut self, raw: Vec<u16>, dims: Dims, grid_dims: Dims) -> Result<()> {
        if dims != grid_dims {
            return Err(EngineError::ShapeMismatch {
                grid: grid_dims,
                mask: dims,
            });
        }
        check_raw_len(dims, raw.len())?;
        let labels = Array3::from_shape_vec(dims.shape(), raw).map_err(|_| EngineError::Shape {
            dims,
            expected: dims.voxel_count(),
            actual: 0,
        })?;
        self.set_labels(labels);
        Ok(())
    }

    /// Loads an already shaped label array.
    pub fn load_array(&mut self, labels: Array3<u16>, grid_dims: Dims) -> Result<()> {
        let dims = Dims::from_shape(labels.dim());
        if dims != grid_dims {
            return Err(EngineError::ShapeMismatch {
                grid: grid_dims,
                mask: dims,
            });
        }
        self.set_labels(labels);
        Ok(())
    }

    fn set_labels(&mut self, labels: Array3<u16>) {
        self.present_values = label_counts(&labels)
            .into_iter()
            .map(|(label, _)| label)
            .filter(|&label| label != 0)
            .collect();
        info!(
            "loaded mask with {} labels: {}",
            self.present_values.len(),
            Dims::from_shape(labels.dim())
        );
        self.labels = Some(labels);
    }

    pub fn clear(&mut self) {
        self.labels = None;
        self.present_values.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.labels.is_some()
    }

    pub fn labels(&self) -> Option<&Array3<u16>> {
        self.labels.as_ref()
    }

    /// Distinct non-zero labels, ascending.
    pub fn present_values(&self) -> &[u16] {
        &self.present_values
    }

    pub fn dims(&self) -> Option<Dims> {
        self.labels.as_ref().map(|l| Dims::from_shape(l.dim()))
    }
}
