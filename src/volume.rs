use crate::enums::Orientation;
use crate::error::{EngineError, Result};
use crate::geometry::{Affine, Dims, GridGeometry, Spacing};

use ndarray::Array2;
use ndarray::Array3;
use ndarray::parallel::prelude::*;
use ndarray::s;

/// Element type of the voxel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Float32,
    UInt16,
}

/// Voxel array, either raw intensities or the result of an integer-label conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    Intensity(Array3<f32>),
    Labels(Array3<u16>),
}

impl VoxelData {
    /// Dimensions as (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            VoxelData::Intensity(data) => data.dim(),
            VoxelData::Labels(data) => data.dim(),
        }
    }

    pub fn dims(&self) -> Dims {
        Dims::from_shape(self.dim())
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            VoxelData::Intensity(_) => ElementKind::Float32,
            VoxelData::Labels(_) => ElementKind::UInt16,
        }
    }

    /// Intensity values as `f32`, converting labels if needed.
    pub fn to_intensity(&self) -> Array3<f32> {
        match self {
            VoxelData::Intensity(data) => data.clone(),
            VoxelData::Labels(data) => data.mapv(f32::from),
        }
    }

    pub fn values_f32(&self) -> Vec<f32> {
        match self {
            VoxelData::Intensity(data) => data.iter().copied().collect(),
            VoxelData::Labels(data) => data.iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Intensity bounds. NaN samples are ignored.
    pub fn min_max(&self) -> (f32, f32) {
        let fold = |(lo, hi): (f32, f32), v: f32| (lo.min(v), hi.max(v));
        let merge = |a: (f32, f32), b: (f32, f32)| (a.0.min(b.0), a.1.max(b.1));
        let identity = || (f32::INFINITY, f32::NEG_INFINITY);
        let (lo, hi) = match self {
            VoxelData::Intensity(data) => data
                .par_iter()
                .fold(identity, |acc, &v| fold(acc, v))
                .reduce(identity, merge),
            VoxelData::Labels(data) => data
                .par_iter()
                .fold(identity, |acc, &v| fold(acc, f32::from(v)))
                .reduce(identity, merge),
        };
        if lo > hi { (0.0, 0.0) } else { (lo, hi) }
    }
}

/// Primary scalar volume with its voxel geometry.
#[derive(Debug, Clone)]
pub struct VolumeGrid {
    data: VoxelData,
    spacing: Option<Spacing>,
    transform: Affine,
}

impl VolumeGrid {
    /// Builds a grid from a flat `[z][y][x]` ordered buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Shape`] if `raw` does not hold exactly `dims` elements and
    /// [`EngineError::ZeroExtent`] if any axis is empty.
    pub fn load(
        raw: Vec<f32>,
        dims: Dims,
        spacing: Option<Spacing>,
        transform: Affine,
    ) -> Result<Self> {
        check_raw_len(dims, raw.len())?;
        let data = Array3::from_shape_vec(dims.shape(), raw).map_err(|_| EngineError::Shape {
            dims,
            expected: dims.voxel_count(),
            actual: 0,
        })?;
        Ok(Self {
            data: VoxelData::Intensity(data),
            spacing,
            transform,
        })
    }

    pub fn from_data(data: VoxelData, spacing: Option<Spacing>, transform: Affine) -> Result<Self> {
        let dims = data.dims();
        if dims.has_zero_extent() {
            return Err(EngineError::ZeroExtent(dims));
        }
        Ok(Self {
            data,
            spacing,
            transform,
        })
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn dims(&self) -> Dims {
        self.data.dims()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    pub fn spacing(&self) -> Option<Spacing> {
        self.spacing
    }

    pub fn require_spacing(&self) -> Result<Spacing> {
        self.spacing.ok_or(EngineError::MissingSpacing)
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    /// Voxel-to-world geometry. Unknown spacing falls back to unit voxels.
    pub fn geometry(&self) -> GridGeometry {
        GridGeometry {
            dims: self.dims(),
            spacing: self.spacing.unwrap_or_default(),
            transform: self.transform.clone(),
        }
    }

    /// Replaces the voxel array in place. The element type may change, the shape may not.
    pub fn replace_data(&mut self, data: VoxelData) -> Result<()> {
        let current = self.dims();
        let incoming = data.dims();
        if current != incoming {
            return Err(EngineError::Shape {
                dims: current,
                expected: current.voxel_count(),
                actual: incoming.voxel_count(),
            });
        }
        self.data = data;
        Ok(())
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data.min_max()
    }

    /// Extracts one slice as intensities, rows along the plane's vertical axis.
    pub fn get_slice_from_axis(&self, index: usize, orientation: Orientation) -> Option<Array2<f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice = match &self.data {
            VoxelData::Intensity(data) => slice_of(data, index, orientation).to_owned(),
            VoxelData::Labels(data) => slice_of(data, index, orientation).mapv(f32::from),
        };
        Some(slice)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < self.dims().slice_count(orientation)
    }
}

/// View of one plane through a `[z][y][x]` array, indexed `[vertical, horizontal]`.
pub(crate) fn slice_of<T>(
    data: &Array3<T>,
    index: usize,
    orientation: Orientation,
) -> ndarray::ArrayView2<'_, T> {
    match orientation {
        Orientation::Axial => data.slice(s![index, .., ..]),
        Orientation::Coronal => data.slice(s![.., index, ..]),
        Orientation::Sagittal => data.slice(s![.., .., index]),
    }
}

pub(crate) fn check_raw_len(dims: Dims, len: usize) -> Result<()> {
    if dims.has_zero_extent() {
        return Err(EngineError::ZeroExtent(dims));
    }
    if len != dims.voxel_count() {
        return Err(EngineError::Shape {
            dims,
            expected: dims.voxel_count(),
            actual: len,
        });
    }
    Ok(())
}
