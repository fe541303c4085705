//! Index, physical and plane-local coordinate types shared by every component.

use std::fmt;

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::enums::Orientation;
use crate::error::{EngineError, Result};

/// A point in physical (world) space, millimetres.
pub type WorldPoint = Point3<f64>;

/// Tolerance absorbing affine round-off before flooring world coordinates to voxel indices.
const FLOOR_EPSILON: f64 = 1e-6;

/// Grid shape as `(depth, height, width)`, matching the `[z][y][x]` array layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl Dims {
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    pub fn from_shape(shape: (usize, usize, usize)) -> Self {
        Self::new(shape.0, shape.1, shape.2)
    }

    /// `(depth, height, width)`, the ndarray shape of the voxel array.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    pub fn voxel_count(&self) -> usize {
        self.depth * self.height * self.width
    }

    pub fn has_zero_extent(&self) -> bool {
        self.depth == 0 || self.height == 0 || self.width == 0
    }

    /// Extent along a voxel axis given as an index into `(x, y, z)`.
    pub fn extent(&self, axis: usize) -> usize {
        match axis {
            0 => self.width,
            1 => self.height,
            _ => self.depth,
        }
    }

    /// Number of slices a plane family can show.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.extent(orientation.fixed_axis())
    }

    /// Grid midpoint, used as the default slice position after a load.
    pub fn center(&self) -> Voxel {
        Voxel::new(self.width / 2, self.height / 2, self.depth / 2)
    }

    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        (0..self.width as i64).contains(&x)
            && (0..self.height as i64).contains(&y)
            && (0..self.depth as i64).contains(&z)
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.height, self.width)
    }
}

/// Physical size of one voxel along x, y and z in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Spacing {
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        let valid = [x, y, z].iter().all(|v| v.is_finite() && *v > 0.0);
        if !valid {
            return Err(EngineError::InvalidSpacing([x, y, z]));
        }
        Ok(Self { x, y, z })
    }

    pub fn isotropic(size: f64) -> Result<Self> {
        Self::new(size, size, size)
    }

    pub fn voxel_volume_mm3(&self) -> f64 {
        self.x * self.y * self.z
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

/// Integer voxel index `(x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Voxel {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Voxel {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn axis(&self, axis: usize) -> usize {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn set_axis(&mut self, axis: usize, value: usize) {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
    }

    /// Projection of this voxel onto a plane's local axes.
    pub fn project(&self, orientation: Orientation) -> PlanePoint {
        let (h, v) = orientation.local_axes();
        PlanePoint::new(self.axis(h), self.axis(v))
    }

    /// ndarray index `[z, y, x]`.
    pub fn index(&self) -> [usize; 3] {
        [self.z, self.y, self.x]
    }
}

impl fmt::Display for Voxel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// 2-D position within a plane, in that plane's local voxel axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanePoint {
    pub u: usize,
    pub v: usize,
}

impl PlanePoint {
    pub fn new(u: usize, v: usize) -> Self {
        Self { u, v }
    }
}

impl From<PlanePoint> for (usize, usize) {
    fn from(point: PlanePoint) -> Self {
        (point.u, point.v)
    }
}

/// Affine mapping from spacing-scaled voxel coordinates to world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    matrix: Matrix4<f64>,
    inverse: Matrix4<f64>,
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: Matrix4::identity(),
        }
    }

    /// Fails with [`EngineError::SingularTransform`] when the matrix has no inverse.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Result<Self> {
        let inverse = matrix.try_inverse().ok_or(EngineError::SingularTransform)?;
        Ok(Self { matrix, inverse })
    }

    /// Builds the transform from 16 values in row-major order.
    pub fn from_row_major(values: &[f64; 16]) -> Result<Self> {
        Self::from_matrix(Matrix4::from_row_slice(values))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn apply(&self, point: &Point3<f64>) -> WorldPoint {
        let h = self.matrix * point.to_homogeneous();
        Point3::new(h.x, h.y, h.z)
    }

    pub fn apply_inverse(&self, point: &WorldPoint) -> Point3<f64> {
        let h = self.inverse * point.to_homogeneous();
        Point3::new(h.x, h.y, h.z)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

/// Voxel-to-world geometry of a loaded grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub dims: Dims,
    pub spacing: Spacing,
    pub transform: Affine,
}

impl GridGeometry {
    pub fn world_from_voxel(&self, voxel: Voxel) -> WorldPoint {
        let scaled = Point3::new(
            voxel.x as f64 * self.spacing.x,
            voxel.y as f64 * self.spacing.y,
            voxel.z as f64 * self.spacing.z,
        );
        self.transform.apply(&scaled)
    }

    /// Continuous voxel coordinates of a world point, without flooring or clamping.
    pub fn continuous_from_world(&self, world: &WorldPoint) -> Point3<f64> {
        let scaled = self.transform.apply_inverse(world);
        Point3::new(
            scaled.x / self.spacing.x,
            scaled.y / self.spacing.y,
            scaled.z / self.spacing.z,
        )
    }

    /// Floors a world point to a voxel, or `None` if it lies outside the grid.
    pub fn checked_voxel_from_world(&self, world: &WorldPoint) -> Option<Voxel> {
        let [x, y, z] = self.floored(world)?;
        if !self.dims.contains(x, y, z) {
            return None;
        }
        Some(Voxel::new(x as usize, y as usize, z as usize))
    }

    /// Floors a world point to a voxel, clamping each axis to the grid.
    /// Non-finite coordinates clamp to voxel zero on that axis.
    pub fn voxel_from_world(&self, world: &WorldPoint) -> Voxel {
        let continuous = self.continuous_from_world(world);
        let clamp = |value: f64, extent: usize| -> usize {
            if !value.is_finite() {
                return 0;
            }
            let floored = (value + FLOOR_EPSILON).floor();
            floored.clamp(0.0, extent.saturating_sub(1) as f64) as usize
        };
        Voxel::new(
            clamp(continuous.x, self.dims.width),
            clamp(continuous.y, self.dims.height),
            clamp(continuous.z, self.dims.depth),
        )
    }

    fn floored(&self, world: &WorldPoint) -> Option<[i64; 3]> {
        let continuous = self.continuous_from_world(world);
        let mut out = [0i64; 3];
        for (slot, value) in out.iter_mut().zip([continuous.x, continuous.y, continuous.z]) {
            if !value.is_finite() {
                return None;
            }
            *slot = (value + FLOOR_EPSILON).floor() as i64;
        }
        Some(out)
    }
}
