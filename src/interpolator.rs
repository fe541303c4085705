use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::enums::Orientation;
use crate::geometry::{Dims, Spacing};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Grid shape resampled so every voxel edge has the smallest physical spacing.
    pub(crate) fn get_isotropic_dimensions(spacing: Spacing, dims: Dims) -> Dims {
        let min_spacing = spacing.x.min(spacing.y).min(spacing.z);
        let inv_min_spacing = 1.0 / min_spacing;

        let scale = |extent: usize, axis_spacing: f64| {
            ((extent as f64 * axis_spacing * inv_min_spacing) as usize).max(1)
        };
        Dims::new(
            scale(dims.depth, spacing.z),
            scale(dims.height, spacing.y),
            scale(dims.width, spacing.x),
        )
    }

    /// Raster size `(width, height)` of a plane at isotropic resolution.
    pub(crate) fn plane_size(orientation: Orientation, isotropic: Dims) -> (u32, u32) {
        let (w, h) = match orientation {
            Orientation::Axial => (isotropic.width, isotropic.height),
            Orientation::Coronal => (isotropic.width, isotropic.depth),
            Orientation::Sagittal => (isotropic.height, isotropic.depth),
        };
        (w as u32, h as u32)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Resamples a slice to `width` x `height` with half-pixel centred sampling.
    pub(crate) fn resample(slice: &ArrayView2<f32>, width: u32, height: u32) -> Array2<f32> {
        let (slice_height, slice_width) = slice.dim();
        let values: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| {
                    let norm_x = (x as f32 + 0.5) / width as f32;
                    let norm_y = (y as f32 + 0.5) / height as f32;

                    let src_x = (norm_x * slice_width as f32 - 0.5)
                        .max(0.0)
                        .min((slice_width - 1) as f32);
                    let src_y = (norm_y * slice_height as f32 - 0.5)
                        .max(0.0)
                        .min((slice_height - 1) as f32);

                    Self::bilinear_interpolate(slice, src_y, src_x)
                })
            })
            .collect();
        Array2::from_shape_vec((height as usize, width as usize), values)
            .unwrap_or_else(|_| Array2::zeros((height as usize, width as usize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn isotropic_dimensions_stretch_thick_slices() {
        let spacing = Spacing::new(0.5, 0.5, 2.0).expect("spacing");
        let dims = Interpolator::get_isotropic_dimensions(spacing, Dims::new(10, 64, 64));
        assert_eq!(dims, Dims::new(40, 64, 64));
        assert_eq!(Interpolator::plane_size(Orientation::Coronal, dims), (64, 40));
        assert_eq!(Interpolator::plane_size(Orientation::Sagittal, dims), (64, 40));
    }

    #[test]
    fn bilinear_midpoint_is_average() {
        let slice = array![[0.0_f32, 2.0], [4.0, 6.0]];
        let value = Interpolator::bilinear_interpolate(&slice.view(), 0.5, 0.5);
        assert!((value - 3.0).abs() < 1e-6);
    }

    #[test]
    fn resample_to_same_size_is_identity() {
        let slice = array![[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = Interpolator::resample(&slice.view(), 3, 2);
        for (a, b) in out.iter().zip(slice.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
