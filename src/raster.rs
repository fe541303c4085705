//! Built-in artifact renderer: grey-level slice rasters with a label overlay, and
//! front-most-label projections standing in for 3-D surface snapshots.

use image::{Rgba, RgbaImage};
use ndarray::Array3;
use rayon::prelude::*;

use crate::enums::{Interpolation, LabelFilter, Orientation};
use crate::error::{EngineError, Result};
use crate::geometry::{Dims, Voxel};
use crate::intensity::WindowLevel;
use crate::interpolator::Interpolator;
use crate::label_mask::color_of;
use crate::report::{ArtifactRequest, ArtifactTarget, ReportScene, SnapshotRenderer};
use crate::volume::slice_of;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone)]
pub struct SliceRasterizer {
    pub interpolation: Interpolation,
    /// Fixed display window; `None` spans the volume's intensity range.
    pub window: Option<WindowLevel>,
    pub mask_opacity: f32,
}

impl Default for SliceRasterizer {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            window: None,
            mask_opacity: 0.5,
        }
    }
}

impl SnapshotRenderer for SliceRasterizer {
    fn render(&self, scene: &ReportScene, request: &ArtifactRequest) -> Result<RgbaImage> {
        let (width, height) = request.size;
        if width == 0 || height == 0 {
            return Err(EngineError::Render("artifact size must be non-zero".to_string()));
        }
        match request.target {
            ArtifactTarget::Slice { orientation, index } => {
                self.render_slice(scene, orientation, index, request.labels, request.size)
            }
            ArtifactTarget::Projection { angle } => {
                self.render_projection(scene, angle, request.labels, request.size)
            }
        }
    }
}

impl SliceRasterizer {
    #[inline]
    fn normalize_to_u8(value: f64) -> u8 {
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn render_slice(
        &self,
        scene: &ReportScene,
        orientation: Orientation,
        index: usize,
        filter: LabelFilter,
        size: (u32, u32),
    ) -> Result<RgbaImage> {
        let grid = &scene.grid;
        let slice = grid.get_slice_from_axis(index, orientation).ok_or_else(|| {
            EngineError::Render(format!("{} slice {index} is out of range", orientation.name()))
        })?;
        let (slice_height, slice_width) = slice.dim();
        let (plane_width, plane_height) = match self.interpolation {
            Interpolation::Bilinear => {
                let isotropic =
                    Interpolator::get_isotropic_dimensions(grid.geometry().spacing, grid.dims());
                Interpolator::plane_size(orientation, isotropic)
            }
            Interpolation::None => (slice_width as u32, slice_height as u32),
        };
        let (w, h) = fit(plane_width, plane_height, size);
        let intensity = Interpolator::resample(&slice.view(), w, h);
        let window = self.window.unwrap_or_else(|| {
            let (min, max) = grid.min_max();
            WindowLevel::from_range(f64::from(min), f64::from(max))
        });
        let labels = scene
            .labels
            .as_ref()
            .map(|labels| slice_of(labels, index, orientation));
        let opacity = self.mask_opacity.clamp(0.0, 1.0);

        let pixels: Vec<[u8; 4]> = (0..h as usize)
            .into_par_iter()
            .flat_map_iter(|y| {
                let intensity = &intensity;
                let labels = &labels;
                (0..w as usize).map(move |x| {
                    let grey = window.normalize(f64::from(intensity[[y, x]])) as f32;
                    let mut rgb = [grey; 3];
                    if let Some(labels) = labels {
                        let ly = nearest(y, h as usize, slice_height);
                        let lx = nearest(x, w as usize, slice_width);
                        let label = labels[[ly, lx]];
                        if filter.accepts(label) {
                            let color = color_of(label);
                            for (channel, tint) in rgb.iter_mut().zip(color) {
                                *channel = *channel * (1.0 - opacity) + tint * opacity;
                            }
                        }
                    }
                    let [r, g, b] = rgb.map(|c| Self::normalize_to_u8(f64::from(c)));
                    [r, g, b, 255]
                })
            })
            .collect();

        Ok(compose(size, w, h, &pixels))
    }

    fn render_projection(
        &self,
        scene: &ReportScene,
        angle: usize,
        filter: LabelFilter,
        size: (u32, u32),
    ) -> Result<RgbaImage> {
        let labels = scene
            .labels
            .as_ref()
            .ok_or(EngineError::MissingData("no label mask loaded"))?;
        let orientation = Orientation::ALL[angle % Orientation::ALL.len()];
        let projection = project_labels(labels, orientation, filter);
        let (plane_height, plane_width) = (projection.len(), projection.first().map_or(0, Vec::len));
        let (w, h) = fit(plane_width as u32, plane_height as u32, size);

        let pixels: Vec<[u8; 4]> = (0..h as usize)
            .flat_map(|y| {
                let row = &projection[nearest(y, h as usize, plane_height)];
                (0..w as usize).map(move |x| row[nearest(x, w as usize, plane_width)])
            })
            .collect();
        Ok(compose(size, w, h, &pixels))
    }
}

/// For each ray along the plane's fixed axis, the shaded colour of the first accepted label.
fn project_labels(
    labels: &Array3<u16>,
    orientation: Orientation,
    filter: LabelFilter,
) -> Vec<Vec<[u8; 4]>> {
    let dims = Dims::from_shape(labels.dim());
    let fixed = orientation.fixed_axis();
    let (h_axis, v_axis) = orientation.local_axes();
    let (plane_width, plane_height) = (dims.extent(h_axis), dims.extent(v_axis));
    let depth = dims.extent(fixed);

    (0..plane_height)
        .into_par_iter()
        .map(|v| {
            (0..plane_width)
                .map(|u| {
                    let mut voxel = Voxel::default();
                    voxel.set_axis(h_axis, u);
                    voxel.set_axis(v_axis, v);
                    let hit = (0..depth).find_map(|k| {
                        voxel.set_axis(fixed, k);
                        let label = labels[voxel.index()];
                        filter.accepts(label).then_some((k, label))
                    });
                    match hit {
                        Some((k, label)) => {
                            let shade = 1.0 - 0.6 * k as f32 / depth as f32;
                            let [r, g, b, _] = color_of(label);
                            let c = |x: f32| (x * shade * 255.0).round().clamp(0.0, 255.0) as u8;
                            [c(r), c(g), c(b), 255]
                        }
                        None => BACKGROUND.0,
                    }
                })
                .collect()
        })
        .collect()
}

/// Largest size with the plane's aspect ratio that fits into `bounds`.
fn fit(plane_width: u32, plane_height: u32, bounds: (u32, u32)) -> (u32, u32) {
    let (plane_width, plane_height) = (plane_width.max(1), plane_height.max(1));
    let scale = (bounds.0 as f64 / plane_width as f64).min(bounds.1 as f64 / plane_height as f64);
    let w = ((plane_width as f64 * scale).round() as u32).clamp(1, bounds.0);
    let h = ((plane_height as f64 * scale).round() as u32).clamp(1, bounds.1);
    (w, h)
}

#[inline]
fn nearest(index: usize, out_len: usize, src_len: usize) -> usize {
    let position = (index as f64 + 0.5) / out_len as f64 * src_len as f64;
    (position as usize).min(src_len.saturating_sub(1))
}

/// Centres a `w` x `h` pixel block on a background canvas of `size`.
fn compose(size: (u32, u32), w: u32, h: u32, pixels: &[[u8; 4]]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(size.0, size.1, BACKGROUND);
    let (ox, oy) = ((size.0 - w) / 2, (size.1 - h) / 2);
    for (i, pixel) in pixels.iter().enumerate() {
        let (x, y) = (i as u32 % w, i as u32 / w);
        canvas.put_pixel(ox + x, oy + y, Rgba(*pixel));
    }
    canvas
}
