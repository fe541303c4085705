//! # MPR-volume library
//!
//! This crate provides the core of a multi-planar scan viewer: a 3-D scalar
//! volume with its physical geometry, a co-registered segmentation label mask,
//! and three lock-stepped orthogonal slice planes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! On top of that it offers bounded undo for destructive voxel edits
//! (intensity transforms, filters, thresholds, label conversion), per-label
//! volumetrics in cm³, and a cancellable background report that renders
//! per-view and per-label snapshots next to a JSON manifest.
//!
//! Scan file parsing and on-screen rendering are left to the caller. The
//! crate takes raw voxel buffers with their shape, spacing and world
//! transform, and consumes pointer positions already resolved to world space.
//! Voxel scans run in parallel using rayon.
//!
//! # Examples
//!
//! ## Navigating and measuring a volume
//!
//! Load a volume with its mask, jump the crosshair to a world point, and
//! compute label volumes.
//!
//! ```no_run
//! # use mpr_volume::{Affine, Dims, Spacing, ViewerSession, VolumeGrid, WorldPoint};
//! let dims = Dims::new(64, 128, 128);
//! let grid = VolumeGrid::load(
//!     vec![0.0; dims.voxel_count()],
//!     dims,
//!     Some(Spacing::new(0.8, 0.8, 2.5).expect("positive spacing")),
//!     Affine::identity(),
//! )
//! .expect("buffer should match dims");
//!
//! let mut session = ViewerSession::default();
//! session.load_scan("study-1", grid);
//! session
//!     .load_mask(vec![0; dims.voxel_count()], dims)
//!     .expect("mask should match the scan");
//!
//! let navigator = session.navigator_mut().expect("scan is loaded");
//! let voxel = navigator.voxel_from_world(&WorldPoint::new(40.0, 52.0, 80.0));
//! navigator.set_crosshair(voxel);
//!
//! for volume in session.compute_volumes().expect("mask and spacing are known") {
//!     println!("{}: {:.3} cm³", volume.name, volume.volume_cm3);
//! }
//! ```

pub mod analysis;
pub mod annotations;
pub mod config;
pub mod edits;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod history;
pub mod intensity;
pub mod interaction;
mod interpolator;
pub mod label_config;
pub mod label_mask;
pub mod navigator;
pub mod raster;
pub mod report;
pub mod session;
pub mod volume;

pub use analysis::LabelVolume;
pub use config::EngineConfig;
pub use edits::EditOp;
pub use enums::{Interpolation, LabelFilter, Orientation, WindowPreset};
pub use error::{EngineError, Result};
pub use geometry::{Affine, Dims, GridGeometry, PlanePoint, Spacing, Voxel, WorldPoint};
pub use history::EditHistory;
pub use intensity::WindowLevel;
pub use interaction::{Interaction, InteractionMapper, PointerEvent};
pub use label_config::LabelNames;
pub use label_mask::LabelMask;
pub use navigator::{Navigator, NavigatorEvent, SliceIndex};
pub use raster::SliceRasterizer;
pub use report::{
    ArtifactRequest, ArtifactTarget, CancelToken, ReportEvent, ReportHandle, ReportMonitor,
    ReportScene, SnapshotRenderer,
};
pub use session::ViewerSession;
pub use volume::{VolumeGrid, VoxelData};
