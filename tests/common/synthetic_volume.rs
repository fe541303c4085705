use mpr_volume::{Affine, Dims, EngineConfig, Spacing, ViewerSession, VolumeGrid};

/// Intensity ramp along x, `value = x + 10 * z`.
pub fn ramp(dims: Dims, spacing: Option<Spacing>) -> VolumeGrid {
    let mut raw = Vec::with_capacity(dims.voxel_count());
    for z in 0..dims.depth {
        for _y in 0..dims.height {
            for x in 0..dims.width {
                raw.push((x + 10 * z) as f32);
            }
        }
    }
    VolumeGrid::load(raw, dims, spacing, Affine::identity()).expect("ramp volume")
}

/// Label 1 inside the lower-left-front octant, label 2 in the opposite corner voxel.
pub fn octant_mask(dims: Dims) -> Vec<u16> {
    let mut raw = vec![0u16; dims.voxel_count()];
    for z in 0..dims.depth / 2 {
        for y in 0..dims.height / 2 {
            for x in 0..dims.width / 2 {
                raw[(z * dims.height + y) * dims.width + x] = 1;
            }
        }
    }
    if let Some(last) = raw.last_mut() {
        *last = 2;
    }
    raw
}

/// An 8x8x8 session with unit spacing, a ramp scan and the octant mask loaded.
pub fn session_with_mask(config: EngineConfig) -> ViewerSession {
    let dims = Dims::new(8, 8, 8);
    let mut session = ViewerSession::new(config);
    session.load_scan("synthetic", ramp(dims, Some(Spacing::default())));
    session
        .load_mask(octant_mask(dims), dims)
        .expect("mask matches scan");
    session
}
