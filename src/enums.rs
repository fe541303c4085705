use serde::{Deserialize, Serialize};

/// Plane family of a 2-D view through the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        }
    }

    /// Voxel axis held fixed by this plane, as an index into `(x, y, z)`.
    pub fn fixed_axis(self) -> usize {
        match self {
            Orientation::Axial => 2,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 0,
        }
    }

    /// Voxel axes spanning the plane, as `(horizontal, vertical)` indices into `(x, y, z)`.
    pub fn local_axes(self) -> (usize, usize) {
        match self {
            // Looking down Z: X is horizontal, Y is vertical
            Orientation::Axial => (0, 1),
            // Looking down Y: X is horizontal, Z is vertical
            Orientation::Coronal => (0, 2),
            // Looking down X: Y is horizontal, Z is vertical
            Orientation::Sagittal => (1, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Resample Coronal and Sagittal rasters to preserve physical aspect ratio.
    Bilinear,
    #[default]
    None,
}

/// Window/level presets derived from the intensity distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPreset {
    FullDynamicRange,
    Brain,
    SoftTissue,
    Stroke,
    Bone,
}

/// Which labels an artifact should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelFilter {
    #[default]
    All,
    Only(u16),
    None,
}

impl LabelFilter {
    pub fn accepts(self, label: u16) -> bool {
        match self {
            LabelFilter::All => label != 0,
            LabelFilter::Only(value) => label != 0 && label == value,
            LabelFilter::None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_axes_exclude_fixed_axis() {
        for orientation in Orientation::ALL {
            let (h, v) = orientation.local_axes();
            assert_ne!(h, orientation.fixed_axis());
            assert_ne!(v, orientation.fixed_axis());
            assert_ne!(h, v);
        }
    }

    #[test]
    fn label_filter_never_accepts_background() {
        assert!(!LabelFilter::All.accepts(0));
        assert!(!LabelFilter::Only(0).accepts(0));
        assert!(LabelFilter::Only(3).accepts(3));
        assert!(!LabelFilter::Only(3).accepts(4));
        assert!(!LabelFilter::None.accepts(1));
    }
}
