use serde::Serialize;

use crate::enums::Orientation;
use crate::geometry::{PlanePoint, Voxel};
use crate::navigator::SliceIndex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub voxel: Voxel,
    pub note: String,
}

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    points: Vec<Annotation>,
}

impl Annotations {
    pub fn add(&mut self, voxel: Voxel, note: impl Into<String>) {
        self.points.push(Annotation {
            voxel,
            note: note.into(),
        });
    }

    pub fn all(&self) -> &[Annotation] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Annotations lying on the current slice of `orientation`, in its local axes.
    pub fn on_slice(
        &self,
        orientation: Orientation,
        slices: SliceIndex,
    ) -> Vec<(PlanePoint, &Annotation)> {
        let axis = orientation.fixed_axis();
        let index = slices.get(orientation);
        self.points
            .iter()
            .filter(|a| a.voxel.axis(axis) == index)
            .map(|a| (a.voxel.project(orientation), a))
            .collect()
    }
}
