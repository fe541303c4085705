//! Three lock-stepped slice positions and the coordinate conversions between voxel,
//! world and plane-local space.
//!
//! The navigator never calls out to views. Every observable change is queued as a
//! [`NavigatorEvent`] that the owner drains with [`Navigator::take_events`]. Changes made
//! inside [`Navigator::update`] are coalesced into a single [`NavigatorEvent::Resync`].

use log::debug;
use serde::Serialize;

use crate::enums::Orientation;
use crate::geometry::{Dims, GridGeometry, PlanePoint, Voxel, WorldPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SliceIndex {
    pub axial: usize,
    pub coronal: usize,
    pub sagittal: usize,
}

impl SliceIndex {
    pub fn get(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => self.axial,
            Orientation::Coronal => self.coronal,
            Orientation::Sagittal => self.sagittal,
        }
    }

    fn slot(&mut self, orientation: Orientation) -> &mut usize {
        match orientation {
            Orientation::Axial => &mut self.axial,
            Orientation::Coronal => &mut self.coronal,
            Orientation::Sagittal => &mut self.sagittal,
        }
    }

    /// The selected 3-D point, `(sagittal, coronal, axial)` as `(x, y, z)`.
    pub fn crosshair(&self) -> Voxel {
        Voxel::new(self.sagittal, self.coronal, self.axial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorEvent {
    /// A single slice index moved outside of a batched update.
    SliceChanged {
        orientation: Orientation,
        index: usize,
    },
    /// One logical update finished; all three planes should redraw.
    Resync { crosshair: Voxel },
}

#[derive(Debug, Clone)]
pub struct Navigator {
    geometry: GridGeometry,
    slices: SliceIndex,
    events: Vec<NavigatorEvent>,
    batch_depth: u32,
}

impl Navigator {
    /// Starts at the grid midpoint.
    pub fn new(geometry: GridGeometry) -> Self {
        let center = geometry.dims.center();
        Self {
            geometry,
            slices: SliceIndex {
                axial: center.z,
                coronal: center.y,
                sagittal: center.x,
            },
            events: Vec::new(),
            batch_depth: 0,
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn dims(&self) -> Dims {
        self.geometry.dims
    }

    pub fn slices(&self) -> SliceIndex {
        self.slices
    }

    pub fn slice_index(&self, orientation: Orientation) -> usize {
        self.slices.get(orientation)
    }

    /// Clamps `index` into the plane's range and stores it. Returns whether it moved.
    pub fn set_slice(&mut self, orientation: Orientation, index: i64) -> bool {
        let last = self.dims().slice_count(orientation).saturating_sub(1);
        let clamped = index.clamp(0, last as i64) as usize;
        let slot = self.slices.slot(orientation);
        if *slot == clamped {
            return false;
        }
        *slot = clamped;
        if self.batch_depth == 0 {
            self.events.push(NavigatorEvent::SliceChanged {
                orientation,
                index: clamped,
            });
        }
        true
    }

    /// Moves one plane by `delta` slices, stopping at either end.
    pub fn step_slice(&mut self, orientation: Orientation, delta: i64) -> bool {
        let current = self.slice_index(orientation) as i64;
        self.set_slice(orientation, current.saturating_add(delta))
    }

    /// Runs `f` with per-slice notifications blocked, then queues exactly one
    /// [`NavigatorEvent::Resync`]. Returns whether any slice index moved.
    pub fn update<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut Navigator),
    {
        let before = self.slices;
        self.batch_depth += 1;
        f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.events.push(NavigatorEvent::Resync {
                crosshair: self.crosshair(),
            });
        }
        self.slices != before
    }

    /// Moves all three planes so they intersect at `voxel`.
    pub fn set_crosshair(&mut self, voxel: Voxel) -> bool {
        self.update(|nav| {
            nav.set_slice(Orientation::Sagittal, voxel.x as i64);
            nav.set_slice(Orientation::Coronal, voxel.y as i64);
            nav.set_slice(Orientation::Axial, voxel.z as i64);
        })
    }

    pub fn crosshair(&self) -> Voxel {
        self.slices.crosshair()
    }

    /// Where the other two planes cross `orientation`, in its local axes.
    pub fn crosshair_for(&self, orientation: Orientation) -> PlanePoint {
        self.crosshair().project(orientation)
    }

    pub fn crosshair_world(&self) -> WorldPoint {
        self.geometry.world_from_voxel(self.crosshair())
    }

    pub fn world_from_voxel(&self, voxel: Voxel) -> WorldPoint {
        self.geometry.world_from_voxel(voxel)
    }

    /// Inverts the origin transform and floors, clamping each axis into the grid.
    pub fn voxel_from_world(&self, world: &WorldPoint) -> Voxel {
        self.geometry.voxel_from_world(world)
    }

    /// Updates the two axes not fixed by `orientation` from a voxel, in one logical update.
    pub fn track(&mut self, orientation: Orientation, voxel: Voxel) -> bool {
        let fixed = orientation.fixed_axis();
        let moved = self.update(|nav| {
            for plane in Orientation::ALL {
                let axis = plane.fixed_axis();
                if axis != fixed {
                    nav.set_slice(plane, voxel.axis(axis) as i64);
                }
            }
        });
        debug!(
            "{} view tracked to {}, crosshair {}",
            orientation.name(),
            voxel,
            self.crosshair()
        );
        moved
    }

    pub fn take_events(&mut self) -> Vec<NavigatorEvent> {
        std::mem::take(&mut self.events)
    }
}
