//! Pointer handling for one 2-D plane view.
//!
//! The rendering layer resolves display positions to world coordinates and hands them in
//! as [`PointerEvent`] messages. A press followed by a release within the movement
//! threshold is a seek to the clicked point. Moving further turns the gesture into a pan,
//! where every movement tick re-centres the crosshair on the world point under the middle
//! of the view. Wheel ticks step the view's own slice and bypass the gesture state.

use log::debug;

use crate::enums::Orientation;
use crate::geometry::{Voxel, WorldPoint};
use crate::navigator::Navigator;

/// Pointer position in display pixels.
pub type DisplayPoint = [f64; 2];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    ButtonDown {
        display: DisplayPoint,
        world: WorldPoint,
    },
    Move {
        display: DisplayPoint,
        /// World point currently at the centre of the view's viewport.
        view_center: WorldPoint,
    },
    ButtonUp {
        display: DisplayPoint,
    },
    /// Positive ticks scroll towards higher slice indices.
    Wheel { ticks: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Tracking {
        origin: DisplayPoint,
        world: WorldPoint,
    },
    Panning,
}

/// What a pointer event did to the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Ignored,
    /// Button held, movement still within the seek threshold.
    Pressed,
    Seek(Voxel),
    Pan(Voxel),
    PanEnded,
    Scroll { orientation: Orientation, index: usize },
}

#[derive(Debug, Clone)]
pub struct InteractionMapper {
    orientation: Orientation,
    threshold_px: f64,
    state: GestureState,
}

impl InteractionMapper {
    pub fn new(orientation: Orientation, threshold_px: f64) -> Self {
        Self {
            orientation,
            threshold_px,
            state: GestureState::Idle,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Drops any in-flight gesture, e.g. when the view loses the pointer.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    pub fn handle(&mut self, event: PointerEvent, navigator: &mut Navigator) -> Interaction {
        match (event, self.state) {
            (PointerEvent::Wheel { ticks }, _) => {
                navigator.step_slice(self.orientation, i64::from(ticks));
                Interaction::Scroll {
                    orientation: self.orientation,
                    index: navigator.slice_index(self.orientation),
                }
            }
            (PointerEvent::ButtonDown { display, world }, _) => {
                self.state = GestureState::Tracking {
                    origin: display,
                    world,
                };
                Interaction::Pressed
            }
            (PointerEvent::Move { display, view_center }, GestureState::Tracking { origin, .. }) => {
                if distance(origin, display) <= self.threshold_px {
                    return Interaction::Pressed;
                }
                debug!("{} view entered pan mode", self.orientation.name());
                self.state = GestureState::Panning;
                Interaction::Pan(self.recenter(navigator, &view_center))
            }
            (PointerEvent::Move { view_center, .. }, GestureState::Panning) => {
                Interaction::Pan(self.recenter(navigator, &view_center))
            }
            (PointerEvent::ButtonUp { display }, GestureState::Tracking { origin, world }) => {
                self.state = GestureState::Idle;
                if distance(origin, display) > self.threshold_px {
                    return Interaction::PanEnded;
                }
                let voxel = navigator.voxel_from_world(&world);
                navigator.track(self.orientation, voxel);
                Interaction::Seek(navigator.crosshair())
            }
            (PointerEvent::ButtonUp { .. }, GestureState::Panning) => {
                self.state = GestureState::Idle;
                Interaction::PanEnded
            }
            (PointerEvent::Move { .. } | PointerEvent::ButtonUp { .. }, GestureState::Idle) => {
                Interaction::Ignored
            }
        }
    }

    fn recenter(&self, navigator: &mut Navigator, view_center: &WorldPoint) -> Voxel {
        let voxel = navigator.voxel_from_world(view_center);
        navigator.track(self.orientation, voxel);
        navigator.crosshair()
    }
}

fn distance(a: DisplayPoint, b: DisplayPoint) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Affine, Dims, GridGeometry, Spacing};
    use crate::navigator::NavigatorEvent;

    fn navigator() -> Navigator {
        Navigator::new(GridGeometry {
            dims: Dims::new(10, 20, 30),
            spacing: Spacing::default(),
            transform: Affine::identity(),
        })
    }

    fn down(x: f64, y: f64, world: [f64; 3]) -> PointerEvent {
        PointerEvent::ButtonDown {
            display: [x, y],
            world: WorldPoint::new(world[0], world[1], world[2]),
        }
    }

    #[test]
    fn click_in_axial_seeks_x_and_y_only() {
        let mut nav = navigator();
        nav.take_events();
        let mut mapper = InteractionMapper::new(Orientation::Axial, 5.0);

        mapper.handle(down(100.0, 100.0, [3.7, 12.2, 8.9]), &mut nav);
        let result = mapper.handle(PointerEvent::ButtonUp { display: [102.0, 101.0] }, &mut nav);

        assert_eq!(result, Interaction::Seek(Voxel::new(3, 12, 5)));
        assert_eq!(mapper.state(), GestureState::Idle);
        let events = nav.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NavigatorEvent::Resync { .. }));
    }

    #[test]
    fn click_in_coronal_leaves_coronal_index() {
        let mut nav = navigator();
        let mut mapper = InteractionMapper::new(Orientation::Coronal, 5.0);
        mapper.handle(down(0.0, 0.0, [25.0, 1.0, 2.0]), &mut nav);
        mapper.handle(PointerEvent::ButtonUp { display: [0.0, 0.0] }, &mut nav);
        assert_eq!(nav.crosshair(), Voxel::new(25, 10, 2));
    }

    #[test]
    fn drag_past_threshold_tracks_view_center() {
        let mut nav = navigator();
        let mut mapper = InteractionMapper::new(Orientation::Sagittal, 5.0);
        mapper.handle(down(50.0, 50.0, [0.0, 0.0, 0.0]), &mut nav);

        let small = PointerEvent::Move {
            display: [53.0, 53.0],
            view_center: WorldPoint::new(1.0, 1.0, 1.0),
        };
        assert_eq!(mapper.handle(small, &mut nav), Interaction::Pressed);
        assert_eq!(nav.crosshair(), Voxel::new(15, 10, 5));

        nav.take_events();
        let far = PointerEvent::Move {
            display: [80.0, 50.0],
            view_center: WorldPoint::new(29.0, 4.5, 7.5),
        };
        assert_eq!(mapper.handle(far, &mut nav), Interaction::Pan(Voxel::new(15, 4, 7)));
        assert_eq!(mapper.state(), GestureState::Panning);

        let next = PointerEvent::Move {
            display: [81.0, 50.0],
            view_center: WorldPoint::new(0.0, 6.0, 8.0),
        };
        assert_eq!(mapper.handle(next, &mut nav), Interaction::Pan(Voxel::new(15, 6, 8)));
        assert_eq!(nav.take_events().len(), 2);

        let up = PointerEvent::ButtonUp { display: [81.0, 50.0] };
        assert_eq!(mapper.handle(up, &mut nav), Interaction::PanEnded);
        assert_eq!(nav.crosshair(), Voxel::new(15, 6, 8));
    }

    #[test]
    fn release_far_from_press_without_moves_does_not_seek() {
        let mut nav = navigator();
        let mut mapper = InteractionMapper::new(Orientation::Axial, 5.0);
        mapper.handle(down(0.0, 0.0, [1.0, 1.0, 1.0]), &mut nav);
        let up = PointerEvent::ButtonUp { display: [40.0, 0.0] };
        assert_eq!(mapper.handle(up, &mut nav), Interaction::PanEnded);
        assert_eq!(nav.crosshair(), Voxel::new(15, 10, 5));
    }

    #[test]
    fn wheel_steps_own_plane_and_clamps() {
        let mut nav = navigator();
        let mut mapper = InteractionMapper::new(Orientation::Axial, 5.0);
        for _ in 0..20 {
            mapper.handle(PointerEvent::Wheel { ticks: 1 }, &mut nav);
        }
        assert_eq!(nav.slice_index(Orientation::Axial), 9);
        let result = mapper.handle(PointerEvent::Wheel { ticks: -1 }, &mut nav);
        assert_eq!(
            result,
            Interaction::Scroll {
                orientation: Orientation::Axial,
                index: 8
            }
        );
        assert_eq!(nav.slice_index(Orientation::Sagittal), 15);
        assert_eq!(nav.slice_index(Orientation::Coronal), 10);
    }

    #[test]
    fn hover_is_ignored() {
        let mut nav = navigator();
        let mut mapper = InteractionMapper::new(Orientation::Axial, 5.0);
        let hover = PointerEvent::Move {
            display: [10.0, 10.0],
            view_center: WorldPoint::new(0.0, 0.0, 0.0),
        };
        assert_eq!(mapper.handle(hover, &mut nav), Interaction::Ignored);
        assert_eq!(nav.crosshair(), Voxel::new(15, 10, 5));
    }
}
