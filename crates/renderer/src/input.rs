use std::cell::Cell;
use std::rc::Rc;

use crate::surface::{DrawableSurface, SurfaceRect};

/// Pointer state in surface-local pixels with a bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MouseState {
    pub x: f32,
    pub y: f32,
    pub click_x: f32,
    pub click_y: f32,
}

impl MouseState {
    /// `iMouse` layout: `(x, y, click_x, click_y)`.
    pub fn as_uniform(&self) -> [f32; 4] {
        [self.x, self.y, self.click_x, self.click_y]
    }
}

/// Pointer event in host client coordinates (layout pixels, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Moved { client_x: f64, client_y: f64 },
    Pressed { client_x: f64, client_y: f64 },
}

/// Folds pointer events into a [`MouseState`] shared with the render loop.
#[derive(Debug, Default)]
pub struct InputTracker {
    state: Rc<Cell<MouseState>>,
    attached: bool,
}

impl InputTracker {
    pub fn attach() -> Self {
        Self {
            state: Rc::new(Cell::new(MouseState::default())),
            attached: true,
        }
    }

    /// Handle read by the render loop each frame.
    pub fn shared_state(&self) -> Rc<Cell<MouseState>> {
        Rc::clone(&self.state)
    }

    pub fn state(&self) -> MouseState {
        self.state.get()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Applies an event against the surface's current bounds. Ignored once
    /// detached.
    pub fn handle<S: DrawableSurface + ?Sized>(&self, surface: &S, event: PointerEvent) {
        if !self.attached {
            return;
        }
        let rect = surface.bounding_rect();
        let mut state = self.state.get();
        match event {
            PointerEvent::Moved { client_x, client_y } => {
                let (x, y) = to_surface_local(&rect, client_x, client_y);
                state.x = x;
                state.y = y;
            }
            PointerEvent::Pressed { client_x, client_y } => {
                let (x, y) = to_surface_local(&rect, client_x, client_y);
                state.click_x = x;
                state.click_y = y;
            }
        }
        self.state.set(state);
    }

    pub fn detach(&mut self) {
        if self.attached {
            tracing::trace!("input tracker detached");
        }
        self.attached = false;
    }
}

fn to_surface_local(rect: &SurfaceRect, client_x: f64, client_y: f64) -> (f32, f32) {
    let x = client_x - rect.left;
    let y = rect.height - (client_y - rect.top);
    (x as f32, y as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::OffscreenSurface;

    #[test]
    fn move_flips_vertically() {
        let surface = OffscreenSurface::new(200, 100);
        let tracker = InputTracker::attach();
        tracker.handle(&surface, PointerEvent::Moved { client_x: 10.0, client_y: 20.0 });
        assert_eq!(tracker.state(), MouseState { x: 10.0, y: 80.0, click_x: 0.0, click_y: 0.0 });
    }

    #[test]
    fn press_updates_only_click_fields() {
        let surface = OffscreenSurface::new(200, 100);
        let tracker = InputTracker::attach();
        tracker.handle(&surface, PointerEvent::Moved { client_x: 10.0, client_y: 20.0 });
        tracker.handle(&surface, PointerEvent::Pressed { client_x: 5.0, client_y: 5.0 });
        assert_eq!(tracker.state().as_uniform(), [10.0, 80.0, 5.0, 95.0]);
    }

    #[test]
    fn offsets_by_surface_origin() {
        let surface = OffscreenSurface::new(200, 100).with_origin(30.0, 40.0);
        let tracker = InputTracker::attach();
        tracker.handle(&surface, PointerEvent::Moved { client_x: 40.0, client_y: 60.0 });
        assert_eq!((tracker.state().x, tracker.state().y), (10.0, 80.0));
    }

    #[test]
    fn detached_tracker_ignores_events() {
        let surface = OffscreenSurface::new(200, 100);
        let mut tracker = InputTracker::attach();
        let shared = tracker.shared_state();
        tracker.detach();
        tracker.handle(&surface, PointerEvent::Moved { client_x: 10.0, client_y: 20.0 });
        assert_eq!(shared.get(), MouseState::default());
    }
}
