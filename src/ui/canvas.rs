use cgmath::Point2;
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Path, Program, Stroke};
use iced::{touch, Color, Point, Rectangle, Renderer, Size, Theme};

use crate::state::edit::CropRectangle;
use crate::ui::gesture::{HitTarget, PointerButton, PointerId, PointerPress, SurfaceBounds};
use crate::Message;

/// Side of the square resize handle in pixels
pub const HANDLE_SIZE: f32 = 16.0;

/// Raw pointer input forwarded to the gesture controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Pressed {
        press: PointerPress,
        surface: SurfaceBounds,
    },
    Moved {
        pointer: PointerId,
        position: Point2<f64>,
    },
    Released(PointerId),
    Cancelled(PointerId),
}

/// Crop overlay drawn on top of the image being edited.
///
/// The overlay does not change the rectangle itself. It hit-tests presses
/// and forwards pointer input; the app owns the controller and the session.
pub struct CropOverlay {
    pub rect: CropRectangle,
    /// A gesture is running (drives the cursor shape)
    pub dragging: bool,
}

impl Program<Message> for CropOverlay {
    type State = PointerState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let surface = SurfaceBounds::new(0.0, 0.0, bounds.width as f64, bounds.height as f64);
        let (x, y, w, h) = surface.project(&self.rect);
        let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);

        // Dim everything outside the crop
        let dim = Color::from_rgba(0.0, 0.0, 0.0, 0.5);
        frame.fill_rectangle(Point::ORIGIN, Size::new(bounds.width, y), dim);
        frame.fill_rectangle(
            Point::new(0.0, y + h),
            Size::new(bounds.width, (bounds.height - y - h).max(0.0)),
            dim,
        );
        frame.fill_rectangle(Point::new(0.0, y), Size::new(x, h), dim);
        frame.fill_rectangle(
            Point::new(x + w, y),
            Size::new((bounds.width - x - w).max(0.0), h),
            dim,
        );

        let border = Path::rectangle(Point::new(x, y), Size::new(w, h));
        frame.stroke(
            &border,
            Stroke::default()
                .with_color(Color::from_rgb(0.23, 0.51, 0.96))
                .with_width(2.0),
        );

        let half = HANDLE_SIZE / 2.0;
        frame.fill_rectangle(
            Point::new(x + w - half, y + h - half),
            Size::new(HANDLE_SIZE, HANDLE_SIZE),
            Color::WHITE,
        );

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        let surface = SurfaceBounds::new(
            bounds.x as f64,
            bounds.y as f64,
            bounds.width as f64,
            bounds.height as f64,
        );

        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(button)) => {
                let Some(position) = cursor.position_over(bounds) else {
                    return (canvas::event::Status::Ignored, None);
                };
                let position = to_point(position);
                let target = surface.hit_test(&self.rect, position, HANDLE_SIZE as f64);
                if target == HitTarget::Outside {
                    return (canvas::event::Status::Ignored, None);
                }

                let button = match button {
                    mouse::Button::Left => PointerButton::Primary,
                    mouse::Button::Right => PointerButton::Secondary,
                    mouse::Button::Middle => PointerButton::Middle,
                    _ => PointerButton::Other,
                };
                if button == PointerButton::Primary {
                    state.mouse_down = true;
                }

                let press = PointerPress {
                    pointer: PointerId::MOUSE,
                    is_primary: true,
                    button,
                    position,
                    target,
                };
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Pointer(PointerInput::Pressed { press, surface })),
                );
            }

            // Moves keep flowing while the button is held, even outside the
            // canvas, which gives the gesture implicit pointer capture
            canvas::Event::Mouse(mouse::Event::CursorMoved { position }) if state.mouse_down => {
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Pointer(PointerInput::Moved {
                        pointer: PointerId::MOUSE,
                        position: to_point(position),
                    })),
                );
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) if state.mouse_down => {
                state.mouse_down = false;
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Pointer(PointerInput::Released(PointerId::MOUSE))),
                );
            }

            // A release outside the window is never delivered, so leaving
            // the window ends the drag where it is
            canvas::Event::Mouse(mouse::Event::CursorLeft) if state.mouse_down => {
                state.mouse_down = false;
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Pointer(PointerInput::Cancelled(PointerId::MOUSE))),
                );
            }

            canvas::Event::Touch(touch::Event::FingerPressed { id, position }) => {
                let is_primary = state.fingers.is_empty();
                state.fingers.push(id.0);

                if !bounds.contains(position) {
                    return (canvas::event::Status::Ignored, None);
                }
                let position = to_point(position);
                let target = surface.hit_test(&self.rect, position, HANDLE_SIZE as f64);
                if target == HitTarget::Outside {
                    return (canvas::event::Status::Ignored, None);
                }

                let press = PointerPress {
                    pointer: PointerId(id.0),
                    is_primary,
                    button: PointerButton::Primary,
                    position,
                    target,
                };
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Pointer(PointerInput::Pressed { press, surface })),
                );
            }

            canvas::Event::Touch(touch::Event::FingerMoved { id, position }) => {
                if state.fingers.contains(&id.0) {
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::Pointer(PointerInput::Moved {
                            pointer: PointerId(id.0),
                            position: to_point(position),
                        })),
                    );
                }
            }

            canvas::Event::Touch(touch::Event::FingerLifted { id, .. }) => {
                if state.release_finger(id.0) {
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::Pointer(PointerInput::Released(PointerId(id.0)))),
                    );
                }
            }

            canvas::Event::Touch(touch::Event::FingerLost { id, .. }) => {
                if state.release_finger(id.0) {
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::Pointer(PointerInput::Cancelled(PointerId(id.0)))),
                    );
                }
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }

    fn mouse_interaction(&self, _state: &Self::State, bounds: Rectangle, cursor: Cursor) -> mouse::Interaction {
        if self.dragging {
            return mouse::Interaction::Grabbing;
        }
        let Some(position) = cursor.position_over(bounds) else {
            return mouse::Interaction::default();
        };

        let surface = SurfaceBounds::new(
            bounds.x as f64,
            bounds.y as f64,
            bounds.width as f64,
            bounds.height as f64,
        );
        match surface.hit_test(&self.rect, to_point(position), HANDLE_SIZE as f64) {
            HitTarget::ResizeHandle => mouse::Interaction::Crosshair,
            HitTarget::Body => mouse::Interaction::Grab,
            HitTarget::Outside => mouse::Interaction::default(),
        }
    }
}

fn to_point(position: Point) -> Point2<f64> {
    Point2::new(position.x as f64, position.y as f64)
}

/// Pointers currently down on the overlay
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    pub mouse_down: bool,
    /// Finger IDs in press order; the first one is the primary pointer
    pub fingers: Vec<u64>,
}

impl PointerState {
    fn release_finger(&mut self, id: u64) -> bool {
        let before = self.fingers.len();
        self.fingers.retain(|finger| *finger != id);
        self.fingers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> CropOverlay {
        CropOverlay {
            rect: CropRectangle::default(),
            dragging: false,
        }
    }

    const BOUNDS: Rectangle = Rectangle {
        x: 0.0,
        y: 0.0,
        width: 400.0,
        height: 200.0,
    };

    #[test]
    fn test_cursor_leaving_mid_drag_cancels() {
        let overlay = overlay();
        let mut state = PointerState::default();

        // Press inside the crop band at the bottom of the surface
        let inside = Cursor::Available(Point::new(100.0, 180.0));
        let (status, message) = overlay.update(
            &mut state,
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)),
            BOUNDS,
            inside,
        );
        assert_eq!(status, canvas::event::Status::Captured);
        assert!(matches!(message, Some(Message::Pointer(PointerInput::Pressed { .. }))));
        assert!(state.mouse_down);

        let (_, message) = overlay.update(
            &mut state,
            canvas::Event::Mouse(mouse::Event::CursorLeft),
            BOUNDS,
            Cursor::Unavailable,
        );
        assert!(matches!(
            message,
            Some(Message::Pointer(PointerInput::Cancelled(PointerId::MOUSE)))
        ));
        assert!(!state.mouse_down);

        // Leaving again without a drag is not ours to handle
        let (status, message) = overlay.update(
            &mut state,
            canvas::Event::Mouse(mouse::Event::CursorLeft),
            BOUNDS,
            Cursor::Unavailable,
        );
        assert_eq!(status, canvas::event::Status::Ignored);
        assert!(message.is_none());
    }

    #[test]
    fn test_release_finger_only_known_ids() {
        let mut state = PointerState::default();
        state.fingers.extend([3, 9]);

        assert!(state.release_finger(3));
        assert!(!state.release_finger(3));
        assert_eq!(state.fingers, vec![9]);
    }
}
