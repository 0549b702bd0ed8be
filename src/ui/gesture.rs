//! Pointer gesture controller for the crop editor
//!
//! Turns press → move* → release sequences into crop rectangle updates.
//! It knows nothing about iced: the canvas feeds it viewport positions and a
//! snapshot of the surface bounds, which keeps the whole state machine
//! testable.
//!
//! A gesture measures everything against what it captured on press (pointer
//! position, surface bounds, rectangle). The surface is never re-measured
//! mid-gesture, and each move recomputes from the start snapshot instead of
//! accumulating per-event deltas, so rounding never drifts.

use cgmath::{Point2, Vector2};

use crate::state::data::ImageId;
use crate::state::edit::{CropRectangle, EditSession};

/// Identifies one pointer (the mouse, or a single finger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub u64);

impl PointerId {
    pub const MOUSE: PointerId = PointerId(u64::MAX);
}

/// What a gesture does to the rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Translate, anchored on the rectangle body
    Move,
    /// Grow/shrink from the bottom-right handle
    Resize,
}

/// Which part of the overlay a press landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Body,
    ResizeHandle,
    Outside,
}

impl HitTarget {
    fn gesture(self) -> Option<GestureKind> {
        match self {
            HitTarget::Body => Some(GestureKind::Move),
            HitTarget::ResizeHandle => Some(GestureKind::Resize),
            HitTarget::Outside => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
    Other,
}

/// A pointer going down
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPress {
    pub pointer: PointerId,
    /// `false` for extra fingers of a multi-touch
    pub is_primary: bool,
    pub button: PointerButton,
    /// Viewport coordinates
    pub position: Point2<f64>,
    pub target: HitTarget,
}

/// Bounding box of the interaction surface in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceBounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_usable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Pixel rectangle covered by `rect` on this surface: (x, y, width, height)
    pub fn project(&self, rect: &CropRectangle) -> (f64, f64, f64, f64) {
        (
            self.x + rect.x / 100.0 * self.width,
            self.y + rect.y / 100.0 * self.height,
            rect.width / 100.0 * self.width,
            rect.height / 100.0 * self.height,
        )
    }

    /// Classify a viewport position against `rect` drawn on this surface.
    ///
    /// The handle is a `handle_size` square centred on the bottom-right
    /// corner and wins over the body, so one press never maps to both.
    pub fn hit_test(&self, rect: &CropRectangle, position: Point2<f64>, handle_size: f64) -> HitTarget {
        let (left, top, width, height) = self.project(rect);
        let right = left + width;
        let bottom = top + height;
        let half = handle_size / 2.0;

        if (position.x - right).abs() <= half && (position.y - bottom).abs() <= half {
            return HitTarget::ResizeHandle;
        }
        if position.x >= left && position.x <= right && position.y >= top && position.y <= bottom {
            return HitTarget::Body;
        }
        HitTarget::Outside
    }
}

/// Everything captured when a gesture starts
#[derive(Debug, Clone, Copy)]
struct ActiveGesture {
    kind: GestureKind,
    pointer: PointerId,
    start: Point2<f64>,
    surface: SurfaceBounds,
    start_rect: CropRectangle,
}

/// Drives one editor surface. At most one gesture runs at a time.
///
/// The controller is attached to the record under edit and disposed when
/// the editor closes; a detached controller ignores every event.
#[derive(Debug, Default)]
pub struct GestureController {
    attached: Option<ImageId>,
    active: Option<ActiveGesture>,
    readout_pending: bool,
}

impl GestureController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the controller to the editor for `image_id`, dropping any
    /// gesture left over from a previous binding.
    pub fn attach(&mut self, image_id: ImageId) {
        self.active = None;
        self.readout_pending = false;
        self.attached = Some(image_id);
    }

    /// Release everything. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.active = None;
        self.readout_pending = false;
        self.attached = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start a gesture. Returns `true` if the press was taken (the caller
    /// should capture the pointer), `false` if it was ignored.
    pub fn press(&mut self, press: PointerPress, surface: SurfaceBounds, session: &EditSession) -> bool {
        if self.attached != Some(session.image_id) {
            return false;
        }
        if !press.is_primary || press.button != PointerButton::Primary {
            return false;
        }
        match self.active {
            // The owner pressed again, so its release never reached us
            Some(gesture) if gesture.pointer == press.pointer => {
                log::debug!("Dropping {:?} gesture with a lost release", gesture.kind);
                self.active = None;
                self.readout_pending = false;
            }
            Some(_) => return false,
            None => {}
        }
        if !surface.is_usable() {
            return false;
        }
        let Some(kind) = press.target.gesture() else {
            return false;
        };

        log::trace!("{:?} gesture started by {:?}", kind, press.pointer);
        self.active = Some(ActiveGesture {
            kind,
            pointer: press.pointer,
            start: press.position,
            surface,
            start_rect: session.rect,
        });
        true
    }

    /// Apply a pointer move. Returns `true` if the session rectangle was
    /// updated; the caller redraws the overlay right away and waits for the
    /// next frame to refresh readouts.
    pub fn pointer_move(&mut self, pointer: PointerId, position: Point2<f64>, session: &mut EditSession) -> bool {
        let Some(gesture) = self.active else {
            return false;
        };
        if gesture.pointer != pointer || self.attached != Some(session.image_id) {
            return false;
        }

        let delta = percent_delta(&gesture, position);
        session.rect = match gesture.kind {
            GestureKind::Move => gesture.start_rect.translated(delta.x, delta.y),
            GestureKind::Resize => gesture.start_rect.resized(delta.x, delta.y),
        };
        self.readout_pending = true;
        true
    }

    /// End the gesture owned by `pointer`, keeping the last computed
    /// rectangle. Returns `true` if a gesture ended; the caller then refreshes
    /// readouts immediately so a skipped frame never hides the final value.
    /// Idempotent: without a matching gesture it does nothing.
    pub fn release(&mut self, pointer: PointerId) -> bool {
        match self.active {
            Some(gesture) if gesture.pointer == pointer => {
                log::trace!("{:?} gesture ended", gesture.kind);
                self.active = None;
                self.readout_pending = false;
                true
            }
            _ => false,
        }
    }

    /// Platform cancelled the pointer sequence. Same as a release: no rollback.
    pub fn cancel(&mut self, pointer: PointerId) -> bool {
        self.release(pointer)
    }

    /// Called once per animation frame. Returns `true` at most once per
    /// frame, and only if a move happened since the last refresh.
    pub fn take_frame_refresh(&mut self) -> bool {
        std::mem::take(&mut self.readout_pending)
    }

    /// Whether the UI needs frame ticks at all
    pub fn wants_frames(&self) -> bool {
        self.active.is_some() || self.readout_pending
    }
}

/// Pointer travel since the press, in percent of the cached surface size
fn percent_delta(gesture: &ActiveGesture, position: Point2<f64>) -> Vector2<f64> {
    let travel = position - gesture.start;
    Vector2::new(
        travel.x / gesture.surface.width * 100.0,
        travel.y / gesture.surface.height * 100.0,
    )
}
