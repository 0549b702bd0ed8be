//! Crop geometry and the single active edit session
//!
//! The crop rectangle is stored in percent of the source image, never in
//! pixels, so one rectangle can be applied to images of any resolution.
//! Every mutation path clamps; an out-of-range rectangle is corrected, never
//! rejected.

use serde::{Deserialize, Serialize};

use super::data::{ImageId, ImageRecord};
use super::presets::CropPreset;

/// Smallest crop width, in percent of the source width
pub const MIN_WIDTH: f64 = 10.0;
/// Smallest crop height, in percent of the source height
pub const MIN_HEIGHT: f64 = 10.0;

/// `f64::clamp` that tolerates `hi < lo` (from rounding) by pinning to `lo`
fn clamp_span(value: f64, lo: f64, hi: f64) -> f64 {
    value.min(hi).max(lo)
}

/// Axis-aligned crop region in percent (0-100) of the source dimensions
///
/// Invariants after any public constructor or mutator:
/// `0 <= x`, `0 <= y`, `x + width <= 100`, `y + height <= 100`,
/// `width >= MIN_WIDTH`, `height >= MIN_HEIGHT`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CropRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropRectangle {
    /// Bottom quarter of the frame, where subtitles usually sit
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 75.0,
            width: 100.0,
            height: 25.0,
        }
    }
}

/// One side of the crop rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right];

    pub fn label(self) -> &'static str {
        match self {
            Edge::Top => "Top",
            Edge::Bottom => "Bottom",
            Edge::Left => "Left",
            Edge::Right => "Right",
        }
    }
}

impl CropRectangle {
    /// Build a rectangle, clamping it into the valid range
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
        .clamped()
    }

    /// The whole image
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 100.0, 100.0)
    }

    /// Return a copy that satisfies every invariant.
    ///
    /// Size is fixed first (so a too-large rectangle shrinks), then the
    /// origin is pulled back inside the frame. Non-finite fields fall back
    /// to the default rectangle's value.
    pub fn clamped(self) -> Self {
        let fallback = Self::default();
        let finite = |v: f64, d: f64| if v.is_finite() { v } else { d };

        let width = clamp_span(finite(self.width, fallback.width), MIN_WIDTH, 100.0);
        let height = clamp_span(finite(self.height, fallback.height), MIN_HEIGHT, 100.0);
        let x = clamp_span(finite(self.x, fallback.x), 0.0, 100.0 - width);
        let y = clamp_span(finite(self.y, fallback.y), 0.0, 100.0 - height);

        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Distance of the bottom edge from the bottom border
    pub fn bottom_inset(&self) -> f64 {
        100.0 - self.y - self.height
    }

    /// Distance of the right edge from the right border
    pub fn right_inset(&self) -> f64 {
        100.0 - self.x - self.width
    }

    /// Current value of an edge, in the same units `set_edge` accepts
    pub fn edge(&self, edge: Edge) -> f64 {
        match edge {
            Edge::Top => self.y,
            Edge::Bottom => self.bottom_inset(),
            Edge::Left => self.x,
            Edge::Right => self.right_inset(),
        }
    }

    /// Move one edge, keeping the opposite edge where it is.
    ///
    /// `Top`/`Left` take the offset from the top/left border, `Bottom`/`Right`
    /// take the inset from the bottom/right border. The value is clamped so
    /// the recomputed dimension never drops below its minimum; a non-finite
    /// value is ignored.
    pub fn set_edge(&mut self, edge: Edge, value: f64) {
        if !value.is_finite() {
            return;
        }

        match edge {
            Edge::Top => {
                let bottom = self.bottom_inset();
                let top = clamp_span(value, 0.0, 100.0 - bottom - MIN_HEIGHT);
                self.y = top;
                self.height = 100.0 - top - bottom;
            }
            Edge::Bottom => {
                let bottom = clamp_span(value, 0.0, 100.0 - self.y - MIN_HEIGHT);
                self.height = 100.0 - self.y - bottom;
            }
            Edge::Left => {
                let right = self.right_inset();
                let left = clamp_span(value, 0.0, 100.0 - right - MIN_WIDTH);
                self.x = left;
                self.width = 100.0 - left - right;
            }
            Edge::Right => {
                let right = clamp_span(value, 0.0, 100.0 - self.x - MIN_WIDTH);
                self.width = 100.0 - self.x - right;
            }
        }
    }

    /// Translate by `(dx, dy)` percent, keeping the size.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: clamp_span(self.x + dx, 0.0, 100.0 - self.width),
            y: clamp_span(self.y + dy, 0.0, 100.0 - self.height),
            width: self.width,
            height: self.height,
        }
    }

    /// Grow or shrink from the bottom-right corner, keeping the origin.
    pub fn resized(&self, dw: f64, dh: f64) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: clamp_span(self.width + dw, MIN_WIDTH, 100.0 - self.x),
            height: clamp_span(self.height + dh, MIN_HEIGHT, 100.0 - self.y),
        }
    }

    /// Check the invariants without correcting anything
    pub fn is_valid(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= -EPS
            && self.y >= -EPS
            && self.width >= MIN_WIDTH - EPS
            && self.height >= MIN_HEIGHT - EPS
            && self.x + self.width <= 100.0 + EPS
            && self.y + self.height <= 100.0 + EPS
    }
}

/// The one crop edit in progress.
///
/// Owns the working rectangle and comment for the record being edited, so
/// the gesture controller and the crop engine receive it explicitly instead
/// of reading shared globals.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub image_id: ImageId,
    pub rect: CropRectangle,
    pub comment: String,
}

impl EditSession {
    /// Start editing `record`.
    ///
    /// An already-cropped record restores the rectangle and comment it was
    /// cropped with; otherwise `seed` (the last rectangle or a preset) is used.
    pub fn open(record: &ImageRecord, seed: CropRectangle) -> Self {
        match &record.crop_result {
            Some(result) => Self {
                image_id: record.id,
                rect: result.area,
                comment: record.comment.clone(),
            },
            None => Self {
                image_id: record.id,
                rect: seed.clamped(),
                comment: record.comment.clone(),
            },
        }
    }

    /// Overwrite the working rectangle with a preset's area
    pub fn load_preset(&mut self, preset: &CropPreset) {
        self.rect = preset.area.clamped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_default_is_subtitle_band() {
        let rect = CropRectangle::default();
        assert_eq!(rect, CropRectangle::new(0.0, 75.0, 100.0, 25.0));
        assert!(rect.is_valid());
    }

    #[test]
    fn test_new_clamps_out_of_range() {
        let rect = CropRectangle::new(95.0, -5.0, 3.0, 150.0);
        assert_eq!(rect.width, MIN_WIDTH);
        assert_eq!(rect.height, 100.0);
        assert_eq!(rect.x, 90.0);
        assert_eq!(rect.y, 0.0);
        assert!(rect.is_valid());
    }

    #[test]
    fn test_non_finite_falls_back() {
        let rect = CropRectangle::new(f64::NAN, 20.0, f64::INFINITY, 30.0);
        assert!(rect.is_valid());
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.width, 100.0);
    }

    #[test]
    fn test_set_top_keeps_bottom_edge() {
        let mut rect = CropRectangle::new(0.0, 60.0, 100.0, 30.0);
        let bottom_before = rect.bottom_inset();

        rect.set_edge(Edge::Top, 40.0);

        assert_close(rect.y, 40.0);
        assert_close(rect.height, 50.0);
        assert_close(rect.bottom_inset(), bottom_before);
    }

    #[test]
    fn test_set_left_keeps_right_edge() {
        let mut rect = CropRectangle::new(20.0, 0.0, 50.0, 100.0);
        let right_before = rect.right_inset();

        rect.set_edge(Edge::Left, 5.0);

        assert_close(rect.x, 5.0);
        assert_close(rect.width, 65.0);
        assert_close(rect.right_inset(), right_before);
    }

    #[test]
    fn test_set_bottom_and_right_keep_origin() {
        let mut rect = CropRectangle::new(10.0, 10.0, 50.0, 50.0);

        rect.set_edge(Edge::Bottom, 0.0);
        rect.set_edge(Edge::Right, 20.0);

        assert_close(rect.y, 10.0);
        assert_close(rect.height, 90.0);
        assert_close(rect.x, 10.0);
        assert_close(rect.width, 70.0);
    }

    #[test]
    fn test_set_edge_never_breaks_minimum() {
        let mut rect = CropRectangle::new(0.0, 75.0, 100.0, 25.0);

        // Dragging the top edge past the bottom edge stops at the minimum height
        rect.set_edge(Edge::Top, 99.0);
        assert_close(rect.height, MIN_HEIGHT);
        assert_close(rect.bottom_inset(), 0.0);

        rect.set_edge(Edge::Right, 250.0);
        assert_close(rect.width, MIN_WIDTH);

        rect.set_edge(Edge::Left, -40.0);
        assert_close(rect.x, 0.0);
        assert!(rect.is_valid());
    }

    #[test]
    fn test_every_edge_sweep_keeps_invariants() {
        let mut rect = CropRectangle::default();
        for edge in Edge::ALL {
            for step in -5..=25 {
                rect.set_edge(edge, step as f64 * 5.0);
                assert!(rect.is_valid(), "{edge:?} {step} -> {rect:?}");
            }
        }
    }

    #[test]
    fn test_nan_edge_is_ignored() {
        let mut rect = CropRectangle::default();
        rect.set_edge(Edge::Top, f64::NAN);
        assert_eq!(rect, CropRectangle::default());
    }

    #[test]
    fn test_translate_and_resize_clamp() {
        let rect = CropRectangle::new(10.0, 70.0, 50.0, 25.0);

        let moved = rect.translated(80.0, -90.0);
        assert_close(moved.x, 50.0);
        assert_close(moved.y, 0.0);
        assert_close(moved.width, 50.0);

        let grown = rect.resized(100.0, -100.0);
        assert_close(grown.width, 90.0);
        assert_close(grown.height, MIN_HEIGHT);
        assert_close(grown.x, 10.0);
    }

    #[test]
    fn test_serialization() {
        let rect = CropRectangle::new(5.0, 60.0, 90.0, 30.0);
        let json = serde_json::to_string(&rect).unwrap();
        assert_eq!(json, r#"{"x":5.0,"y":60.0,"width":90.0,"height":30.0}"#);
        assert_eq!(serde_json::from_str::<CropRectangle>(&json).unwrap(), rect);

        // Stored garbage is valid again once clamped
        let loaded: CropRectangle = serde_json::from_str(r#"{"x":-3,"y":0,"width":5,"height":200}"#).unwrap();
        assert!(loaded.clamped().is_valid());
    }

    #[test]
    fn test_session_restores_previous_crop() {
        use crate::state::data::CropResult;

        let mut record = ImageRecord::new(ImageId(3), vec![1, 2, 3]);
        let seed = CropRectangle::new(0.0, 80.0, 100.0, 20.0);
        let fresh = EditSession::open(&record, seed);
        assert_eq!(fresh.rect, seed);
        assert!(fresh.comment.is_empty());

        let used = CropRectangle::new(0.0, 50.0, 100.0, 40.0);
        record.comment = "hello".to_string();
        record.crop_result = Some(CropResult {
            jpeg: vec![],
            width: 10,
            height: 4,
            area: used,
        });
        let restored = EditSession::open(&record, seed);
        assert_eq!(restored.rect, used);
        assert_eq!(restored.comment, "hello");
        assert_eq!(restored.image_id, ImageId(3));
    }
}
