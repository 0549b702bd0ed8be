//! Stack cropped images and their comments into one tall PNG
//!
//! Layout is computed up front from the cropped rasters' dimensions alone:
//!
//! ```text
//! padding
//! image 1 (max_width wide, aspect kept)   padding
//! [comment band 60px]                     padding   <- only if commented
//! image 2 ...
//! ```
//!
//! Rasters are then decoded one at a time and drawn in collection order, so
//! the output depends only on the inputs, never on timing.

use ab_glyph::FontArc;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::state::data::{CropResult, ImageRecord};
use crate::state::edit::CropRectangle;

use super::text;

/// Vertical space reserved for a comment, padding excluded
pub const COMMENT_BAND_HEIGHT: f64 = 60.0;
/// Height of the painted band inside that space
pub const COMMENT_FILL_HEIGHT: u32 = 50;
pub const COMMENT_TEXT_X: f32 = 15.0;
pub const COMMENT_BASELINE_OFFSET: f32 = 30.0;
pub const COMMENT_FONT_SIZE: f32 = 16.0;

/// Widest output accepted from the CLI and the settings fields
pub const MAX_OUTPUT_WIDTH: u32 = 16_384;
/// Largest gap accepted from the CLI and the settings fields
pub const MAX_PADDING: u32 = 1_000;
/// Upper bound on the RGBA canvas, checked before anything is allocated
const MAX_CANVAS_BYTES: u64 = 1 << 30;

const BACKGROUND: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const BAND_BACKGROUND: Rgba<u8> = Rgba([0xf3, 0xf4, 0xf6, 0xff]);
const BAND_TEXT: [u8; 3] = [0x37, 0x41, 0x51];

/// One cropped image headed for the composition
#[derive(Debug, Clone)]
pub struct ComposeItem {
    pub crop: CropResult,
    pub comment: String,
}

impl ComposeItem {
    /// `None` for records that were never cropped
    pub fn from_record(record: &ImageRecord) -> Option<Self> {
        record.crop_result.as_ref().map(|crop| ComposeItem {
            crop: crop.clone(),
            comment: record.comment.clone(),
        })
    }

    fn has_comment(&self) -> bool {
        !self.comment.is_empty()
    }
}

/// Where one item lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub y: f64,
    pub height: f64,
    /// Top of the comment band, if the item has a comment
    pub band_y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeLayout {
    pub width: u32,
    /// Exact, unrounded total height
    pub total_height: f64,
    pub placements: Vec<Placement>,
}

impl ComposeLayout {
    /// Compute the layout. Fails with [`Error::NothingToCompose`] for an
    /// empty list and [`Error::CanvasTooLarge`] when the raster would exceed
    /// the canvas limit.
    pub fn plan(items: &[ComposeItem], max_width: u32, padding: u32) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::NothingToCompose);
        }

        let width = max_width.max(1);
        let padding = padding as f64;
        let mut cursor = padding;
        let mut placements = Vec::with_capacity(items.len());

        for item in items {
            let source_w = item.crop.width.max(1) as f64;
            let height = width as f64 * (item.crop.height as f64 / source_w);
            let y = cursor;
            cursor += height + padding;

            let band_y = if item.has_comment() {
                let band = cursor;
                cursor += COMMENT_BAND_HEIGHT + padding;
                Some(band)
            } else {
                None
            };

            placements.push(Placement { y, height, band_y });
        }

        let height = cursor.round().max(1.0);
        let too_large = || Error::CanvasTooLarge {
            width,
            height: height as u64,
        };
        if width > MAX_OUTPUT_WIDTH || height > u32::MAX as f64 {
            return Err(too_large());
        }
        let bytes = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4));
        match bytes {
            Some(bytes) if bytes <= MAX_CANVAS_BYTES => {}
            _ => return Err(too_large()),
        }

        Ok(Self {
            width,
            total_height: cursor,
            placements,
        })
    }

    /// Pixel height of the output raster. Fits in `u32` for any planned layout.
    pub fn canvas_height(&self) -> u32 {
        (self.total_height.round() as u32).max(1)
    }
}

/// The composed image plus what went into it
#[derive(Debug, Clone)]
pub struct CompositionResult {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub entries: Vec<(CropRectangle, String)>,
}

/// Render the composition to RGBA.
///
/// Comments are skipped (band still painted) when `font` is `None`.
pub fn render(items: &[ComposeItem], max_width: u32, padding: u32, font: Option<&FontArc>) -> Result<RgbaImage> {
    let layout = ComposeLayout::plan(items, max_width, padding)?;
    let canvas_h = layout.canvas_height();
    let mut canvas = RgbaImage::from_pixel(layout.width, canvas_h, BACKGROUND);

    for (item, placement) in items.iter().zip(&layout.placements) {
        let decoded = image::load_from_memory(&item.crop.jpeg)
            .map_err(Error::decode)?
            .to_rgba8();

        let target_h = (placement.height.round() as u32).max(1);
        let scaled = if decoded.dimensions() == (layout.width, target_h) {
            decoded
        } else {
            imageops::resize(&decoded, layout.width, target_h, FilterType::Lanczos3)
        };
        imageops::overlay(&mut canvas, &scaled, 0, placement.y.round() as i64);

        if let Some(band_y) = placement.band_y {
            let top = band_y.round() as u32;
            let bottom = (top + COMMENT_FILL_HEIGHT).min(canvas_h);
            for y in top.min(canvas_h)..bottom {
                for x in 0..layout.width {
                    canvas.put_pixel(x, y, BAND_BACKGROUND);
                }
            }

            if let Some(font) = font {
                text::draw_line(
                    &mut canvas,
                    font,
                    &item.comment,
                    COMMENT_FONT_SIZE,
                    COMMENT_TEXT_X,
                    band_y as f32 + COMMENT_BASELINE_OFFSET,
                    BAND_TEXT,
                );
            }
        }
    }

    Ok(canvas)
}

/// Render and encode as PNG
pub fn compose(items: &[ComposeItem], max_width: u32, padding: u32, font: Option<&FontArc>) -> Result<CompositionResult> {
    let canvas = render(items, max_width, padding, font)?;
    let (width, height) = canvas.dimensions();

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(canvas.as_raw(), width, height, image::ExtendedColorType::Rgba8)?;

    log::info!("🎨 Composed {} images into {}x{}", items.len(), width, height);

    Ok(CompositionResult {
        png,
        width,
        height,
        entries: items
            .iter()
            .map(|item| (item.crop.area, item.comment.clone()))
            .collect(),
    })
}

/// [`compose`] on the blocking thread pool
pub async fn compose_async(
    items: Vec<ComposeItem>,
    max_width: u32,
    padding: u32,
    font: Option<FontArc>,
) -> Result<CompositionResult> {
    tokio::task::spawn_blocking(move || compose(&items, max_width, padding, font.as_ref())).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    fn item(width: u32, height: u32, color: [u8; 3], comment: &str) -> ComposeItem {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&img)
            .unwrap();
        ComposeItem {
            crop: CropResult {
                jpeg,
                width,
                height,
                area: CropRectangle::default(),
            },
            comment: comment.to_string(),
        }
    }

    fn close(actual: Rgba<u8>, expected: Rgba<u8>) -> bool {
        actual.0.iter().zip(expected.0).all(|(a, b)| a.abs_diff(b) <= 12)
    }

    #[test]
    fn test_layout_with_comment() {
        let items = vec![item(1000, 100, [0, 0, 255], ""), item(1000, 200, [255, 0, 0], "hi")];
        let layout = ComposeLayout::plan(&items, 1000, 10).unwrap();

        assert_eq!(layout.total_height, 400.0);
        assert_eq!(layout.placements[0], Placement { y: 10.0, height: 100.0, band_y: None });
        assert_eq!(layout.placements[1].y, 120.0);
        assert_eq!(layout.placements[1].band_y, Some(330.0));
    }

    #[test]
    fn test_layout_scales_to_max_width() {
        let items = vec![item(500, 100, [0, 0, 0], "")];
        let layout = ComposeLayout::plan(&items, 1080, 0).unwrap();
        assert_eq!(layout.placements[0].height, 216.0);
        assert_eq!(layout.canvas_height(), 216);
    }

    #[test]
    fn test_render_places_band() {
        let items = vec![item(1000, 100, [0, 0, 255], ""), item(1000, 200, [255, 0, 0], "hi")];
        let canvas = render(&items, 1000, 10, None).unwrap();

        assert_eq!(canvas.dimensions(), (1000, 400));
        assert!(close(*canvas.get_pixel(500, 5), BACKGROUND));
        assert!(close(*canvas.get_pixel(500, 60), Rgba([0, 0, 255, 255])));
        assert!(close(*canvas.get_pixel(500, 200), Rgba([255, 0, 0, 255])));
        assert!(close(*canvas.get_pixel(500, 325), BACKGROUND));
        assert_eq!(*canvas.get_pixel(500, 330), BAND_BACKGROUND);
        assert_eq!(*canvas.get_pixel(999, 379), BAND_BACKGROUND);
        assert_eq!(*canvas.get_pixel(500, 380), BACKGROUND);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(ComposeLayout::plan(&[], 1080, 10), Err(Error::NothingToCompose)));
        assert!(matches!(compose(&[], 1080, 10, None), Err(Error::NothingToCompose)));
    }

    #[test]
    fn test_oversized_canvas_rejected_before_allocation() {
        let items = vec![item(10, 100, [0, 0, 0], "")];

        let err = compose(&items, u32::MAX, 10, None).unwrap_err();
        assert!(matches!(err, Error::CanvasTooLarge { width: u32::MAX, .. }), "{err:?}");

        // Within the width limit but far too tall: 16384 x 163860
        let err = ComposeLayout::plan(&items, MAX_OUTPUT_WIDTH, 10).unwrap_err();
        assert!(matches!(err, Error::CanvasTooLarge { height: 163_860, .. }), "{err:?}");

        assert!(ComposeLayout::plan(&items, 1080, 10).is_ok());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let items = vec![
            item(320, 80, [10, 200, 30], "first"),
            item(640, 90, [200, 10, 30], ""),
            item(100, 100, [0, 0, 0], "last"),
        ];
        let a = compose(&items, 400, 10, None).unwrap();
        let b = compose(&items, 400, 10, None).unwrap();

        assert_eq!(a.png, b.png);
        assert_eq!(a.width, 400);
        assert_eq!(a.entries.len(), 3);
        assert_eq!(a.entries[0].1, "first");

        let decoded = image::load_from_memory(&a.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (a.width, a.height));
    }

    #[test]
    fn test_corrupt_crop_fails_decode() {
        let mut broken = item(10, 10, [0, 0, 0], "");
        broken.crop.jpeg = vec![1, 2, 3];
        assert!(matches!(compose(&[broken], 100, 10, None), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_items_from_records() {
        let mut record = ImageRecord::new(crate::state::data::ImageId(1), vec![0u8]);
        assert!(ComposeItem::from_record(&record).is_none());

        record.crop_result = Some(item(10, 10, [0, 0, 0], "").crop);
        record.comment = "note".into();
        let composed = ComposeItem::from_record(&record).unwrap();
        assert_eq!(composed.comment, "note");
    }
}
