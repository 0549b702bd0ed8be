use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::{Error, Result};
use crate::state::data::CropResult;
use crate::state::edit::CropRectangle;

/// Pixel box (x, y, width, height) of `rect` on a `width` x `height` image.
///
/// Rounds each component independently. The size keeps its rounded value
/// (at least one pixel, at most the image) and the origin is pulled back
/// when the box would run past the far edge.
pub fn pixel_box(rect: &CropRectangle, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (px, pw) = pixel_span(rect.x, rect.width, width);
    let (py, ph) = pixel_span(rect.y, rect.height, height);
    (px, py, pw, ph)
}

fn pixel_span(start: f64, size: f64, extent: u32) -> (u32, u32) {
    let extent_f = extent as f64;
    let len = ((size / 100.0 * extent_f).round().max(1.0) as u32).min(extent.max(1));
    let origin = ((start / 100.0 * extent_f).round().max(0.0) as u32).min(extent.saturating_sub(len));
    (origin, len)
}

/// Decode `source`, cut out `rect` and re-encode it as JPEG
pub fn crop(source: &[u8], rect: &CropRectangle, quality: u8) -> Result<CropResult> {
    let img = image::load_from_memory(source).map_err(Error::decode)?;
    crop_decoded(&img, rect, quality)
}

/// Same as [`crop`] for an already decoded image
pub fn crop_decoded(img: &DynamicImage, rect: &CropRectangle, quality: u8) -> Result<CropResult> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::decode("image has no pixels"));
    }

    let area = rect.clamped();
    let (x, y, width, height) = pixel_box(&area, img.width(), img.height());
    let region = img.crop_imm(x, y, width, height).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&region)?;

    log::debug!(
        "✂️  Cropped {}x{} at ({}, {}) from {}x{}",
        width,
        height,
        x,
        y,
        img.width(),
        img.height()
    );

    Ok(CropResult {
        jpeg,
        width,
        height,
        area,
    })
}

/// Crop on the blocking thread pool so the UI stays responsive
pub async fn crop_async(source: std::sync::Arc<[u8]>, rect: CropRectangle, quality: u8) -> Result<CropResult> {
    tokio::task::spawn_blocking(move || crop(&source, &rect, quality)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if y >= height * 3 / 4 {
                Rgb([255, 0, 0])
            } else {
                Rgb([(x % 256) as u8, 0, 255])
            }
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_subtitle_band_dimensions() {
        let source = png(1000, 500);
        let result = crop(&source, &CropRectangle::default(), 90).unwrap();

        assert_eq!((result.width, result.height), (1000, 125));
        assert_eq!(result.area, CropRectangle::default());

        let decoded = image::load_from_memory(&result.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1000, 125));
        // Band is solid red, JPEG noise aside
        let centre = decoded.to_rgb8().get_pixel(500, 60).0;
        assert!(centre[0] > 200 && centre[1] < 60 && centre[2] < 60, "{centre:?}");
    }

    #[test]
    fn test_pixel_box_rounds_and_clamps() {
        assert_eq!(pixel_box(&CropRectangle::full(), 640, 480), (0, 0, 640, 480));
        assert_eq!(
            pixel_box(&CropRectangle::new(33.3, 33.3, 33.3, 33.3), 100, 10),
            (33, 3, 33, 3)
        );
        // The rounded size wins; the origin moves back to fit
        assert_eq!(
            pixel_box(&CropRectangle::new(10.5, 0.0, 89.5, 100.0), 100, 100),
            (10, 0, 90, 100)
        );
        // Tiny images still yield a non-empty box
        assert_eq!(pixel_box(&CropRectangle::new(90.0, 90.0, 10.0, 10.0), 3, 3), (2, 2, 1, 1));
    }

    #[test]
    fn test_undecodable_source() {
        let err = crop(b"definitely not an image", &CropRectangle::default(), 90).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_crop_async_matches_sync() {
        let source: std::sync::Arc<[u8]> = png(200, 100).into();
        let rect = CropRectangle::new(10.0, 20.0, 50.0, 40.0);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let result = runtime
            .block_on(crop_async(source.clone(), rect, 90))
            .unwrap();
        assert_eq!((result.width, result.height), (100, 40));
        assert_eq!(result, crop(&source, &rect, 90).unwrap());
    }
}
