//! Single-line text rendering for comment bands

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::{Rgba, RgbaImage};
use walkdir::WalkDir;

/// Preferred families, tried in order before any other font found on disk
const PREFERRED_FONTS: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "Arial.ttf",
    "arial.ttf",
    "Helvetica.ttc",
    "SegoeUI.ttf",
    "segoeui.ttf",
];

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("/Library/Fonts"),
        PathBuf::from("C:\\Windows\\Fonts"),
    ];
    if let Some(font_dir) = dirs::font_dir() {
        dirs.push(font_dir);
    }
    dirs
}

/// Load a font from `path`
pub fn load_font(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    FontArc::try_from_vec(bytes).ok()
}

/// Find a usable font.
///
/// An explicit path wins. Otherwise the system font folders are searched,
/// preferring common sans-serif families. Returns `None` if nothing loads.
pub fn find_font(explicit: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = explicit {
        match load_font(path) {
            Some(font) => return Some(font),
            None => log::warn!("⚠️  Could not load font {}", path.display()),
        }
    }

    let candidates: Vec<PathBuf> = system_font_dirs()
        .into_iter()
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| {
            WalkDir::new(dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|entry| entry.into_path())
                .filter(|path| {
                    path.extension()
                        .map(|ext| {
                            let ext = ext.to_string_lossy().to_lowercase();
                            ext == "ttf" || ext == "otf"
                        })
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let file_name = |path: &PathBuf| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    };

    for preferred in PREFERRED_FONTS {
        if let Some(path) = candidates.iter().find(|p| file_name(p) == *preferred) {
            if let Some(font) = load_font(path) {
                log::debug!("Using font {}", path.display());
                return Some(font);
            }
        }
    }

    let font = candidates.iter().find_map(|path| load_font(path));
    if font.is_none() {
        log::warn!("⚠️  No system font found, comments will not be rendered");
    }
    font
}

/// Draw one line of text with its baseline at (`x`, `baseline`).
///
/// Newlines are drawn as spaces. Pixels outside the image are clipped.
pub fn draw_line(
    canvas: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    x: f32,
    baseline: f32,
    color: [u8; 3],
) {
    let scaled = font.as_scaled(font_size);
    let (canvas_w, canvas_h) = canvas.dimensions();

    let mut cursor_x = x;
    let mut prev: Option<GlyphId> = None;

    for ch in text.chars() {
        let ch = if ch.is_control() { ' ' } else { ch };
        let id = font.glyph_id(ch);
        if let Some(prev) = prev {
            cursor_x += scaled.kern(prev, id);
        }

        let glyph = id.with_scale_and_position(font_size, point(cursor_x, baseline));
        cursor_x += scaled.h_advance(id);
        prev = Some(id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();

        outlined.draw(|gx, gy, coverage| {
            let px = bounds.min.x as i32 + gx as i32;
            let py = bounds.min.y as i32 + gy as i32;
            if px < 0 || py < 0 || px as u32 >= canvas_w || py as u32 >= canvas_h {
                return;
            }
            let alpha = coverage.clamp(0.0, 1.0);
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            blend(pixel, color, alpha);
        });

        if cursor_x >= canvas_w as f32 {
            break;
        }
    }
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    for channel in 0..3 {
        let dst = pixel[channel] as f32;
        let src = color[channel] as f32;
        pixel[channel] = (dst + (src - dst) * alpha).round() as u8;
    }
    pixel[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_extremes() {
        let mut pixel = Rgba([255, 255, 255, 255]);
        blend(&mut pixel, [0, 0, 0], 0.0);
        assert_eq!(pixel, Rgba([255, 255, 255, 255]));

        blend(&mut pixel, [10, 20, 30], 1.0);
        assert_eq!(pixel, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_missing_explicit_font_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        assert!(load_font(&bogus).is_none());
        // Whatever the host has installed, a bad explicit path must not panic
        let _ = find_font(Some(&bogus));
    }

    #[test]
    fn test_draw_line_marks_pixels_when_font_available() {
        let Some(font) = find_font(None) else {
            return;
        };
        let mut canvas = RgbaImage::from_pixel(200, 50, Rgba([255, 255, 255, 255]));
        draw_line(&mut canvas, &font, "Hello", 16.0, 15.0, 30.0, [0, 0, 0]);

        assert!(canvas.pixels().any(|p| p[0] < 255));
    }
}
