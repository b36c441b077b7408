//! Thumbnail generation: image file → downscaled PNG bytes for the report.
//!
//! ## Why re-encode as PNG?
//! The spreadsheet embeds whatever bytes it is given. Source formats vary
//! (GIF palettes, WebP, BMP), and PNG is the one every spreadsheet viewer
//! renders. Alpha and palette modes are flattened to RGB first so viewers
//! never show a transparent or black cell.
//!
//! ## Sizing
//! The thumbnail fits inside `max_width × max_height` with its aspect ratio
//! preserved. Images already smaller than the box are not upscaled.

use crate::error::ItemError;
use crate::output::display_name;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Produce PNG thumbnail bytes for the image at `path`.
pub fn make_thumbnail(path: &Path, max_width: u32, max_height: u32) -> Result<Vec<u8>, ItemError> {
    let name = display_name(path);
    let failed = |detail: String| ItemError::Thumbnail {
        name: name.clone(),
        detail,
    };
    // Sniff the content: drive downloads can carry a misleading extension.
    let img = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| failed(e.to_string()))?
        .decode()
        .map_err(|e| failed(e.to_string()))?;

    let thumb = scale_to_fit(to_rgb(img), max_width, max_height);

    let mut buf = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| failed(e.to_string()))?;

    debug!(
        "Thumbnail {} → {}x{} ({} bytes)",
        path.display(),
        thumb.width(),
        thumb.height(),
        buf.len()
    );
    Ok(buf)
}

fn to_rgb(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Target dimensions for an image of `width × height` inside the box.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

fn scale_to_fit(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (w, h) = fit_dimensions(img.width(), img.height(), max_width, max_height);
    if (w, h) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    }
}
