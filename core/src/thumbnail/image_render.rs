//! Image thumbnail rendering: EXIF-oriented, alpha-composited-over-white,
//! Lanczos-downscaled, and padded to an exact canvas size.

use std::path::Path;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, imageops};

use crate::error::{Error, Result};

pub fn render(src: &Path, dest: &Path, width: u32, height: u32, quality: u8) -> Result<()> {
    let image = image::open(src).map_err(|e| Error::MalformedMetadata {
        path: src.display().to_string(),
        detail: e.to_string(),
    })?;
    let image = apply_exif_orientation(image, src);
    let rgb = composite_over_white(&image);
    let resized = downscale_preserving_aspect(&rgb, width, height);
    let padded = pad_to_canvas(&resized, width, height);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(dest, e))?;
    }
    let mut out = std::fs::File::create(dest).map_err(|e| Error::io(dest, e))?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(padded))
        .map_err(|e| Error::MalformedMetadata {
            path: dest.display().to_string(),
            detail: e.to_string(),
        })?;
    Ok(())
}

fn composite_over_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut canvas = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let blend = |channel: u8| -> u8 { (channel as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8 };
        canvas.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    canvas
}

fn downscale_preserving_aspect(image: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image.clone();
    }
    let scale = f64::min(max_width as f64 / width as f64, max_height as f64 / height as f64);
    let new_width = ((width as f64) * scale).round().max(1.0) as u32;
    let new_height = ((height as f64) * scale).round().max(1.0) as u32;
    imageops::resize(image, new_width, new_height, imageops::FilterType::Lanczos3)
}

fn pad_to_canvas(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let (w, h) = image.dimensions();
    let x_offset = width.saturating_sub(w) / 2;
    let y_offset = height.saturating_sub(h) / 2;
    imageops::overlay(&mut canvas, image, x_offset as i64, y_offset as i64);
    canvas
}

/// Applies the EXIF `Orientation` tag (values 1-8) to a decoded image, best
/// effort: missing/unparseable EXIF leaves the image untouched rather than
/// failing the render.
fn apply_exif_orientation(image: DynamicImage, src: &Path) -> DynamicImage {
    let Ok(file) = std::fs::File::open(src) else {
        return image;
    };
    let mut reader = std::io::BufReader::new(file);
    let Ok(exif_data) = exif::Reader::new().read_from_container(&mut reader) else {
        return image;
    };
    let Some(field) = exif_data.get_field(exif::Tag::Orientation, exif::In::PRIMARY) else {
        return image;
    };
    let orientation = match &field.value {
        exif::Value::Short(values) => values.first().copied().unwrap_or(1),
        _ => 1,
    };

    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let image = RgbImage::from_pixel(1600, 800, Rgb([0, 0, 0]));
        let resized = downscale_preserving_aspect(&image, 150, 150);
        assert_eq!(resized.width(), 150);
        assert_eq!(resized.height(), 75);
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let image = RgbImage::from_pixel(50, 40, Rgb([0, 0, 0]));
        let resized = downscale_preserving_aspect(&image, 150, 150);
        assert_eq!((resized.width(), resized.height()), (50, 40));
    }

    #[test]
    fn padding_centers_image_on_white_canvas() {
        let image = RgbImage::from_pixel(100, 50, Rgb([10, 10, 10]));
        let padded = pad_to_canvas(&image, 150, 150);
        assert_eq!(padded.dimensions(), (150, 150));
        assert_eq!(*padded.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*padded.get_pixel(75, 75), Rgb([10, 10, 10]));
    }
}
