use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;
use tracing::debug;

use crate::error::{RegistrationError, Result};
use crate::field::DisplacementField;
use crate::image::{Image, Spacing};

/// Load an image file as grayscale intensities normalized to [0, 1].
pub fn load_image(path: &Path, spacing: Spacing) -> Result<Image> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    });
    debug!(path = %path.display(), width = w, height = h, "Loaded image");
    Ok(Image::with_spacing(data, spacing))
}

/// Save as 16-bit grayscale TIFF.
pub fn save_tiff(image: &Image, path: &Path) -> Result<()> {
    let pixels: Vec<u16> = image
        .data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect();
    let buffer = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(
        image.width() as u32,
        image.height() as u32,
        pixels,
    )
    .ok_or_else(|| RegistrationError::configuration("pixel buffer does not match image size"))?;
    buffer.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save as 8-bit grayscale PNG.
pub fn save_png(image: &Image, path: &Path) -> Result<()> {
    let mut img = GrayImage::new(image.width() as u32, image.height() as u32);
    for ((row, col), &v) in image.data.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save an image, choosing the format from the file extension (TIFF if unknown).
pub fn save_image(image: &Image, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(image, path),
        _ => save_tiff(image, path),
    }
}

/// Save the per-pixel displacement magnitude, scaled so the largest
/// displacement maps to white.
pub fn save_displacement_magnitude(field: &DisplacementField, path: &Path) -> Result<()> {
    let max = field.max_norm();
    let scale = if max > 0.0 { 1.0 / max } else { 0.0 };
    let data = Array2::from_shape_fn(field.dim(), |(row, col)| {
        (field.get(row, col).norm_squared().sqrt() * scale) as f32
    });
    save_image(&Image::new(data), path)
}
