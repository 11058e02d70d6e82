#![allow(dead_code)]

use std::sync::Arc;

use ndarray::Array2;

use varreg_core::image::{Image, Spacing};

/// Gaussian blob of width `sigma` centred at `(cy, cx)`, peak 1.0.
pub fn blob(h: usize, w: usize, cy: f64, cx: f64, sigma: f64) -> Image {
    let s2 = 2.0 * sigma * sigma;
    Image::new(Array2::from_shape_fn((h, w), |(r, c)| {
        let d2 = (r as f64 - cy).powi(2) + (c as f64 - cx).powi(2);
        (-d2 / s2).exp() as f32
    }))
}

pub fn constant(h: usize, w: usize, value: f32) -> Image {
    Image::new(Array2::from_elem((h, w), value))
}

/// 3x3 image whose intensity grows by one per column, `centre` in the middle.
pub fn horizontal_ramp(centre: f32, spacing: Spacing) -> Image {
    Image::with_spacing(
        Array2::from_shape_fn((3, 3), |(_, c)| centre + c as f32 - 1.0),
        spacing,
    )
}

/// 3x3 image whose intensity grows by one per row, `centre` in the middle.
pub fn vertical_ramp(centre: f32, spacing: Spacing) -> Image {
    Image::with_spacing(
        Array2::from_shape_fn((3, 3), |(r, _)| centre + r as f32 - 1.0),
        spacing,
    )
}

pub fn shared(image: Image) -> Arc<Image> {
    Arc::new(image)
}
