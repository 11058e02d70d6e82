//! Gaussian image pyramids for coarse-to-fine registration.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{MIN_PYRAMID_SIZE, PARALLEL_PIXEL_THRESHOLD, PYRAMID_BLUR_SIGMA};
use crate::error::{RegistrationError, Result};
use crate::image::Image;

/// Build a Gaussian pyramid with `levels` downsampled levels.
///
/// Returns `levels + 1` images, where index 0 is the original and index
/// `levels` is the coarsest. Each step blurs, keeps every other pixel and
/// doubles the spacing.
pub fn build_pyramid(image: &Image, levels: usize) -> Result<Vec<Image>> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(image.clone());

    let mut current = image.clone();
    for level in 0..levels {
        let (h, w) = current.dim();
        if h.div_ceil(2) < MIN_PYRAMID_SIZE || w.div_ceil(2) < MIN_PYRAMID_SIZE {
            return Err(RegistrationError::configuration(format!(
                "image of {}x{} is too small for {} pyramid levels (stopped at level {})",
                image.width(),
                image.height(),
                levels + 1,
                level + 1
            )));
        }
        let blurred = gaussian_blur_array(&current.data, PYRAMID_BLUR_SIGMA);
        current = Image {
            data: downsample_2x(&blurred),
            spacing: current.spacing.doubled(),
            origin: current.origin,
        };
        pyramid.push(current.clone());
    }

    Ok(pyramid)
}

/// Pyramid for a mask image: plain decimation, no blur, so mask values keep
/// their meaning.
pub fn build_mask_pyramid(mask: &Image, levels: usize) -> Vec<Image> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(mask.clone());
    let mut current = mask.clone();
    for _ in 0..levels {
        current = Image {
            data: downsample_2x(&current.data),
            spacing: current.spacing.doubled(),
            origin: current.origin,
        };
        pyramid.push(current.clone());
    }
    pyramid
}

/// Downsample by 2x by taking every other pixel.
fn downsample_2x(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let new_h = h.div_ceil(2);
    let new_w = w.div_ceil(2);
    Array2::from_shape_fn((new_h, new_w), |(r, c)| data[[r * 2, c * 2]])
}

/// Separable Gaussian blur with edge clamping.
pub fn gaussian_blur_array(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    let kernel = make_gaussian_kernel(sigma);
    let row_pass = convolve(data, &kernel, Axis::Cols);
    convolve(&row_pass, &kernel, Axis::Rows)
}

fn make_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Cols,
}

fn convolve(data: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() / 2;

    let tap = |row: usize, col: usize| -> f32 {
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let shift = ki as isize - radius as isize;
            sum += match axis {
                Axis::Cols => {
                    let src = (col as isize + shift).clamp(0, w as isize - 1) as usize;
                    data[[row, src]]
                }
                Axis::Rows => {
                    let src = (row as isize + shift).clamp(0, h as isize - 1) as usize;
                    data[[src, col]]
                }
            } * kv;
        }
        sum
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<f32>> = (0..h)
            .into_par_iter()
            .map(|row| (0..w).map(|col| tap(row, col)).collect())
            .collect();

        let mut result = Array2::<f32>::zeros((h, w));
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
        result
    } else {
        Array2::from_shape_fn((h, w), |(row, col)| tap(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Spacing;

    #[test]
    fn test_pyramid_shapes_and_spacing() {
        let img = Image::with_spacing(Array2::ones((33, 40)), Spacing::new(1.0, 0.5));
        let pyr = build_pyramid(&img, 2).unwrap();
        assert_eq!(pyr.len(), 3);
        assert_eq!(pyr[1].dim(), (17, 20));
        assert_eq!(pyr[2].dim(), (9, 10));
        assert_eq!(pyr[2].spacing, Spacing::new(4.0, 2.0));
    }

    #[test]
    fn test_blur_preserves_constant_image() {
        let data = Array2::from_elem((12, 12), 0.4f32);
        let blurred = gaussian_blur_array(&data, 1.0);
        assert!(blurred.iter().all(|&v| (v - 0.4).abs() < 1e-5));
    }

    #[test]
    fn test_too_many_levels_rejected() {
        let img = Image::new(Array2::zeros((16, 16)));
        assert!(build_pyramid(&img, 3).is_err());
    }

    #[test]
    fn test_mask_pyramid_keeps_binary_values() {
        let mut data = Array2::<f32>::zeros((16, 16));
        data.slice_mut(ndarray::s![4..12, 4..12]).fill(1.0);
        let pyr = build_mask_pyramid(&Image::new(data), 1);
        assert!(pyr[1].data.iter().all(|&v| v == 0.0 || v == 1.0));
    }
}
