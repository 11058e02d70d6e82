use std::sync::Arc;

use crate::field::Displacement;
use crate::image::Image;

/// Central-difference gradient of a bound image, in physical units.
///
/// Along each axis: `(I[i+1] - I[i-1]) / (2 * spacing)`. A component whose
/// stencil leaves the image is zero.
#[derive(Clone, Debug)]
pub struct CentralDifferenceGradient {
    image: Arc<Image>,
}

impl CentralDifferenceGradient {
    pub fn new(image: Arc<Image>) -> Self {
        Self { image }
    }

    pub fn rebind(&mut self, image: Arc<Image>) {
        self.image = image;
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    /// Gradient at an integer index.
    pub fn evaluate_at_index(&self, row: usize, col: usize) -> Displacement {
        let img = &*self.image;
        let (h, w) = img.dim();

        let gx = if col >= 1 && col + 1 < w {
            (img.value(row, col + 1) - img.value(row, col - 1)) / (2.0 * img.spacing.x)
        } else {
            0.0
        };
        let gy = if row >= 1 && row + 1 < h {
            (img.value(row + 1, col) - img.value(row - 1, col)) / (2.0 * img.spacing.y)
        } else {
            0.0
        };

        Displacement::new(gx, gy)
    }

    /// Gradient at a continuous `(y, x)` index, from bilinear samples one
    /// pixel either side.
    pub fn evaluate_at_continuous_index(&self, y: f64, x: f64) -> Displacement {
        let img = &*self.image;
        let (h, w) = img.dim();
        let max_y = (h - 1) as f64;
        let max_x = (w - 1) as f64;

        let gx = if x >= 1.0 && x <= max_x - 1.0 {
            (img.sample(y, x + 1.0) - img.sample(y, x - 1.0)) / (2.0 * img.spacing.x)
        } else {
            0.0
        };
        let gy = if y >= 1.0 && y <= max_y - 1.0 {
            (img.sample(y + 1.0, x) - img.sample(y - 1.0, x)) / (2.0 * img.spacing.y)
        } else {
            0.0
        };

        Displacement::new(gx, gy)
    }
}
