use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Physical size of one pixel along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub x: f64,
    pub y: f64,
}

impl Default for Spacing {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

impl Spacing {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Mean of the squared per-axis spacing.
    pub fn mean_squared(&self) -> f64 {
        (self.x * self.x + self.y * self.y) / 2.0
    }

    /// Spacing after a 2x downsampling step.
    pub fn doubled(&self) -> Self {
        Self {
            x: self.x * 2.0,
            y: self.y * 2.0,
        }
    }
}

/// Physical position of the pixel at index (0, 0).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub x: f64,
    pub y: f64,
}

/// A single-channel image on an axis-aligned physical grid.
///
/// Intensities are stored row-major, shape = (height, width). Index (row, col)
/// maps to the physical point `origin + (col * spacing.x, row * spacing.y)`.
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Array2<f32>,
    pub spacing: Spacing,
    pub origin: Origin,
}

impl Image {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            spacing: Spacing::default(),
            origin: Origin::default(),
        }
    }

    pub fn with_spacing(data: Array2<f32>, spacing: Spacing) -> Self {
        Self {
            data,
            spacing,
            origin: Origin::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Intensity at an integer index.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]] as f64
    }

    /// Intensity at a continuous index, bilinearly interpolated.
    #[inline]
    pub fn sample(&self, y: f64, x: f64) -> f64 {
        bilinear_sample(&self.data, y, x)
    }

    /// Physical point `(x, y)` of an integer index.
    pub fn index_to_physical(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin.x + col as f64 * self.spacing.x,
            self.origin.y + row as f64 * self.spacing.y,
        )
    }

    /// Continuous index `(y, x)` of a physical point.
    pub fn physical_to_continuous_index(&self, px: f64, py: f64) -> (f64, f64) {
        (
            (py - self.origin.y) / self.spacing.y,
            (px - self.origin.x) / self.spacing.x,
        )
    }
}

/// Bilinear interpolation at a continuous `(y, x)` index.
///
/// Samples falling outside the array contribute zero.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f64 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let sample = |r: i64, c: i64| -> f64 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]] as f64
        } else {
            0.0
        }
    };

    let v00 = sample(y0, x0);
    let v10 = sample(y0, x1);
    let v01 = sample(y1, x0);
    let v11 = sample(y1, x1);

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}
