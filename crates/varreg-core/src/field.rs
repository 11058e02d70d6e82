//! Dense displacement fields and the per-voxel neighborhood view handed to
//! the force functional.

use std::ops::{Add, Mul};

use ndarray::Array2;

use crate::consts::NEIGHBORHOOD_RADIUS;
use crate::image::{Image, Spacing};

/// Displacement (or update) vector in physical units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Displacement {
    pub x: f64,
    pub y: f64,
}

impl Displacement {
    pub const ZERO: Displacement = Displacement { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }
}

impl Add for Displacement {
    type Output = Displacement;

    fn add(self, rhs: Displacement) -> Displacement {
        Displacement::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Mul<f64> for Displacement {
    type Output = Displacement;

    fn mul(self, rhs: f64) -> Displacement {
        Displacement::new(self.x * rhs, self.y * rhs)
    }
}

/// Dense per-pixel displacement field on the fixed image grid.
///
/// Components are stored as separate `(h, w)` arrays in physical units.
#[derive(Clone, Debug)]
pub struct DisplacementField {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
}

impl DisplacementField {
    pub fn zeros(dim: (usize, usize)) -> Self {
        Self {
            x: Array2::zeros(dim),
            y: Array2::zeros(dim),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.x.dim()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Displacement {
        Displacement::new(self.x[[row, col]], self.y[[row, col]])
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: Displacement) {
        self.x[[row, col]] = value.x;
        self.y[[row, col]] = value.y;
    }

    /// Radius-1 neighborhood centred on an interior pixel.
    ///
    /// `row` and `col` must be at least `NEIGHBORHOOD_RADIUS` away from the
    /// border.
    pub fn neighborhood(&self, row: usize, col: usize) -> Neighborhood {
        let mut values = [Displacement::ZERO; NEIGHBORHOOD_SIZE];
        let r = NEIGHBORHOOD_RADIUS;
        for (k, v) in values.iter_mut().enumerate() {
            let nr = row + k / NEIGHBORHOOD_SIDE - r;
            let nc = col + k % NEIGHBORHOOD_SIDE - r;
            *v = self.get(nr, nc);
        }
        Neighborhood {
            index: (row, col),
            values,
        }
    }

    /// Largest displacement magnitude in the field.
    pub fn max_norm(&self) -> f64 {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(&dx, &dy)| (dx * dx + dy * dy).sqrt())
            .fold(0.0, f64::max)
    }

    /// Resample the field onto a grid of shape `dim` with spacing `spacing`.
    ///
    /// `source_spacing` is the spacing of the grid this field lives on. Both
    /// grids share the same origin. Vectors are physical, so only positions
    /// are rescaled; values outside the source grid are clamped to the edge.
    pub fn resample(&self, source_spacing: Spacing, dim: (usize, usize), spacing: Spacing) -> Self {
        let (h, w) = dim;
        let mut out = Self::zeros(dim);
        let sy = spacing.y / source_spacing.y;
        let sx = spacing.x / source_spacing.x;
        for row in 0..h {
            let src_y = row as f64 * sy;
            for col in 0..w {
                let src_x = col as f64 * sx;
                out.x[[row, col]] = bilinear_sample_clamped(&self.x, src_y, src_x);
                out.y[[row, col]] = bilinear_sample_clamped(&self.y, src_y, src_x);
            }
        }
        out
    }
}

const NEIGHBORHOOD_SIDE: usize = 2 * NEIGHBORHOOD_RADIUS + 1;
const NEIGHBORHOOD_SIZE: usize = NEIGHBORHOOD_SIDE * NEIGHBORHOOD_SIDE;

/// Fixed-radius window of field samples around one pixel.
///
/// Only valid for the duration of a single `compute_update` call.
#[derive(Clone, Debug)]
pub struct Neighborhood {
    index: (usize, usize),
    values: [Displacement; NEIGHBORHOOD_SIZE],
}

impl Neighborhood {
    /// Centre index `(row, col)` in the fixed image.
    pub fn index(&self) -> (usize, usize) {
        self.index
    }

    pub fn center_value(&self) -> Displacement {
        self.values[NEIGHBORHOOD_SIZE / 2]
    }
}

/// Warp `moving` onto the grid of `fixed` with the displacement field:
/// `warped(x) = moving(x + u(x))`.
pub fn warp_image(moving: &Image, fixed: &Image, field: &DisplacementField) -> Image {
    let (h, w) = fixed.dim();
    let mut result = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        for col in 0..w {
            let (px, py) = fixed.index_to_physical(row, col);
            let (y, x) =
                moving.physical_to_continuous_index(px + field.x[[row, col]], py + field.y[[row, col]]);
            result[[row, col]] = moving.sample(y, x) as f32;
        }
    }

    Image {
        data: result,
        spacing: fixed.spacing,
        origin: fixed.origin,
    }
}

fn bilinear_sample_clamped(data: &Array2<f64>, y: f64, x: f64) -> f64 {
    let (h, w) = data.dim();
    let y = y.clamp(0.0, (h - 1) as f64);
    let x = x.clamp(0.0, (w - 1) as f64);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    data[[y0, x0]] * (1.0 - fx) * (1.0 - fy)
        + data[[y0, x1]] * fx * (1.0 - fy)
        + data[[y1, x0]] * (1.0 - fx) * fy
        + data[[y1, x1]] * fx * fy
}
