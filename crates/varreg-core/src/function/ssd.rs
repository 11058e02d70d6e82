//! Sum-of-squared-differences forces.
//!
//! For a fixed image F, moving image M and displacement u:
//!
//! ```text
//! f(x) = tau * kappa * (F(x) - M(x + u(x))) * g(x)
//! ```
//!
//! where `tau` is the time step, `kappa = 1 / mean(spacing_i^2)` and `g` is
//! the gradient of the warped moving image, of the fixed image, or the mean
//! of both.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD, DEFAULT_TIME_STEP};
use crate::error::{RegistrationError, Result};
use crate::field::{warp_image, Displacement, DisplacementField, Neighborhood};
use crate::image::Image;

use super::gradient::CentralDifferenceGradient;
use super::{ForceParameters, GlobalData, RegistrationFunction};

/// Which image gradient drives the force direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientType {
    /// Gradient of the moving image warped with the current field.
    #[default]
    Warped,
    /// Gradient of the fixed image.
    Fixed,
    /// Mean of the fixed and warped gradients.
    Symmetric,
}

impl fmt::Display for GradientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warped => write!(f, "Warped moving image"),
            Self::Fixed => write!(f, "Fixed image"),
            Self::Symmetric => write!(f, "Symmetric"),
        }
    }
}

/// SSD force functional.
#[derive(Clone, Debug)]
pub struct SsdFunction {
    fixed: Option<Arc<Image>>,
    moving: Option<Arc<Image>>,
    mask: Option<Arc<Image>>,
    warped: Option<Arc<Image>>,
    fixed_gradient: Option<CentralDifferenceGradient>,
    warped_gradient: Option<CentralDifferenceGradient>,
    gradient_type: GradientType,
    /// Gradient type captured by the last `initialize_iteration`.
    active_gradient_type: GradientType,
    intensity_difference_threshold: f64,
    time_step: f64,
    normalizer: f64,
}

impl Default for SsdFunction {
    fn default() -> Self {
        Self {
            fixed: None,
            moving: None,
            mask: None,
            warped: None,
            fixed_gradient: None,
            warped_gradient: None,
            gradient_type: GradientType::default(),
            active_gradient_type: GradientType::default(),
            intensity_difference_threshold: DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD,
            time_step: DEFAULT_TIME_STEP,
            normalizer: 1.0,
        }
    }
}

impl SsdFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fixed_image(&mut self, image: Arc<Image>) {
        self.fixed = Some(image);
    }

    pub fn set_moving_image(&mut self, image: Arc<Image>) {
        self.moving = Some(image);
    }

    /// Restrict force computation to pixels where the mask is positive.
    pub fn set_mask_image(&mut self, mask: Option<Arc<Image>>) {
        self.mask = mask;
    }

    pub fn fixed_image(&self) -> Option<&Arc<Image>> {
        self.fixed.as_ref()
    }

    pub fn moving_image(&self) -> Option<&Arc<Image>> {
        self.moving.as_ref()
    }

    /// Moving image warped by the field passed to the last
    /// `initialize_iteration`, if the gradient type needed it.
    pub fn warped_image(&self) -> Option<&Arc<Image>> {
        self.warped.as_ref()
    }

    pub fn set_gradient_type_to_fixed_image(&mut self) {
        self.gradient_type = GradientType::Fixed;
    }

    pub fn set_gradient_type_to_warped_moving_image(&mut self) {
        self.gradient_type = GradientType::Warped;
    }

    pub fn set_gradient_type_to_symmetric(&mut self) {
        self.gradient_type = GradientType::Symmetric;
    }

    pub fn set_gradient_type(&mut self, gradient_type: GradientType) {
        self.gradient_type = gradient_type;
    }

    pub fn gradient_type(&self) -> GradientType {
        self.gradient_type
    }

    /// Absolute intensity difference below which a pixel counts as matched
    /// and receives the zero update. Default is 0.001.
    pub fn set_intensity_difference_threshold(&mut self, threshold: f64) {
        self.intensity_difference_threshold = threshold;
    }

    pub fn intensity_difference_threshold(&self) -> f64 {
        self.intensity_difference_threshold
    }

    pub fn set_time_step(&mut self, time_step: f64) {
        self.time_step = time_step;
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Spacing normalizer computed by the last `initialize_iteration`.
    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    fn validate(&self, field: &DisplacementField) -> Result<(Arc<Image>, Arc<Image>)> {
        let fixed = self
            .fixed
            .clone()
            .ok_or_else(|| RegistrationError::configuration("fixed image not set"))?;
        let moving = self
            .moving
            .clone()
            .ok_or_else(|| RegistrationError::configuration("moving image not set"))?;

        if field.dim() != fixed.dim() {
            return Err(RegistrationError::ShapeMismatch {
                what: "displacement field",
                expected: fixed.dim(),
                actual: field.dim(),
            });
        }
        if let Some(mask) = &self.mask {
            if mask.dim() != fixed.dim() {
                return Err(RegistrationError::ShapeMismatch {
                    what: "mask image",
                    expected: fixed.dim(),
                    actual: mask.dim(),
                });
            }
        }

        let t = self.intensity_difference_threshold;
        if !t.is_finite() || t < 0.0 {
            return Err(RegistrationError::configuration(format!(
                "intensity difference threshold must be finite and >= 0, got {t}"
            )));
        }
        let tau = self.time_step;
        if !tau.is_finite() || tau <= 0.0 {
            return Err(RegistrationError::configuration(format!(
                "time step must be finite and > 0, got {tau}"
            )));
        }

        Ok((fixed, moving))
    }

    fn gradient_at(&self, row: usize, col: usize) -> Displacement {
        let fixed = || {
            self.fixed_gradient
                .as_ref()
                .map(|g| g.evaluate_at_index(row, col))
                .unwrap_or(Displacement::ZERO)
        };
        let warped = || {
            self.warped_gradient
                .as_ref()
                .map(|g| g.evaluate_at_index(row, col))
                .unwrap_or(Displacement::ZERO)
        };

        match self.active_gradient_type {
            GradientType::Fixed => fixed(),
            GradientType::Warped => warped(),
            GradientType::Symmetric => (fixed() + warped()) * 0.5,
        }
    }
}

/// `1 / mean(spacing_i^2)`, rejecting spacings that would make it degenerate.
fn spacing_normalizer(image: &Image) -> Result<f64> {
    let s = image.spacing;
    if !(s.x.is_finite() && s.y.is_finite() && s.x > 0.0 && s.y > 0.0) {
        return Err(RegistrationError::numeric_degeneracy(format!(
            "fixed image spacing must be positive and finite, got ({}, {})",
            s.x, s.y
        )));
    }
    let normalizer = 1.0 / s.mean_squared();
    if !normalizer.is_finite() || normalizer <= 0.0 {
        return Err(RegistrationError::numeric_degeneracy(format!(
            "spacing normalizer is {normalizer} for spacing ({}, {})",
            s.x, s.y
        )));
    }
    Ok(normalizer)
}

impl RegistrationFunction for SsdFunction {
    fn set_images(&mut self, fixed: Arc<Image>, moving: Arc<Image>, mask: Option<Arc<Image>>) {
        self.fixed = Some(fixed);
        self.moving = Some(moving);
        self.mask = mask;
    }

    fn initialize_iteration(&mut self, field: &DisplacementField) -> Result<()> {
        let (fixed, moving) = self.validate(field)?;
        self.normalizer = spacing_normalizer(&fixed)?;
        let scale = self.time_step * self.normalizer;
        if !scale.is_finite() {
            return Err(RegistrationError::numeric_degeneracy(format!(
                "time step {} times spacing normalizer {} is not finite",
                self.time_step, self.normalizer
            )));
        }
        self.active_gradient_type = self.gradient_type;

        let needs_fixed = matches!(
            self.active_gradient_type,
            GradientType::Fixed | GradientType::Symmetric
        );
        let needs_warped = matches!(
            self.active_gradient_type,
            GradientType::Warped | GradientType::Symmetric
        );

        if needs_fixed {
            match &mut self.fixed_gradient {
                Some(g) => g.rebind(Arc::clone(&fixed)),
                None => self.fixed_gradient = Some(CentralDifferenceGradient::new(Arc::clone(&fixed))),
            }
        } else {
            self.fixed_gradient = None;
        }

        if needs_warped {
            let warped = Arc::new(warp_image(&moving, &fixed, field));
            match &mut self.warped_gradient {
                Some(g) => g.rebind(Arc::clone(&warped)),
                None => {
                    self.warped_gradient = Some(CentralDifferenceGradient::new(Arc::clone(&warped)))
                }
            }
            self.warped = Some(warped);
        } else {
            self.warped_gradient = None;
            self.warped = None;
        }

        debug!(
            normalizer = self.normalizer,
            gradient = %self.active_gradient_type,
            threshold = self.intensity_difference_threshold,
            "SSD iteration initialized"
        );
        Ok(())
    }

    fn compute_update(
        &self,
        neighborhood: &Neighborhood,
        global: &mut GlobalData,
        offset: Displacement,
    ) -> Displacement {
        let (Some(fixed), Some(moving)) = (&self.fixed, &self.moving) else {
            return Displacement::ZERO;
        };
        let (row, col) = neighborhood.index();

        if let Some(mask) = &self.mask {
            if mask.value(row, col) <= 0.0 {
                return Displacement::ZERO;
            }
        }

        let u = neighborhood.center_value();
        let (px, py) = fixed.index_to_physical(row, col);
        let (my, mx) = moving.physical_to_continuous_index(px + u.x, py + u.y);
        let moving_value = moving.sample(my + offset.y, mx + offset.x);
        let diff = fixed.value(row, col) - moving_value;

        global.sum_of_squared_differences += diff * diff;
        global.number_of_pixels_processed += 1;

        if diff.abs() < self.intensity_difference_threshold {
            return Displacement::ZERO;
        }

        let gradient = self.gradient_at(row, col);
        let update = gradient * (self.time_step * self.normalizer * diff);
        global.sum_of_squared_change += update.norm_squared();
        update
    }

    fn compute_global_time_step(&self, _global: &GlobalData) -> f64 {
        self.time_step * self.normalizer
    }

    fn reconfigure(&mut self, params: &ForceParameters) {
        if let Some(gradient_type) = params.gradient_type {
            self.gradient_type = gradient_type;
        }
        if let Some(threshold) = params.intensity_difference_threshold {
            self.intensity_difference_threshold = threshold;
        }
        if let Some(time_step) = params.time_step {
            self.time_step = time_step;
        }
    }
}
