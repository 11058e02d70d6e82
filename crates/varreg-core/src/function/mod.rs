//! Force functionals driven by the finite-difference solver.
//!
//! A functional is called in three phases per iteration:
//! `initialize_iteration` (sequential), `compute_update` for every interior
//! pixel (parallel, one [`GlobalData`] per worker) and
//! `compute_global_time_step` (sequential, after the per-worker accumulators
//! have been merged).

pub mod gradient;
pub mod ssd;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{Displacement, DisplacementField, Neighborhood};
use crate::image::Image;

pub use ssd::{GradientType, SsdFunction};

/// Per-worker accumulator written by `compute_update`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlobalData {
    pub sum_of_squared_differences: f64,
    pub sum_of_squared_change: f64,
    pub number_of_pixels_processed: usize,
}

impl GlobalData {
    /// Combine two worker accumulators.
    pub fn merge(self, other: GlobalData) -> GlobalData {
        GlobalData {
            sum_of_squared_differences: self.sum_of_squared_differences
                + other.sum_of_squared_differences,
            sum_of_squared_change: self.sum_of_squared_change + other.sum_of_squared_change,
            number_of_pixels_processed: self.number_of_pixels_processed
                + other.number_of_pixels_processed,
        }
    }

    /// Mean squared intensity difference over the processed pixels.
    pub fn metric(&self) -> f64 {
        if self.number_of_pixels_processed == 0 {
            return 0.0;
        }
        self.sum_of_squared_differences / self.number_of_pixels_processed as f64
    }

    /// Root-mean-square length of the update vectors.
    pub fn rms_change(&self) -> f64 {
        if self.number_of_pixels_processed == 0 {
            return 0.0;
        }
        (self.sum_of_squared_change / self.number_of_pixels_processed as f64).sqrt()
    }
}

/// Parameter changes an observer may request between events.
///
/// `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceParameters {
    pub gradient_type: Option<GradientType>,
    pub intensity_difference_threshold: Option<f64>,
    pub time_step: Option<f64>,
}

/// A force model usable by the variational solver.
pub trait RegistrationFunction: Send + Sync {
    /// Bind the images of the current resolution level. The mask, when
    /// given, lives on the fixed grid.
    fn set_images(&mut self, fixed: Arc<Image>, moving: Arc<Image>, mask: Option<Arc<Image>>);

    /// Prepare state for the next iteration from the current field.
    ///
    /// Configuration problems are reported here, never from
    /// `compute_update`.
    fn initialize_iteration(&mut self, field: &DisplacementField) -> Result<()>;

    /// Update vector for the centre pixel of `neighborhood`.
    fn compute_update(
        &self,
        neighborhood: &Neighborhood,
        global: &mut GlobalData,
        offset: Displacement,
    ) -> Displacement;

    /// Time step for the iteration, after all updates have been computed.
    fn compute_global_time_step(&self, global: &GlobalData) -> f64;

    /// Apply observer-requested parameter changes.
    fn reconfigure(&mut self, params: &ForceParameters);
}
