//! File-to-file registration run: load, register, warp, save.

use tracing::info;

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::events::{Observer, RegistrationLogger};
use crate::field::{warp_image, DisplacementField};
use crate::function::SsdFunction;
use crate::image::Image;
use crate::io::{load_image, save_displacement_magnitude, save_image};
use crate::multires::MultiResolutionRegistration;

/// Observers attached to a run in addition to the default logger.
#[derive(Default)]
pub struct RunObservers {
    /// Receive solver `Initialize`/`Iteration` events of every level.
    pub solver: Vec<Box<dyn Observer + Send>>,
    /// Receive multi-resolution `Initialize`/`ResolutionLevelChanged` events.
    pub levels: Vec<Box<dyn Observer + Send>>,
}

/// Result of a registration run.
#[derive(Clone, Debug)]
pub struct RegistrationOutput {
    pub field: DisplacementField,
    pub warped: Image,
    /// Mean squared difference between fixed and moving before registration.
    pub initial_metric: f64,
    /// Mean squared difference between fixed and warped after registration.
    pub final_metric: f64,
    pub elapsed_levels: usize,
    pub max_displacement: f64,
}

/// Images a run operates on.
#[derive(Clone, Debug)]
pub struct RegistrationInputs {
    pub fixed: Image,
    pub moving: Image,
    pub mask: Option<Image>,
}

/// Load the fixed, moving and mask images named by `config`.
pub fn load_inputs(config: &RegistrationConfig) -> Result<RegistrationInputs> {
    let fixed = load_image(&config.fixed, config.spacing)?;
    let moving = load_image(&config.moving, config.spacing)?;
    let mask = config
        .mask
        .as_ref()
        .map(|path| load_image(path, config.spacing))
        .transpose()?;
    Ok(RegistrationInputs { fixed, moving, mask })
}

/// Build the multi-resolution driver for `config` with the logger subscribed
/// to both the solver and the level events, followed by `observers`.
pub fn build_registration(
    config: &RegistrationConfig,
    observers: RunObservers,
) -> MultiResolutionRegistration<SsdFunction> {
    let mut registration =
        MultiResolutionRegistration::new(config.force.build(), config.schedule.clone());
    registration.subscribe_solver(Box::new(RegistrationLogger::new(config.log_interval)));
    registration.subscribe(Box::new(RegistrationLogger::new(config.log_interval)));
    for observer in observers.solver {
        registration.subscribe_solver(observer);
    }
    for observer in observers.levels {
        registration.subscribe(observer);
    }
    registration
}

/// Register in-memory images.
pub fn register_images(
    inputs: &RegistrationInputs,
    registration: &mut MultiResolutionRegistration<SsdFunction>,
) -> Result<RegistrationOutput> {
    let RegistrationInputs { fixed, moving, mask } = inputs;
    if let Some(mask) = mask {
        if mask.dim() != fixed.dim() {
            return Err(RegistrationError::ShapeMismatch {
                what: "mask image",
                expected: fixed.dim(),
                actual: mask.dim(),
            });
        }
    }

    let identity = DisplacementField::zeros(fixed.dim());
    let initial_metric = mean_squared_difference(fixed, &warp_image(moving, fixed, &identity), mask.as_ref());

    let field = registration.run(fixed, moving, mask.as_ref(), None)?;
    let warped = warp_image(moving, fixed, &field);
    let final_metric = mean_squared_difference(fixed, &warped, mask.as_ref());
    let max_displacement = field.max_norm();

    info!(
        initial_metric,
        final_metric,
        max_displacement,
        levels = registration.elapsed_levels(),
        "Registration complete"
    );

    Ok(RegistrationOutput {
        field,
        warped,
        initial_metric,
        final_metric,
        elapsed_levels: registration.elapsed_levels(),
        max_displacement,
    })
}

/// Run the full file-based registration described by `config` and write its
/// outputs.
pub fn run_registration(config: &RegistrationConfig, observers: RunObservers) -> Result<RegistrationOutput> {
    let inputs = load_inputs(config)?;
    info!(
        fixed = %config.fixed.display(),
        moving = %config.moving.display(),
        width = inputs.fixed.width(),
        height = inputs.fixed.height(),
        gradient = %config.force.gradient_type,
        "Loaded registration inputs"
    );

    let mut registration = build_registration(config, observers);
    let output = register_images(&inputs, &mut registration)?;

    save_image(&output.warped, &config.output)?;
    info!(path = %config.output.display(), "Wrote warped image");
    if let Some(path) = &config.field_output {
        save_displacement_magnitude(&output.field, path)?;
        info!(path = %path.display(), "Wrote displacement magnitude");
    }
    Ok(output)
}

/// Mean squared intensity difference over pixels inside `mask` (all pixels
/// when no mask is given).
pub fn mean_squared_difference(a: &Image, b: &Image, mask: Option<&Image>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for ((row, col), &va) in a.data.indexed_iter() {
        if let Some(m) = mask {
            if m.data[[row, col]] <= 0.0 {
                continue;
            }
        }
        let d = va as f64 - b.data[[row, col]] as f64;
        sum += d * d;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

