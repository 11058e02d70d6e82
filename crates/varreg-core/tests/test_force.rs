mod common;

use approx::assert_relative_eq;
use ndarray::Array2;

use varreg_core::error::RegistrationError;
use varreg_core::field::{Displacement, DisplacementField};
use varreg_core::function::{
    ForceParameters, GlobalData, GradientType, RegistrationFunction, SsdFunction,
};
use varreg_core::image::{Image, Spacing};

use common::{constant, horizontal_ramp, shared, vertical_ramp};

fn bound(fixed: Image, moving: Image) -> SsdFunction {
    let mut f = SsdFunction::new();
    f.set_fixed_image(shared(fixed));
    f.set_moving_image(shared(moving));
    f
}

fn update_at_centre(f: &mut SsdFunction) -> (Displacement, GlobalData) {
    let field = DisplacementField::zeros((3, 3));
    f.initialize_iteration(&field).unwrap();
    let mut global = GlobalData::default();
    let update = f.compute_update(&field.neighborhood(1, 1), &mut global, Displacement::ZERO);
    (update, global)
}

// ---------------------------------------------------------------------------
// Update rule
// ---------------------------------------------------------------------------

#[test]
fn test_matched_intensities_give_zero_update() {
    let mut f = bound(constant(3, 3, 10.0), constant(3, 3, 10.0005));
    f.set_intensity_difference_threshold(0.001);

    let (update, global) = update_at_centre(&mut f);

    assert_eq!(update, Displacement::ZERO);
    assert_eq!(global.number_of_pixels_processed, 1);
    assert!(global.sum_of_squared_differences > 0.0);
    assert_eq!(global.sum_of_squared_change, 0.0);
}

#[test]
fn test_fixed_gradient_update() {
    let mut f = bound(horizontal_ramp(10.0, Spacing::default()), constant(3, 3, 8.0));
    f.set_gradient_type_to_fixed_image();
    f.set_time_step(1.0);

    let (update, global) = update_at_centre(&mut f);

    assert_relative_eq!(f.normalizer(), 1.0);
    assert_relative_eq!(update.x, 2.0, epsilon = 1e-12);
    assert_relative_eq!(update.y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(global.sum_of_squared_differences, 4.0, epsilon = 1e-12);
    assert_relative_eq!(global.sum_of_squared_change, 4.0, epsilon = 1e-12);
}

#[test]
fn test_gradient_type_changes_direction_not_difference() {
    let fixed = horizontal_ramp(10.0, Spacing::default());
    let moving = constant(3, 3, 8.0);

    let mut results = Vec::new();
    for gradient_type in [GradientType::Fixed, GradientType::Warped, GradientType::Symmetric] {
        let mut f = bound(fixed.clone(), moving.clone());
        f.set_gradient_type(gradient_type);
        results.push(update_at_centre(&mut f));
    }

    let (fixed_update, fixed_global) = results[0];
    let (warped_update, warped_global) = results[1];
    let (symmetric_update, symmetric_global) = results[2];

    assert_eq!(fixed_global.sum_of_squared_differences, warped_global.sum_of_squared_differences);
    assert_eq!(fixed_global.sum_of_squared_differences, symmetric_global.sum_of_squared_differences);

    // The warped moving image is flat, so only the fixed gradient drives.
    assert_eq!(warped_update, Displacement::ZERO);
    assert_relative_eq!(symmetric_update.x, 0.5 * (fixed_update.x + warped_update.x), epsilon = 1e-12);
    assert_relative_eq!(symmetric_update.y, 0.5 * (fixed_update.y + warped_update.y), epsilon = 1e-12);
}

#[test]
fn test_symmetric_update_averages_distinct_gradients() {
    let fixed = horizontal_ramp(10.0, Spacing::default());
    let moving = vertical_ramp(8.0, Spacing::default());

    let update_for = |gradient_type| {
        let mut f = bound(fixed.clone(), moving.clone());
        f.set_gradient_type(gradient_type);
        update_at_centre(&mut f).0
    };
    let fixed_update = update_for(GradientType::Fixed);
    let warped_update = update_for(GradientType::Warped);
    let symmetric_update = update_for(GradientType::Symmetric);

    // fixed gradient runs along x, warped gradient along y; difference is 2
    assert_relative_eq!(fixed_update.x, 2.0, epsilon = 1e-12);
    assert_relative_eq!(fixed_update.y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(warped_update.x, 0.0, epsilon = 1e-12);
    assert_relative_eq!(warped_update.y, 2.0, epsilon = 1e-12);
    assert_relative_eq!(symmetric_update.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(symmetric_update.y, 1.0, epsilon = 1e-12);
}

#[test]
fn test_anisotropic_spacing_scales_gradient_and_normalizer() {
    let spacing = Spacing::new(2.0, 1.0);
    let mut f = bound(horizontal_ramp(10.0, spacing), Image::with_spacing(Array2::from_elem((3, 3), 8.0), spacing));
    f.set_gradient_type_to_fixed_image();
    f.set_time_step(0.5);

    let (update, _) = update_at_centre(&mut f);

    // gradient 2 / (2 * 2), normalizer 1 / mean(4, 1)
    assert_relative_eq!(f.normalizer(), 0.4, epsilon = 1e-12);
    assert_relative_eq!(update.x, 0.5 * 0.4 * 2.0 * 0.5, epsilon = 1e-12);
}

#[test]
fn test_global_time_step_ignores_accumulator() {
    let mut f = bound(horizontal_ramp(10.0, Spacing::new(2.0, 1.0)), constant(3, 3, 8.0));
    f.set_time_step(0.5);
    f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap();

    let empty = GlobalData::default();
    let busy = GlobalData {
        sum_of_squared_differences: 12.0,
        sum_of_squared_change: 3.0,
        number_of_pixels_processed: 7,
    };
    assert_eq!(f.compute_global_time_step(&empty), f.compute_global_time_step(&busy));
    assert_relative_eq!(f.compute_global_time_step(&empty), 0.2, epsilon = 1e-12);
}

#[test]
fn test_masked_out_pixel_is_skipped() {
    let mut f = bound(horizontal_ramp(10.0, Spacing::default()), constant(3, 3, 8.0));
    f.set_mask_image(Some(shared(constant(3, 3, 0.0))));

    let (update, global) = update_at_centre(&mut f);

    assert_eq!(update, Displacement::ZERO);
    assert_eq!(global, GlobalData::default());
}

#[test]
fn test_offset_shifts_moving_sample() {
    let mut f = bound(constant(3, 3, 10.0), horizontal_ramp(10.0, Spacing::default()));
    f.set_gradient_type_to_fixed_image();
    let field = DisplacementField::zeros((3, 3));
    f.initialize_iteration(&field).unwrap();

    let mut global = GlobalData::default();
    f.compute_update(&field.neighborhood(1, 1), &mut global, Displacement::new(1.0, 0.0));

    // moving(1, 2) = 11
    assert_relative_eq!(global.sum_of_squared_differences, 1.0, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Parameters and configuration errors
// ---------------------------------------------------------------------------

#[test]
fn test_defaults() {
    let f = SsdFunction::new();
    assert_eq!(f.gradient_type(), GradientType::Warped);
    assert_eq!(f.intensity_difference_threshold(), 0.001);
    assert_eq!(f.time_step(), 1.0);
    assert_eq!(format!("{}", GradientType::Fixed), "Fixed image");
}

#[test]
fn test_reconfigure_only_touches_given_fields() {
    let mut f = SsdFunction::new();
    f.reconfigure(&ForceParameters {
        gradient_type: Some(GradientType::Symmetric),
        ..Default::default()
    });
    assert_eq!(f.gradient_type(), GradientType::Symmetric);
    assert_eq!(f.intensity_difference_threshold(), 0.001);
    assert_eq!(f.time_step(), 1.0);
}

#[test]
fn test_warped_image_only_built_when_needed() {
    let mut f = bound(constant(5, 5, 1.0), constant(5, 5, 2.0));
    f.set_gradient_type_to_fixed_image();
    f.initialize_iteration(&DisplacementField::zeros((5, 5))).unwrap();
    assert!(f.warped_image().is_none());

    f.set_gradient_type_to_symmetric();
    f.initialize_iteration(&DisplacementField::zeros((5, 5))).unwrap();
    assert!(f.warped_image().is_some());
}

#[test]
fn test_threshold_round_trip_is_exact() {
    let mut f = SsdFunction::new();
    for value in [0.0, 0.123456789, 1e-12, 42.5] {
        f.set_intensity_difference_threshold(value);
        assert_eq!(f.intensity_difference_threshold(), value);
    }
}

#[test]
fn test_unbound_function_reports_configuration_error() {
    let mut f = SsdFunction::new();
    let field = DisplacementField::zeros((3, 3));
    let err = f.initialize_iteration(&field).unwrap_err();
    assert!(matches!(err, RegistrationError::Configuration(_)));

    let mut global = GlobalData::default();
    let update = f.compute_update(&field.neighborhood(1, 1), &mut global, Displacement::ZERO);
    assert_eq!(update, Displacement::ZERO);
    assert_eq!(global, GlobalData::default());
}

#[test]
fn test_non_finite_spacing_is_degenerate() {
    let img = Image::with_spacing(Array2::zeros((3, 3)), Spacing::new(f64::INFINITY, 1.0));
    let mut f = bound(img.clone(), img);
    let err = f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap_err();
    assert!(matches!(err, RegistrationError::NumericDegeneracy(_)));
}

#[test]
fn test_zero_time_step_rejected() {
    let mut f = bound(constant(3, 3, 1.0), constant(3, 3, 1.0));
    f.set_time_step(0.0);
    let err = f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap_err();
    assert!(matches!(err, RegistrationError::Configuration(_)));
}

#[test]
fn test_overflowing_force_scale_is_degenerate() {
    let spacing = Spacing::new(0.5, 0.5);
    let mut f = bound(
        horizontal_ramp(10.0, spacing),
        Image::with_spacing(Array2::from_elem((3, 3), 8.0), spacing),
    );
    f.set_gradient_type_to_fixed_image();
    f.set_time_step(1e308);
    let err = f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap_err();
    assert!(matches!(err, RegistrationError::NumericDegeneracy(_)));
}

#[test]
fn test_negative_threshold_rejected() {
    let mut f = bound(constant(3, 3, 1.0), constant(3, 3, 1.0));
    f.set_intensity_difference_threshold(-1.0);
    let err = f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap_err();
    assert!(matches!(err, RegistrationError::Configuration(_)));
}

#[test]
fn test_field_shape_mismatch_rejected() {
    let mut f = bound(constant(5, 5, 1.0), constant(5, 5, 1.0));
    let err = f.initialize_iteration(&DisplacementField::zeros((4, 5))).unwrap_err();
    assert!(matches!(err, RegistrationError::ShapeMismatch { .. }));
}

#[test]
fn test_mask_shape_mismatch_rejected() {
    let mut f = bound(constant(3, 3, 1.0), constant(3, 3, 1.0));
    f.set_mask_image(Some(shared(constant(4, 3, 1.0))));
    let err = f.initialize_iteration(&DisplacementField::zeros((3, 3))).unwrap_err();
    assert!(matches!(err, RegistrationError::ShapeMismatch { .. }));
}
