mod common;

use ndarray::Array2;

use varreg_core::config::{ForceConfig, RegistrationConfig};
use varreg_core::function::GradientType;
use varreg_core::image::{Image, Spacing};
use varreg_core::io::{load_image, save_image};
use varreg_core::multires::MultiResolutionConfig;
use varreg_core::pipeline::{
    build_registration, mean_squared_difference, register_images, run_registration,
    RegistrationInputs, RunObservers,
};

use common::blob;

fn config_with(gradient_type: GradientType, levels: usize, iterations: usize) -> RegistrationConfig {
    RegistrationConfig {
        force: ForceConfig {
            gradient_type,
            ..Default::default()
        },
        schedule: MultiResolutionConfig {
            levels,
            iterations: vec![iterations],
            rms_change_threshold: None,
        },
        ..Default::default()
    }
}

fn shifted_blobs() -> RegistrationInputs {
    RegistrationInputs {
        fixed: blob(64, 64, 32.0, 32.0, 6.0),
        moving: blob(64, 64, 32.0, 34.0, 6.0),
        mask: None,
    }
}

// ---------------------------------------------------------------------------
// In-memory registration
// ---------------------------------------------------------------------------

#[test]
fn test_registration_reduces_metric_for_every_gradient_type() {
    let inputs = shifted_blobs();
    for gradient_type in [GradientType::Warped, GradientType::Fixed, GradientType::Symmetric] {
        let config = config_with(gradient_type, 2, 30);
        let mut registration = build_registration(&config, RunObservers::default());
        let output = register_images(&inputs, &mut registration).unwrap();

        assert_eq!(output.field.dim(), (64, 64));
        assert_eq!(output.elapsed_levels, 2);
        assert!(
            output.final_metric < output.initial_metric,
            "{gradient_type}: {} !< {}",
            output.final_metric,
            output.initial_metric
        );
    }
}

#[test]
fn test_displacement_points_toward_moving_feature() {
    let inputs = shifted_blobs();
    let config = config_with(GradientType::Warped, 1, 40);
    let mut registration = build_registration(&config, RunObservers::default());
    let output = register_images(&inputs, &mut registration).unwrap();

    // moving blob sits two columns right of the fixed one
    let u = output.field.get(32, 29);
    assert!(u.x > 0.0, "expected positive x displacement, got {}", u.x);
}

#[test]
fn test_identical_images_need_no_displacement() {
    let img = blob(48, 48, 24.0, 24.0, 5.0);
    let inputs = RegistrationInputs {
        fixed: img.clone(),
        moving: img,
        mask: None,
    };
    let config = config_with(GradientType::Symmetric, 2, 5);
    let mut registration = build_registration(&config, RunObservers::default());
    let output = register_images(&inputs, &mut registration).unwrap();

    assert_eq!(output.max_displacement, 0.0);
    assert_eq!(output.final_metric, 0.0);
}

#[test]
fn test_mask_excludes_region_from_forces() {
    let mut inputs = shifted_blobs();
    inputs.mask = Some(Image::new(Array2::zeros((64, 64))));
    let config = config_with(GradientType::Warped, 1, 5);
    let mut registration = build_registration(&config, RunObservers::default());
    let output = register_images(&inputs, &mut registration).unwrap();

    assert_eq!(output.max_displacement, 0.0);
    assert_eq!(registration.solver().metric(), 0.0);
}

#[test]
fn test_mask_shape_mismatch_is_rejected() {
    let mut inputs = shifted_blobs();
    inputs.mask = Some(Image::new(Array2::ones((10, 10))));
    let config = config_with(GradientType::Warped, 1, 1);
    let mut registration = build_registration(&config, RunObservers::default());
    assert!(register_images(&inputs, &mut registration).is_err());
}

#[test]
fn test_too_many_levels_is_configuration_error() {
    let inputs = shifted_blobs();
    let config = config_with(GradientType::Warped, 5, 1);
    let mut registration = build_registration(&config, RunObservers::default());
    assert!(register_images(&inputs, &mut registration).is_err());
}

#[test]
fn test_mean_squared_difference_honours_mask() {
    let a = Image::new(Array2::from_elem((2, 2), 1.0));
    let b = Image::new(Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 1.0, 3.0]).unwrap());
    let mask = Image::new(Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 1.0, 0.0]).unwrap());
    assert_eq!(mean_squared_difference(&a, &b, None), 1.0);
    assert_eq!(mean_squared_difference(&a, &b, Some(&mask)), 0.0);
}

// ---------------------------------------------------------------------------
// File-based runs
// ---------------------------------------------------------------------------

#[test]
fn test_run_registration_from_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = shifted_blobs();
    save_image(&inputs.fixed, &dir.path().join("fixed.tiff")).unwrap();
    save_image(&inputs.moving, &dir.path().join("moving.tiff")).unwrap();

    let text = format!(
        r#"
fixed = "{fixed}"
moving = "{moving}"
output = "{output}"
field_output = "{field}"

[force]
gradient_type = "Symmetric"
time_step = 1.0

[schedule]
levels = 2
iterations = [20, 10]
"#,
        fixed = dir.path().join("fixed.tiff").display(),
        moving = dir.path().join("moving.tiff").display(),
        output = dir.path().join("warped.png").display(),
        field = dir.path().join("field.tiff").display(),
    );
    let config: RegistrationConfig = toml::from_str(&text).unwrap();
    assert_eq!(config.spacing, Spacing::default());

    let output = run_registration(&config, RunObservers::default()).unwrap();

    assert!(output.final_metric < output.initial_metric);
    let warped = load_image(&dir.path().join("warped.png"), Spacing::default()).unwrap();
    assert_eq!(warped.dim(), (64, 64));
    assert!(dir.path().join("field.tiff").exists());
}

#[test]
fn test_missing_input_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = RegistrationConfig {
        fixed: dir.path().join("missing.png"),
        moving: dir.path().join("missing.png"),
        output: dir.path().join("out.png"),
        ..Default::default()
    };
    assert!(run_registration(&config, RunObservers::default()).is_err());
}
