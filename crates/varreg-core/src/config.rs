use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD, DEFAULT_LOG_INTERVAL, DEFAULT_TIME_STEP};
use crate::function::{GradientType, SsdFunction};
use crate::image::Spacing;
use crate::multires::MultiResolutionConfig;

/// Full description of one registration run, as loaded from TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub mask: Option<PathBuf>,
    /// Optional output for the displacement magnitude image.
    #[serde(default)]
    pub field_output: Option<PathBuf>,
    /// Physical pixel spacing applied to every loaded image.
    #[serde(default)]
    pub spacing: Spacing,
    #[serde(default)]
    pub force: ForceConfig,
    #[serde(default)]
    pub schedule: MultiResolutionConfig,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_log_interval() -> usize {
    DEFAULT_LOG_INTERVAL
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            fixed: PathBuf::from("fixed.png"),
            moving: PathBuf::from("moving.png"),
            output: PathBuf::from("warped.tiff"),
            mask: None,
            field_output: None,
            spacing: Spacing::default(),
            force: ForceConfig::default(),
            schedule: MultiResolutionConfig::default(),
            log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    pub gradient_type: GradientType,
    pub intensity_difference_threshold: f64,
    pub time_step: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            gradient_type: GradientType::default(),
            intensity_difference_threshold: DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD,
            time_step: DEFAULT_TIME_STEP,
        }
    }
}

impl ForceConfig {
    /// Build an SSD functional with these parameters and no images bound.
    pub fn build(&self) -> SsdFunction {
        let mut function = SsdFunction::new();
        function.set_gradient_type(self.gradient_type);
        function.set_intensity_difference_threshold(self.intensity_difference_threshold);
        function.set_time_step(self.time_step);
        function
    }
}
