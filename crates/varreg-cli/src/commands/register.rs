use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use varreg_core::config::{ForceConfig, RegistrationConfig};
use varreg_core::consts::{
    DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD, DEFAULT_ITERATIONS_PER_LEVEL, DEFAULT_LOG_INTERVAL,
    DEFAULT_RESOLUTION_LEVELS, DEFAULT_TIME_STEP,
};
use varreg_core::error::Result as CoreResult;
use varreg_core::events::{Action, Emitter, Event, EventKind, Observer};
use varreg_core::function::GradientType;
use varreg_core::image::Spacing;
use varreg_core::multires::MultiResolutionConfig;
use varreg_core::pipeline::{run_registration, RunObservers};

use crate::summary::{print_registration_result, print_registration_summary};

#[derive(Clone, ValueEnum)]
pub enum GradientArg {
    Warped,
    Fixed,
    Symmetric,
}

impl From<&GradientArg> for GradientType {
    fn from(arg: &GradientArg) -> Self {
        match arg {
            GradientArg::Warped => GradientType::Warped,
            GradientArg::Fixed => GradientType::Fixed,
            GradientArg::Symmetric => GradientType::Symmetric,
        }
    }
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Fixed (reference) image
    pub fixed: Option<PathBuf>,

    /// Moving image to be warped onto the fixed image
    pub moving: Option<PathBuf>,

    /// Registration config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Mask image on the fixed grid; forces are computed where it is positive
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Image gradient driving the forces
    #[arg(long, value_enum, default_value = "warped")]
    pub gradient: GradientArg,

    /// Intensity difference treated as a match
    #[arg(long, default_value_t = DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD)]
    pub threshold: f64,

    /// Base time step of the force term
    #[arg(long, default_value_t = DEFAULT_TIME_STEP)]
    pub time_step: f64,

    /// Number of resolution levels
    #[arg(long, default_value_t = DEFAULT_RESOLUTION_LEVELS)]
    pub levels: usize,

    /// Comma-separated iterations per level, coarsest first
    #[arg(long)]
    pub iterations: Option<String>,

    /// Stop a level once the RMS change drops below this value
    #[arg(long)]
    pub rms_threshold: Option<f64>,

    /// Pixel spacing along x
    #[arg(long, default_value = "1.0")]
    pub spacing_x: f64,

    /// Pixel spacing along y
    #[arg(long, default_value = "1.0")]
    pub spacing_y: f64,

    /// Log every n-th iteration (with --verbose)
    #[arg(long, default_value_t = DEFAULT_LOG_INTERVAL)]
    pub log_interval: usize,

    /// Also write the displacement magnitude image
    #[arg(long)]
    pub field_output: Option<PathBuf>,

    /// Output file path for the warped moving image
    #[arg(short, long, default_value = "warped.tiff")]
    pub output: PathBuf,
}

pub fn run(args: &RegisterArgs, verbose: bool) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let config: RegistrationConfig =
            toml::from_str(&contents).context("Invalid registration config")?;
        debug!(path = %config_path.display(), "Loaded registration config");
        config
    } else {
        build_config_from_args(args)?
    };

    print_registration_summary(&config);

    let mut observers = RunObservers::default();
    let pb = if verbose {
        None
    } else {
        let pb = ProgressBar::new(config.schedule.iterations_for_level(0) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:36} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        observers.solver.push(Box::new(ProgressObserver { pb: pb.clone() }));
        Some(pb)
    };

    let output = run_registration(&config, observers).context("Registration failed")?;

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }
    print_registration_result(&config, &output);

    Ok(())
}

fn build_config_from_args(args: &RegisterArgs) -> Result<RegistrationConfig> {
    let (Some(fixed), Some(moving)) = (&args.fixed, &args.moving) else {
        bail!("Fixed and moving images are required unless --config is given");
    };

    let iterations = match args.iterations {
        Some(ref list) => {
            let parsed: Vec<usize> = list
                .split(',')
                .map(|s| s.trim().parse::<usize>())
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Invalid iteration list '{list}'"))?;
            if parsed.is_empty() {
                bail!("Iteration list must not be empty");
            }
            parsed
        }
        None => vec![DEFAULT_ITERATIONS_PER_LEVEL],
    };

    Ok(RegistrationConfig {
        fixed: fixed.clone(),
        moving: moving.clone(),
        output: args.output.clone(),
        mask: args.mask.clone(),
        field_output: args.field_output.clone(),
        spacing: Spacing::new(args.spacing_x, args.spacing_y),
        force: ForceConfig {
            gradient_type: (&args.gradient).into(),
            intensity_difference_threshold: args.threshold,
            time_step: args.time_step,
        },
        schedule: MultiResolutionConfig {
            levels: args.levels,
            iterations,
            rms_change_threshold: args.rms_threshold,
        },
        log_interval: args.log_interval,
    })
}

/// Drives a progress bar from solver events.
struct ProgressObserver {
    pb: ProgressBar,
}

impl Observer for ProgressObserver {
    fn observe(&mut self, event: &Event<'_>) -> CoreResult<Option<Action>> {
        let Emitter::Solver(state) = event.emitter else {
            return Ok(None);
        };
        match event.kind {
            EventKind::Initialize => {
                self.pb.set_length(state.number_of_iterations() as u64);
                self.pb.set_position(0);
                self.pb.set_message(format!("Level {}", state.level()));
            }
            EventKind::Iteration => {
                self.pb.set_position(state.elapsed_iterations() as u64);
                self.pb.set_message(format!(
                    "Level {} metric {:.6}",
                    state.level(),
                    state.metric()
                ));
            }
            EventKind::ResolutionLevelChanged => {}
        }
        Ok(None)
    }
}
