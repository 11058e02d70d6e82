//! Coarse-to-fine driver running the variational solver on each level of an
//! image pyramid.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{DEFAULT_ITERATIONS_PER_LEVEL, DEFAULT_RESOLUTION_LEVELS};
use crate::error::{RegistrationError, Result};
use crate::events::{Action, Event, EventBus, EventKind, Observer};
use crate::field::DisplacementField;
use crate::function::RegistrationFunction;
use crate::image::Image;
use crate::pyramid::{build_mask_pyramid, build_pyramid};
use crate::solver::{SolverConfig, VariationalSolver};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiResolutionConfig {
    /// Number of resolution levels, including full resolution.
    pub levels: usize,
    /// Iterations per level, coarsest first. Levels past the end of the list
    /// reuse the last entry.
    pub iterations: Vec<usize>,
    /// Per-level early stop on small RMS change.
    #[serde(default)]
    pub rms_change_threshold: Option<f64>,
}

impl Default for MultiResolutionConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_RESOLUTION_LEVELS,
            iterations: vec![DEFAULT_ITERATIONS_PER_LEVEL],
            rms_change_threshold: None,
        }
    }
}

impl MultiResolutionConfig {
    pub fn iterations_for_level(&self, level: usize) -> usize {
        self.iterations
            .get(level)
            .or_else(|| self.iterations.last())
            .copied()
            .unwrap_or(DEFAULT_ITERATIONS_PER_LEVEL)
    }

    fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(RegistrationError::configuration(
                "at least one resolution level is required",
            ));
        }
        if self.iterations.is_empty() {
            return Err(RegistrationError::configuration(
                "iteration schedule must not be empty",
            ));
        }
        Ok(())
    }
}

/// Multi-resolution driver state visible to observers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiResolutionState {
    elapsed_levels: usize,
    current_level: usize,
    number_of_levels: usize,
    level_dim: (usize, usize),
}

impl MultiResolutionState {
    /// Number of fully completed levels.
    pub fn elapsed_levels(&self) -> usize {
        self.elapsed_levels
    }

    /// Level being (or last) processed, 0 = coarsest.
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    pub fn number_of_levels(&self) -> usize {
        self.number_of_levels
    }

    /// Image shape `(h, w)` of the current level.
    pub fn level_dim(&self) -> (usize, usize) {
        self.level_dim
    }

    #[cfg(test)]
    pub(crate) fn for_test(elapsed_levels: usize, current_level: usize, number_of_levels: usize) -> Self {
        Self {
            elapsed_levels,
            current_level,
            number_of_levels,
            level_dim: (0, 0),
        }
    }
}

/// Runs a [`VariationalSolver`] from the coarsest to the finest pyramid level,
/// prolonging the displacement field between levels.
///
/// Emits one `Initialize` event before the first level and one
/// `ResolutionLevelChanged` event after every completed level. The solver's own
/// `Initialize`/`Iteration` events go to observers subscribed on the solver.
#[derive(Debug)]
pub struct MultiResolutionRegistration<F: RegistrationFunction> {
    solver: VariationalSolver<F>,
    config: MultiResolutionConfig,
    state: MultiResolutionState,
    events: EventBus,
}

impl<F: RegistrationFunction> MultiResolutionRegistration<F> {
    pub fn new(function: F, config: MultiResolutionConfig) -> Self {
        let solver_config = SolverConfig {
            number_of_iterations: config.iterations_for_level(0),
            rms_change_threshold: config.rms_change_threshold,
        };
        Self {
            solver: VariationalSolver::new(function, solver_config),
            config,
            state: MultiResolutionState::default(),
            events: EventBus::new(),
        }
    }

    /// Subscribe to level events of this driver.
    pub fn subscribe(&mut self, observer: Box<dyn Observer + Send>) {
        self.events.subscribe(observer);
    }

    /// Subscribe to the per-level solver's events.
    pub fn subscribe_solver(&mut self, observer: Box<dyn Observer + Send>) {
        self.solver.subscribe(observer);
    }

    pub fn solver(&self) -> &VariationalSolver<F> {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut VariationalSolver<F> {
        &mut self.solver
    }

    pub fn config(&self) -> &MultiResolutionConfig {
        &self.config
    }

    pub fn state(&self) -> &MultiResolutionState {
        &self.state
    }

    pub fn elapsed_levels(&self) -> usize {
        self.state.elapsed_levels
    }

    /// Register `moving` onto `fixed`.
    ///
    /// `initial_field`, when given, must be on the full-resolution fixed
    /// grid. Returns the full-resolution displacement field.
    pub fn run(
        &mut self,
        fixed: &Image,
        moving: &Image,
        mask: Option<&Image>,
        initial_field: Option<&DisplacementField>,
    ) -> Result<DisplacementField> {
        self.config.validate()?;
        if let Some(field) = initial_field {
            if field.dim() != fixed.dim() {
                return Err(RegistrationError::ShapeMismatch {
                    what: "initial displacement field",
                    expected: fixed.dim(),
                    actual: field.dim(),
                });
            }
        }

        let levels = self.config.levels;
        let fixed_pyramid = build_pyramid(fixed, levels - 1)?;
        let moving_pyramid = build_pyramid(moving, levels - 1)?;
        let mask_pyramid = mask.map(|m| build_mask_pyramid(m, levels - 1));

        let coarsest = &fixed_pyramid[levels - 1];
        self.state = MultiResolutionState {
            elapsed_levels: 0,
            current_level: 0,
            number_of_levels: levels,
            level_dim: coarsest.dim(),
        };

        info!(levels, width = fixed.width(), height = fixed.height(), "Multi-resolution registration");

        let mut field = match initial_field {
            Some(f) => f.resample(fixed.spacing, coarsest.dim(), coarsest.spacing),
            None => DisplacementField::zeros(coarsest.dim()),
        };

        let mut stop = self.emit(EventKind::Initialize)?;
        let mut field_spacing = coarsest.spacing;

        for level in 0..levels {
            if stop {
                break;
            }
            let index = levels - 1 - level;
            let level_fixed = &fixed_pyramid[index];
            let level_moving = &moving_pyramid[index];

            if level > 0 {
                field = field.resample(field_spacing, level_fixed.dim(), level_fixed.spacing);
            }
            field_spacing = level_fixed.spacing;

            self.state.current_level = level;
            self.state.level_dim = level_fixed.dim();
            info!(
                level,
                width = level_fixed.width(),
                height = level_fixed.height(),
                "Starting resolution level"
            );

            let level_mask = mask_pyramid
                .as_ref()
                .map(|p| Arc::new(p[index].clone()));
            self.solver.function_mut().set_images(
                Arc::new(level_fixed.clone()),
                Arc::new(level_moving.clone()),
                level_mask,
            );
            self.solver.set_level(level);
            self.solver
                .set_number_of_iterations(self.config.iterations_for_level(level));
            self.solver.run(&mut field)?;

            self.state.elapsed_levels = level + 1;
            stop = self.emit(EventKind::ResolutionLevelChanged)?;
        }

        if field.dim() != fixed.dim() {
            field = field.resample(field_spacing, fixed.dim(), fixed.spacing);
        }
        Ok(field)
    }

    fn emit(&mut self, kind: EventKind) -> Result<bool> {
        let actions = self
            .events
            .notify(&Event::multi_resolution(kind, &self.state))?;
        let mut stop = false;
        for action in actions {
            match action {
                Action::StopEarly => stop = true,
                Action::Reconfigure(params) => self.solver.function_mut().reconfigure(&params),
            }
        }
        Ok(stop)
    }
}
