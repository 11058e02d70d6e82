//! Finite-difference solver loop for one resolution level.
//!
//! Per iteration:
//! 1. `initialize_iteration` on the functional (sequential)
//! 2. `compute_update` for every interior pixel, rows in parallel, each
//!    worker folding into its own [`GlobalData`]
//! 3. reduction of the worker accumulators, `compute_global_time_step`
//! 4. field update, then an `Iteration` event
//!
//! Pixels within `NEIGHBORHOOD_RADIUS` of the border are never passed to the
//! functional and keep their displacement.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{DEFAULT_ITERATIONS_PER_LEVEL, NEIGHBORHOOD_RADIUS, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{RegistrationError, Result};
use crate::events::{Action, Event, EventBus, EventKind, Observer};
use crate::field::{Displacement, DisplacementField};
use crate::function::{GlobalData, RegistrationFunction};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum number of iterations per run.
    pub number_of_iterations: usize,
    /// Stop once an iteration's RMS change drops below this value.
    #[serde(default)]
    pub rms_change_threshold: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            number_of_iterations: DEFAULT_ITERATIONS_PER_LEVEL,
            rms_change_threshold: None,
        }
    }
}

/// Solver state visible to observers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolverState {
    level: usize,
    elapsed_iterations: usize,
    number_of_iterations: usize,
    metric: f64,
    rms_change: f64,
    time_step: f64,
    stopped_early: bool,
}

impl SolverState {
    /// Resolution level this run belongs to (0 when run standalone).
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn elapsed_iterations(&self) -> usize {
        self.elapsed_iterations
    }

    pub fn number_of_iterations(&self) -> usize {
        self.number_of_iterations
    }

    /// Mean squared intensity difference of the last iteration.
    pub fn metric(&self) -> f64 {
        self.metric
    }

    /// RMS length of the last iteration's updates.
    pub fn rms_change(&self) -> f64 {
        self.rms_change
    }

    /// Global time step reported by the functional for the last iteration.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        level: usize,
        elapsed_iterations: usize,
        number_of_iterations: usize,
        metric: f64,
        rms_change: f64,
    ) -> Self {
        Self {
            level,
            elapsed_iterations,
            number_of_iterations,
            metric,
            rms_change,
            ..Default::default()
        }
    }
}

/// Drives a [`RegistrationFunction`] over a displacement field.
#[derive(Debug)]
pub struct VariationalSolver<F: RegistrationFunction> {
    function: F,
    config: SolverConfig,
    level: usize,
    state: SolverState,
    events: EventBus,
}

impl<F: RegistrationFunction> VariationalSolver<F> {
    pub fn new(function: F, config: SolverConfig) -> Self {
        Self {
            function,
            config,
            level: 0,
            state: SolverState::default(),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer + Send>) {
        self.events.subscribe(observer);
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    pub fn function_mut(&mut self) -> &mut F {
        &mut self.function
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_number_of_iterations(&mut self, n: usize) {
        self.config.number_of_iterations = n;
    }

    pub(crate) fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    pub fn state(&self) -> &SolverState {
        &self.state
    }

    pub fn elapsed_iterations(&self) -> usize {
        self.state.elapsed_iterations
    }

    pub fn metric(&self) -> f64 {
        self.state.metric
    }

    pub fn rms_change(&self) -> f64 {
        self.state.rms_change
    }

    /// Run up to `number_of_iterations` iterations, updating `field` in place.
    ///
    /// Emits one `Initialize` event followed by one `Iteration` event per
    /// completed iteration.
    pub fn run(&mut self, field: &mut DisplacementField) -> Result<()> {
        let (h, w) = field.dim();
        let min_side = 2 * NEIGHBORHOOD_RADIUS + 1;
        if h < min_side || w < min_side {
            return Err(RegistrationError::configuration(format!(
                "field of {w}x{h} has no interior pixels"
            )));
        }

        self.state = SolverState {
            level: self.level,
            number_of_iterations: self.config.number_of_iterations,
            ..Default::default()
        };

        let mut stop = self.emit(EventKind::Initialize)?;

        while !stop && self.state.elapsed_iterations < self.config.number_of_iterations {
            self.function.initialize_iteration(field)?;

            let (updates, global) = compute_updates(&self.function, field);
            let time_step = self.function.compute_global_time_step(&global);

            for (row, values) in updates {
                for (i, u) in values.into_iter().enumerate() {
                    let col = NEIGHBORHOOD_RADIUS + i;
                    field.x[[row, col]] += u.x;
                    field.y[[row, col]] += u.y;
                }
            }

            self.state.elapsed_iterations += 1;
            self.state.metric = global.metric();
            self.state.rms_change = global.rms_change();
            self.state.time_step = time_step;

            if let Some(threshold) = self.config.rms_change_threshold {
                if self.state.rms_change < threshold {
                    self.state.stopped_early = true;
                }
            }

            stop = self.emit(EventKind::Iteration)? || self.state.stopped_early;
        }

        info!(
            level = self.state.level,
            iterations = self.state.elapsed_iterations,
            metric = self.state.metric,
            rms_change = self.state.rms_change,
            "Solver finished"
        );
        Ok(())
    }

    /// Notify observers and apply their actions. Returns true on a stop request.
    fn emit(&mut self, kind: EventKind) -> Result<bool> {
        let actions = self.events.notify(&Event::solver(kind, &self.state))?;
        let mut stop = false;
        for action in actions {
            match action {
                Action::StopEarly => {
                    debug!(iteration = self.state.elapsed_iterations, "Observer requested stop");
                    self.state.stopped_early = true;
                    stop = true;
                }
                Action::Reconfigure(params) => self.function.reconfigure(&params),
            }
        }
        Ok(stop)
    }
}

/// One update vector per interior pixel, grouped by row, plus the reduced
/// accumulator.
fn compute_updates<F: RegistrationFunction>(
    function: &F,
    field: &DisplacementField,
) -> (Vec<(usize, Vec<Displacement>)>, GlobalData) {
    let (h, w) = field.dim();
    let r = NEIGHBORHOOD_RADIUS;
    let rows = r..h - r;

    let compute_row = |row: usize, global: &mut GlobalData| -> Vec<Displacement> {
        (r..w - r)
            .map(|col| {
                let neighborhood = field.neighborhood(row, col);
                function.compute_update(&neighborhood, global, Displacement::ZERO)
            })
            .collect()
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        rows.into_par_iter()
            .fold(
                || (Vec::new(), GlobalData::default()),
                |(mut out, mut global), row| {
                    let values = compute_row(row, &mut global);
                    out.push((row, values));
                    (out, global)
                },
            )
            .reduce(
                || (Vec::new(), GlobalData::default()),
                |(mut a, ga), (b, gb)| {
                    a.extend(b);
                    (a, ga.merge(gb))
                },
            )
    } else {
        let mut global = GlobalData::default();
        let out: Vec<_> = rows
            .map(|row| (row, compute_row(row, &mut global)))
            .collect();
        (out, global)
    }
}
