use tracing::info;

use crate::error::Result;

use super::{Action, Emitter, Event, EventKind, Observer};

/// Stopping criterion: request an early stop once the RMS change of a solver
/// iteration falls below `threshold` for `patience` consecutive iterations.
#[derive(Clone, Debug)]
pub struct StopOnRmsChange {
    pub threshold: f64,
    pub patience: usize,
    below: usize,
}

impl StopOnRmsChange {
    pub fn new(threshold: f64, patience: usize) -> Self {
        Self {
            threshold,
            patience: patience.max(1),
            below: 0,
        }
    }
}

impl Observer for StopOnRmsChange {
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>> {
        let Emitter::Solver(state) = event.emitter else {
            return Ok(None);
        };
        match event.kind {
            EventKind::Initialize => {
                self.below = 0;
                Ok(None)
            }
            EventKind::Iteration => {
                if state.rms_change() < self.threshold {
                    self.below += 1;
                } else {
                    self.below = 0;
                }
                if self.below >= self.patience {
                    info!(
                        iteration = state.elapsed_iterations(),
                        rms_change = state.rms_change(),
                        "RMS change below {}, stopping level {}",
                        self.threshold,
                        state.level()
                    );
                    return Ok(Some(Action::StopEarly));
                }
                Ok(None)
            }
            EventKind::ResolutionLevelChanged => Ok(None),
        }
    }
}
