use tracing::{debug, info};

use crate::consts::DEFAULT_LOG_INTERVAL;
use crate::error::Result;

use super::{Action, Emitter, Event, EventKind, Observer};

/// Reference observer printing per-iteration diagnostics and level
/// transitions through `tracing`.
#[derive(Clone, Debug)]
pub struct RegistrationLogger {
    log_interval: usize,
}

impl Default for RegistrationLogger {
    fn default() -> Self {
        Self {
            log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

impl RegistrationLogger {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }

    /// Log every n-th iteration; never zero.
    pub fn log_interval(&self) -> usize {
        self.log_interval
    }

    /// The line the logger prints for `event`, if any.
    pub fn format_event(&self, event: &Event<'_>) -> Option<String> {
        match (event.kind, event.emitter) {
            (EventKind::Iteration | EventKind::ResolutionLevelChanged, Emitter::MultiResolution(mr)) => {
                Some(format!("Finished level {}", mr.elapsed_levels()))
            }
            (EventKind::Iteration, Emitter::Solver(s)) => {
                let n = s.elapsed_iterations();
                let last = n == s.number_of_iterations() || s.stopped_early();
                if n % self.log_interval == 0 || last {
                    Some(format!(
                        "  {} - Metric: {:.6} - RMS-Change: {:.6}",
                        n,
                        s.metric(),
                        s.rms_change()
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Observer for RegistrationLogger {
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>> {
        match (event.kind, event.emitter) {
            (EventKind::Initialize, Emitter::MultiResolution(_)) => {
                // Per-level parameter policy hook; nothing is adjusted here.
            }
            (EventKind::Initialize, Emitter::Solver(s)) => {
                debug!(level = s.level(), iterations = s.number_of_iterations(), "Solver starting");
            }
            _ => {
                if let Some(line) = self.format_event(event) {
                    info!("{}", line);
                }
            }
        }
        Ok(None)
    }
}
