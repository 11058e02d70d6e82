use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;

use super::{Action, Emitter, Event, EventKind, Observer};

/// Owned snapshot of one delivered event.
#[derive(Clone, Debug, PartialEq)]
pub enum EventRecord {
    Solver {
        kind: EventKind,
        level: usize,
        iteration: usize,
        metric: f64,
        rms_change: f64,
    },
    MultiResolution {
        kind: EventKind,
        current_level: usize,
        elapsed_levels: usize,
    },
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Solver { kind, .. } | Self::MultiResolution { kind, .. } => *kind,
        }
    }

    fn from_event(event: &Event<'_>) -> Self {
        match event.emitter {
            Emitter::Solver(s) => Self::Solver {
                kind: event.kind,
                level: s.level(),
                iteration: s.elapsed_iterations(),
                metric: s.metric(),
                rms_change: s.rms_change(),
            },
            Emitter::MultiResolution(mr) => Self::MultiResolution {
                kind: event.kind,
                current_level: mr.current_level(),
                elapsed_levels: mr.elapsed_levels(),
            },
        }
    }
}

/// Observer recording every event it receives.
///
/// Clones share the same record, so one history can be subscribed to the
/// solver and to the multi-resolution driver and still keep global order.
#[derive(Clone, Debug, Default)]
pub struct EventHistory {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Observer for EventHistory {
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EventRecord::from_event(event));
        Ok(None)
    }
}
