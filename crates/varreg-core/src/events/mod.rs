//! Lifecycle events emitted by the registration drivers.
//!
//! Both the per-level [`VariationalSolver`](crate::solver::VariationalSolver)
//! and the [`MultiResolutionRegistration`](crate::multires::MultiResolutionRegistration)
//! driver own an [`EventBus`]. Events are delivered synchronously, in
//! subscription order, strictly between iterations. The emitter is carried as
//! a tagged [`Emitter`] so observers can read the state of whichever driver
//! sent the event.
//!
//! Observers steer a run only through the [`Action`] they return; actions are
//! applied by the driver after delivery of the current event has finished.

pub mod history;
pub mod logger;
pub mod stopping;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::function::ForceParameters;
use crate::multires::MultiResolutionState;
use crate::solver::SolverState;

pub use history::{EventHistory, EventRecord};
pub use logger::RegistrationLogger;
pub use stopping::StopOnRmsChange;

/// Kind of lifecycle milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A driver is about to start its run.
    Initialize,
    /// The solver finished one iteration.
    Iteration,
    /// The multi-resolution driver finished a level.
    ResolutionLevelChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "Initialize"),
            Self::Iteration => write!(f, "Iteration"),
            Self::ResolutionLevelChanged => write!(f, "ResolutionLevelChanged"),
        }
    }
}

/// Read-only view of the driver that emitted an event.
#[derive(Clone, Copy, Debug)]
pub enum Emitter<'a> {
    Solver(&'a SolverState),
    MultiResolution(&'a MultiResolutionState),
}

#[derive(Clone, Copy, Debug)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub emitter: Emitter<'a>,
}

impl<'a> Event<'a> {
    pub fn solver(kind: EventKind, state: &'a SolverState) -> Self {
        Self {
            kind,
            emitter: Emitter::Solver(state),
        }
    }

    pub fn multi_resolution(kind: EventKind, state: &'a MultiResolutionState) -> Self {
        Self {
            kind,
            emitter: Emitter::MultiResolution(state),
        }
    }
}

/// Control request returned by an observer.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Stop before the next iteration (or, from the multi-resolution driver,
    /// before the next level).
    StopEarly,
    /// Change force parameters before the next iteration or level.
    Reconfigure(ForceParameters),
}

/// Receives driver events.
///
/// Returning `Ok(Some(action))` requests a control action; an `Err` aborts
/// delivery of the event to later observers and ends the run with that error.
pub trait Observer {
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>>;
}

impl<F> Observer for F
where
    F: FnMut(&Event<'_>) -> Result<Option<Action>>,
{
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>> {
        self(event)
    }
}

/// Handle letting one observer subscribe to several drivers.
///
/// Clones forward to the same inner observer.
#[derive(Debug, Default)]
pub struct SharedObserver<O> {
    inner: Arc<Mutex<O>>,
}

impl<O> SharedObserver<O> {
    pub fn new(observer: O) -> Self {
        Self {
            inner: Arc::new(Mutex::new(observer)),
        }
    }

    /// Run `f` with exclusive access to the inner observer.
    pub fn with<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<O> Clone for SharedObserver<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Observer> Observer for SharedObserver<O> {
    fn observe(&mut self, event: &Event<'_>) -> Result<Option<Action>> {
        self.with(|observer| observer.observe(event))
    }
}

/// Ordered list of observers owned by one driver.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn Observer + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer after all existing ones.
    pub fn subscribe(&mut self, observer: Box<dyn Observer + Send>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer in subscription order.
    ///
    /// Returns the requested actions in the same order. The first observer
    /// error stops delivery and is returned as is.
    pub fn notify(&mut self, event: &Event<'_>) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for observer in &mut self.observers {
            if let Some(action) = observer.observe(event)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
