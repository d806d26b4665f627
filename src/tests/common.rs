//! Common actions and hooks for tests.
//!
//! This module contains:
//! - `Transfer`: A synchronous action, invalid for non-positive amounts
//! - `Rename`: A synchronous action whose validation error is user-facing
//! - `Upload`: An asynchronous action
//! - `Recorder`: Phase hooks that record which phases ran and delegate to
//!   optional closures

use parking_lot::Mutex;

use crate::{Action, ActionError, Execution, Pending, Phase, Phases};

// ============================================================================
// Actions
// ============================================================================

/// Moves money. Synchronous.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub amount: i64,
}

impl Action for Transfer {
    fn validate(&self) -> Vec<ActionError> {
        if self.amount <= 0 {
            vec![
                ActionError::other("Amount must be positive"),
                ActionError::other("Second error is never reported"),
            ]
        } else {
            Vec::new()
        }
    }
}

/// Renames something. Synchronous, with user-facing validation errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub name: String,
}

impl Action for Rename {
    fn validate(&self) -> Vec<ActionError> {
        if self.name.is_empty() {
            vec![ActionError::user("Name is required")]
        } else {
            Vec::new()
        }
    }
}

/// Uploads bytes. Asynchronous.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub bytes: usize,
}

impl Action for Upload {
    const IS_SYNC: bool = false;

    fn validate(&self) -> Vec<ActionError> {
        if self.bytes == 0 {
            vec![ActionError::other("Nothing to upload")]
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// Hooks
// ============================================================================

type Hook<A> = Box<dyn Fn(&Execution<A, Recorder<A>>) -> Result<(), ActionError> + Send + Sync>;

type DoHook<A> =
    Box<dyn Fn(&Execution<A, Recorder<A>>) -> Result<Option<Pending>, ActionError> + Send + Sync>;

/// Phase hooks that record each call.
///
/// `Default` is used for the do-phase default completion hook, so tests can
/// tell it apart from `Do`.
pub struct Recorder<A: Action> {
    calls: Mutex<Vec<Call>>,
    init: Option<Hook<A>>,
    will: Option<Hook<A>>,
    act: Option<DoHook<A>>,
    default: Option<DoHook<A>>,
    finally: Option<Hook<A>>,
}

/// A recorded hook call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Phase(Phase),
    Default,
}

impl<A: Action> Default for Recorder<A> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            init: None,
            will: None,
            act: None,
            default: None,
            finally: None,
        }
    }
}

impl<A: Action> Recorder<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(
        mut self,
        f: impl Fn(&Execution<A, Self>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn with_will(
        mut self,
        f: impl Fn(&Execution<A, Self>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.will = Some(Box::new(f));
        self
    }

    pub fn with_do(
        mut self,
        f: impl Fn(&Execution<A, Self>) -> Result<Option<Pending>, ActionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.act = Some(Box::new(f));
        self
    }

    pub fn with_default(
        mut self,
        f: impl Fn(&Execution<A, Self>) -> Result<Option<Pending>, ActionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.default = Some(Box::new(f));
        self
    }

    pub fn with_finally(
        mut self,
        f: impl Fn(&Execution<A, Self>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.finally = Some(Box::new(f));
        self
    }

    /// Hook calls in the order they happened.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl<A: Action> Phases<A> for Recorder<A> {
    type Output = i64;

    fn on_init(&self, execution: &Execution<A, Self>) -> Result<(), ActionError> {
        self.record(Call::Phase(Phase::Init));
        self.init.as_ref().map_or(Ok(()), |f| f(execution))
    }

    fn on_will(&self, execution: &Execution<A, Self>) -> Result<(), ActionError> {
        self.record(Call::Phase(Phase::Will));
        self.will.as_ref().map_or(Ok(()), |f| f(execution))
    }

    fn on_do(&self, execution: &Execution<A, Self>) -> Result<Option<Pending>, ActionError> {
        self.record(Call::Phase(Phase::Do));
        self.act.as_ref().map_or(Ok(None), |f| f(execution))
    }

    fn on_default(&self, execution: &Execution<A, Self>) -> Result<Option<Pending>, ActionError> {
        self.record(Call::Default);
        self.default.as_ref().map_or(Ok(None), |f| f(execution))
    }

    fn on_finally(&self, execution: &Execution<A, Self>) -> Result<(), ActionError> {
        self.record(Call::Phase(Phase::Finally));
        self.finally.as_ref().map_or(Ok(()), |f| f(execution))
    }
}

/// Every hook call of a plain successful run.
pub const FULL_RUN: [Call; 5] = [
    Call::Phase(Phase::Init),
    Call::Phase(Phase::Will),
    Call::Phase(Phase::Do),
    Call::Default,
    Call::Phase(Phase::Finally),
];

/// Exactly one of done, canceled and failed holds.
pub fn assert_single_outcome<A: Action>(execution: &Execution<A, Recorder<A>>) {
    assert!(execution.is_finished());
    let outcomes = [
        execution.is_done(),
        execution.is_canceled(),
        execution.is_failed(),
    ];
    assert_eq!(outcomes.iter().filter(|o| **o).count(), 1, "{outcomes:?}");
}
