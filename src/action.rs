//! Action and phase hook traits.
//!
//! An [`Action`] describes *what* to do: it can validate itself and says
//! whether it runs synchronously. A [`Phases`] implementation describes *how*
//! an execution of it behaves at each phase.

use futures_util::future::BoxFuture;

use crate::error::ActionError;
use crate::execution::Execution;

/// A pending computation returned by [`Phases::on_do`] or
/// [`Phases::on_default`].
pub type Pending = BoxFuture<'static, Result<(), ActionError>>;

/// A described operation, independent of how it executes.
pub trait Action: Send + Sync + 'static {
    /// Whether executions of this action type run synchronously.
    ///
    /// Synchronous executions run all phases inside `execute`. Asynchronous
    /// ones suspend at the pending computations returned by the do hooks.
    const IS_SYNC: bool = true;

    /// Check the action before it is committed to.
    ///
    /// An empty list means the action is valid. The first error rejects the
    /// execution.
    fn validate(&self) -> Vec<ActionError> {
        Vec::new()
    }
}

/// Hooks run by an [`Execution`] at each phase.
///
/// Every hook receives the execution handle, so it can call
/// [`Execution::done`] or [`Execution::reject`], or inspect the action.
/// Errors returned by `on_init`, `on_will`, `on_do` and `on_default` reject
/// the execution. Errors returned by `on_finally` are only logged.
///
/// # Type Parameters
/// - `A`: The action type being executed
pub trait Phases<A: Action>: Send + Sync + Sized + 'static {
    /// The value an execution completes with.
    type Output: Clone + Send + Sync + 'static;

    /// Runs first. The action can still be modified.
    fn on_init(&self, _execution: &Execution<A, Self>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Runs after the action validated and was sealed.
    fn on_will(&self, _execution: &Execution<A, Self>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Does the work.
    ///
    /// Asynchronous actions may return a pending computation, which is
    /// awaited before moving on. Synchronous actions ignore it.
    fn on_do(&self, _execution: &Execution<A, Self>) -> Result<Option<Pending>, ActionError> {
        Ok(None)
    }

    /// Default completion, run when the execution is still unsettled after
    /// [`Phases::on_do`].
    ///
    /// If this too leaves the execution unsettled, it completes with no
    /// result.
    fn on_default(&self, _execution: &Execution<A, Self>) -> Result<Option<Pending>, ActionError> {
        Ok(None)
    }

    /// Runs once the execution settled, however it settled.
    fn on_finally(&self, _execution: &Execution<A, Self>) -> Result<(), ActionError> {
        Ok(())
    }
}
