//! The execution driver.
//!
//! An [`Execution`] carries one action through the init, will, do and finally
//! phases. It is a cheap, cloneable handle: phase hooks and outside listeners
//! hold clones and use them to complete, reject or inspect the execution.
//!
//! The shared state sits behind a mutex that is never held while a hook runs,
//! so hooks may freely call back into the execution.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::action::{Action, Phases};
use crate::error::{ActionError, UsageError};
use crate::reason::{classify, Reason};
use crate::state::{ExecutionState, Phase, PhaseTiming, Rejection};

/// The settled value of an execution: its result on success, its error on
/// rejection.
pub type Outcome<R> = Result<Option<R>, ActionError>;

// ============================================================================
// Execution Id
// ============================================================================

/// Unique identifier for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Create a new random execution ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Completion Future
// ============================================================================

/// Resolves once the execution it was taken from finishes.
///
/// Every call to [`Execution::future`] returns a clone of the same
/// underlying future; all clones observe the same outcome.
pub struct ExecutionFuture<R> {
    inner: Shared<BoxFuture<'static, Outcome<R>>>,
}

impl<R> ExecutionFuture<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn ready(outcome: Outcome<R>) -> Self {
        Self {
            inner: future::ready(outcome).boxed().shared(),
        }
    }

    fn pending(rx: oneshot::Receiver<Outcome<R>>) -> Self {
        let fut = async move {
            rx.await.unwrap_or_else(|_| {
                Err(ActionError::operation_invalid(
                    "The execution was dropped before it finished",
                ))
            })
        };
        Self {
            inner: fut.boxed().shared(),
        }
    }

    /// Returns `true` if both handles refer to the same future.
    ///
    /// A handle that already yielded its output no longer compares equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// The outcome, if already available.
    pub fn peek(&self) -> Option<&Outcome<R>> {
        self.inner.peek()
    }
}

impl<R> Clone for ExecutionFuture<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> Future for ExecutionFuture<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A serializable view of an execution, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// The execution ID.
    pub id: ExecutionId,
    /// Current state.
    pub state: ExecutionState,
    /// Whether the finally phase completed.
    pub finished: bool,
    /// Message of the rejection error, if rejected.
    pub error: Option<String>,
    /// Timing of each phase entered so far.
    pub timings: Vec<PhaseTiming>,
}

// ============================================================================
// Shared State
// ============================================================================

struct Core<A, R> {
    state: ExecutionState,
    /// Set once the finally hook returned. Never unset.
    finished: bool,
    /// Set when the finally phase starts, so it runs at most once.
    finalizing: bool,
    /// An entry point is advancing phases.
    in_call: bool,
    /// An asynchronous do chain is in flight.
    driving: bool,
    action: Arc<A>,
    result: Option<R>,
    error: Option<ActionError>,
    future: Option<ExecutionFuture<R>>,
    settle_tx: Option<oneshot::Sender<Outcome<R>>>,
    timings: Vec<PhaseTiming>,
}

impl<A, R: Clone> Core<A, R> {
    fn outcome(&self) -> Outcome<R> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.result.clone()),
        }
    }

    fn start_timing(&mut self, phase: Phase) {
        self.complete_timing();
        self.timings.push(PhaseTiming::new(phase));
    }

    fn complete_timing(&mut self) {
        if let Some(timing) = self.timings.last_mut() {
            if timing.completed_at.is_none() {
                timing.complete();
            }
        }
    }
}

/// Resets the reentrancy guard when an entry point returns, even by unwinding.
struct CallGuard<'a, A, R> {
    core: &'a Mutex<Core<A, R>>,
}

impl<A, R> Drop for CallGuard<'_, A, R> {
    fn drop(&mut self) {
        self.core.lock().in_call = false;
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Drives one action through its phases.
///
/// # Type Parameters
/// - `A`: The action being executed
/// - `H`: The phase hooks, whose `Output` is the result type
pub struct Execution<A, H>
where
    A: Action,
    H: Phases<A>,
{
    id: ExecutionId,
    core: Arc<Mutex<Core<A, H::Output>>>,
    hooks: Arc<H>,
}

impl<A, H> Clone for Execution<A, H>
where
    A: Action,
    H: Phases<A>,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            core: Arc::clone(&self.core),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<A, H> std::fmt::Debug for Execution<A, H>
where
    A: Action,
    H: Phases<A>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("state", &core.state)
            .field("finished", &core.finished)
            .finish()
    }
}

impl<A, H> Execution<A, H>
where
    A: Action,
    H: Phases<A>,
{
    /// Create an unstarted execution of `action`.
    pub fn new(action: A, hooks: H) -> Self {
        Self {
            id: ExecutionId::new(),
            core: Arc::new(Mutex::new(Core {
                state: ExecutionState::Unstarted,
                finished: false,
                finalizing: false,
                in_call: false,
                driving: false,
                action: Arc::new(action),
                result: None,
                error: None,
                future: None,
                settle_tx: None,
                timings: Vec::new(),
            })),
            hooks: Arc::new(hooks),
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// The execution ID.
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// The hooks this execution runs.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        self.core.lock().state
    }

    /// `execute` has not been called yet.
    pub fn is_unstarted(&self) -> bool {
        self.state() == ExecutionState::Unstarted
    }

    /// In the init, will or do phase.
    pub fn is_executing(&self) -> bool {
        self.state().is_executing()
    }

    /// Completed or rejected.
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// Canceled or failed.
    pub fn is_rejected(&self) -> bool {
        self.state().is_rejected()
    }

    /// Rejected with a user-facing cancellation.
    pub fn is_canceled(&self) -> bool {
        self.state() == ExecutionState::Canceled
    }

    /// Rejected with an unexpected failure.
    pub fn is_failed(&self) -> bool {
        self.state() == ExecutionState::Failed
    }

    /// Completed successfully.
    pub fn is_done(&self) -> bool {
        self.state() == ExecutionState::Did
    }

    /// The finally phase ran.
    pub fn is_finished(&self) -> bool {
        self.core.lock().finished
    }

    /// The success result, if completed with one.
    pub fn result(&self) -> Option<H::Output> {
        self.core.lock().result.clone()
    }

    /// The rejection error, if rejected.
    pub fn error(&self) -> Option<ActionError> {
        self.core.lock().error.clone()
    }

    /// A read-only snapshot of the action.
    pub fn action(&self) -> Arc<A> {
        Arc::clone(&self.core.lock().action)
    }

    /// Modify the action.
    ///
    /// Only allowed before the will phase; afterwards the action is sealed.
    /// Snapshots taken earlier through [`Execution::action`] are not affected.
    /// `f` runs under the execution's lock and must not call back into it.
    pub fn update_action<T>(&self, f: impl FnOnce(&mut A) -> T) -> Result<T, UsageError>
    where
        A: Clone,
    {
        let mut core = self.core.lock();
        if core.state >= ExecutionState::Will {
            return Err(UsageError::ActionSealed);
        }
        Ok(f(Arc::make_mut(&mut core.action)))
    }

    /// Timing of each phase entered so far.
    pub fn timings(&self) -> Vec<PhaseTiming> {
        self.core.lock().timings.clone()
    }

    /// A serializable view of the execution.
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let core = self.core.lock();
        ExecutionSnapshot {
            id: self.id,
            state: core.state,
            finished: core.finished,
            error: core.error.as_ref().map(|e| e.message().to_owned()),
            timings: core.timings.clone(),
        }
    }

    /// The completion future.
    ///
    /// Created on first call; later calls return the same future. It resolves
    /// when the execution finishes, or immediately if it already has.
    pub fn future(&self) -> ExecutionFuture<H::Output> {
        let mut core = self.core.lock();
        if let Some(existing) = &core.future {
            return existing.clone();
        }

        let created = if core.finished {
            ExecutionFuture::ready(core.outcome())
        } else {
            let (tx, rx) = oneshot::channel();
            core.settle_tx = Some(tx);
            ExecutionFuture::pending(rx)
        };
        core.future = Some(created.clone());
        created
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Run the execution to completion.
    ///
    /// Synchronous actions are fully driven before this returns. Asynchronous
    /// actions run init and will here, then continue on the current tokio
    /// runtime; await [`Execution::future`] to observe the outcome.
    ///
    /// Hook errors never surface here: they reject the execution.
    pub fn execute(&self) -> Result<Self, UsageError> {
        let guard = self.enter("execute")?;

        if A::IS_SYNC {
            self.run_sync();
        } else {
            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| UsageError::NoRuntime)?;
            self.run_async(&runtime);
        }

        self.leave(guard);
        Ok(self.clone())
    }

    /// Run only the init and will phases.
    ///
    /// Lets a caller inspect, or cancel, the execution before committing to
    /// the do phase with a later call to [`Execution::execute`]. If the will
    /// phase rejected, the finally phase runs before this returns.
    pub fn execute_will(&self) -> Result<Self, UsageError> {
        let guard = self.enter("execute_will")?;

        if let Err(err) = self.phase_init().and_then(|()| self.phase_will()) {
            self.reject_or_log(err);
        }

        self.leave(guard);
        Ok(self.clone())
    }

    /// Complete successfully with `result`.
    ///
    /// Only allowed during the do phase.
    pub fn done(&self, result: impl Into<Option<H::Output>>) -> Result<(), UsageError> {
        let mut core = self.core.lock();
        if core.state != ExecutionState::Do {
            return Err(UsageError::InvalidState {
                operation: "done",
                state: core.state,
            });
        }

        core.state = ExecutionState::Did;
        core.result = result.into();
        core.error = None;
        drop(core);

        #[cfg(feature = "tracing")]
        tracing::info!(execution = %self.id, "execution.done");

        Ok(())
    }

    /// Reject the execution.
    ///
    /// The reason decides whether it ends canceled or failed; see
    /// [`classify`]. Only allowed while unsettled, except that rejecting
    /// again with the very error already recorded is a no-op.
    ///
    /// When no phase is being driven (the execution was never started, or
    /// was parked by [`Execution::execute_will`]), the finally phase runs
    /// before this returns. Otherwise the running driver gets to it.
    pub fn reject(&self, reason: impl Into<Reason>) -> Result<(), UsageError> {
        let (error, rejection) = classify(reason.into());
        match self.apply_rejection(error.clone(), rejection) {
            Ok(()) => Ok(()),
            Err(current) if current.as_ref().is_some_and(|e| e.ptr_eq(&error)) => Ok(()),
            Err(_) => Err(UsageError::InvalidState {
                operation: "reject",
                state: self.state(),
            }),
        }
    }

    /// Reject the execution, or log the reason if it already settled.
    ///
    /// The outcome of a settled execution never changes. A reason that is
    /// the very error already recorded is dropped silently.
    pub fn reject_or_log(&self, reason: impl Into<Reason>) {
        let (error, rejection) = classify(reason.into());
        if let Err(current) = self.apply_rejection(error.clone(), rejection) {
            if current.as_ref().is_some_and(|e| e.ptr_eq(&error)) {
                return;
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(
                execution = %self.id,
                state = %self.state(),
                error = %error,
                "execution.reject_ignored"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------------

    fn enter(&self, operation: &'static str) -> Result<CallGuard<'_, A, H::Output>, UsageError> {
        let mut core = self.core.lock();
        if core.in_call {
            return Err(UsageError::Reentrant { operation });
        }
        if core.state > ExecutionState::Will {
            return Err(UsageError::InvalidState {
                operation,
                state: core.state,
            });
        }
        core.in_call = true;
        Ok(CallGuard { core: &self.core })
    }

    /// Release the call guard, then run the finally phase if the execution
    /// settled and no async chain still owns it.
    ///
    /// A `reject` from another handle that lands while the guard is held
    /// leaves finally to the driver, so the guard must be gone before the
    /// settled check.
    fn leave(&self, guard: CallGuard<'_, A, H::Output>) {
        drop(guard);
        self.phase_finally();
    }

    /// Record a rejection if still unsettled. On failure returns the error
    /// already recorded.
    fn apply_rejection(
        &self,
        error: ActionError,
        rejection: Rejection,
    ) -> Result<(), Option<ActionError>> {
        let run_finally = {
            let mut core = self.core.lock();
            if !core.state.is_executing_unsettled() {
                return Err(core.error.clone());
            }
            core.state = rejection.into();
            core.result = None;
            core.error = Some(error.clone());
            !(core.in_call || core.driving)
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            execution = %self.id,
            outcome = ?rejection,
            error = %error,
            "execution.reject"
        );

        if run_finally {
            self.phase_finally();
        }
        Ok(())
    }

    /// Move from `from` to `to`. Returns `false` if not in `from`.
    fn begin_phase(&self, from: ExecutionState, to: ExecutionState) -> bool {
        let mut core = self.core.lock();
        if core.state != from {
            return false;
        }
        core.state = to;
        if let Some(phase) = to.phase() {
            core.start_timing(phase);
        }
        drop(core);

        #[cfg(feature = "tracing")]
        tracing::info!(execution = %self.id, phase = to.as_str(), "phase.start");

        true
    }

    /// Settle with no result if nothing settled the do phase.
    fn complete_unsettled(&self) {
        let mut core = self.core.lock();
        if core.state == ExecutionState::Do {
            core.state = ExecutionState::Did;
            core.result = None;
            core.error = None;
        }
    }

    fn phase_init(&self) -> Result<(), ActionError> {
        if !self.begin_phase(ExecutionState::Unstarted, ExecutionState::Init) {
            return Ok(());
        }
        self.hooks.on_init(self)
    }

    fn phase_will(&self) -> Result<(), ActionError> {
        let action = {
            let core = self.core.lock();
            if core.state != ExecutionState::Init {
                return Ok(());
            }
            Arc::clone(&core.action)
        };

        if let Some(first) = action.validate().into_iter().next() {
            #[cfg(feature = "tracing")]
            tracing::warn!(execution = %self.id, error = %first, "execution.invalid");

            self.reject_or_log(first);
            return Ok(());
        }

        if !self.begin_phase(ExecutionState::Init, ExecutionState::Will) {
            return Ok(());
        }
        self.hooks.on_will(self)
    }

    fn phase_do_sync(&self) -> Result<(), ActionError> {
        if !self.begin_phase(ExecutionState::Will, ExecutionState::Do) {
            return Ok(());
        }

        // Pending computations are meaningless to synchronous actions.
        let _ = self.hooks.on_do(self)?;
        if self.state().is_executing_unsettled() {
            let _ = self.hooks.on_default(self)?;
        }

        self.complete_unsettled();
        Ok(())
    }

    async fn phase_do_async(&self) -> Result<(), ActionError> {
        if !self.begin_phase(ExecutionState::Will, ExecutionState::Do) {
            return Ok(());
        }

        if let Some(pending) = self.hooks.on_do(self)? {
            if self.state().is_executing_unsettled() {
                pending.await?;
            }
        }

        if self.state().is_executing_unsettled() {
            if let Some(pending) = self.hooks.on_default(self)? {
                pending.await?;
            }
        }

        self.complete_unsettled();
        Ok(())
    }

    fn phase_finally(&self) {
        {
            let mut core = self.core.lock();
            if core.finalizing || core.driving || !core.state.is_settled() {
                return;
            }
            core.finalizing = true;
            core.start_timing(Phase::Finally);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(execution = %self.id, phase = "finally", "phase.start");

        if let Err(_err) = self.hooks.on_finally(self) {
            #[cfg(feature = "tracing")]
            tracing::error!(execution = %self.id, error = %_err, "execution.finally_error");
        }

        let (tx, outcome) = {
            let mut core = self.core.lock();
            core.finished = true;
            core.complete_timing();

            #[cfg(feature = "tracing")]
            tracing::info!(
                execution = %self.id,
                outcome = core.state.as_str(),
                "execution.finished"
            );

            (core.settle_tx.take(), core.outcome())
        };

        if let Some(tx) = tx {
            // The receiver lives in the cached future, so this only fails once
            // every handle is gone.
            let _ = tx.send(outcome);
        }
    }

    fn run_sync(&self) {
        let phases = self
            .phase_init()
            .and_then(|()| self.phase_will())
            .and_then(|()| self.phase_do_sync());
        if let Err(err) = phases {
            self.reject_or_log(err);
        }
    }

    fn run_async(&self, runtime: &tokio::runtime::Handle) {
        if let Err(err) = self.phase_init().and_then(|()| self.phase_will()) {
            self.reject_or_log(err);
        }

        let spawn = {
            let mut core = self.core.lock();
            core.driving = core.state == ExecutionState::Will;
            core.driving
        };

        if !spawn {
            return;
        }

        let execution = self.clone();
        runtime.spawn(async move {
            let chain = AssertUnwindSafe(execution.phase_do_async()).catch_unwind();
            match chain.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => execution.reject_or_log(err),
                Err(payload) => {
                    let message = panic_payload_to_string(&payload);

                    #[cfg(feature = "tracing")]
                    tracing::error!(execution = %execution.id, panic = %message, "execution.panic");

                    execution.reject_or_log(ActionError::other(format!(
                        "Do phase panicked: {message}"
                    )));
                }
            }
            execution.core.lock().driving = false;
            execution.phase_finally();
        });
    }
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
