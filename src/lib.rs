#![deny(missing_docs)]

//! Cadence: phase-driven action executions.
//!
//! # Design Goals
//!
//! - **Ordered phases**: every execution runs init, will, do and finally, in
//!   that order, each at most once
//! - **One outcome**: an execution settles exactly once, as done, canceled or
//!   failed, and the outcome never changes afterwards
//! - **Sync or async**: synchronous actions run inline; asynchronous ones
//!   suspend only at the pending computations their do hooks return
//!
//! # Core Concepts
//!
//! - [`Action`]: What to do, with a validity check and a fixed sync flag
//! - [`Phases`]: Hooks run at each phase of an execution
//! - [`Execution`]: The driver, with `done`/`reject` control points and a
//!   shared completion future
//! - [`classify`]: Decides whether a rejection reason cancels or fails
//!
// Modules
pub mod action;
pub mod error;
pub mod execution;
pub mod reason;
pub mod state;

// Re-exports for convenience
pub use action::{Action, Pending, Phases};
pub use error::{ActionError, ErrorKind, UsageError, CANCELED_MESSAGE};
pub use execution::{Execution, ExecutionFuture, ExecutionId, ExecutionSnapshot, Outcome};
pub use reason::{classify, Reason};
pub use state::{ExecutionState, Phase, PhaseTiming, Rejection};

#[cfg(test)]
mod tests;
