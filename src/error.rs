//! Error types.
//!
//! [`ActionError`] is what an execution is rejected with; it ends up in
//! [`Execution::error`](crate::Execution::error) and in the completion future.
//! [`UsageError`] is returned synchronously when an execution is driven the
//! wrong way and never changes the execution's outcome.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::ExecutionState;

/// Message used for rejections that carry no reason.
pub const CANCELED_MESSAGE: &str = "Canceled";

// ============================================================================
// Action Error
// ============================================================================

/// What kind of error an [`ActionError`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// User-facing error. Rejecting with one cancels, unless it is also
    /// marked as a runtime error.
    User,
    /// An argument had an invalid value.
    ArgumentInvalid,
    /// An operation was attempted in an invalid state.
    OperationInvalid,
    /// Anything else, including wrapped foreign errors.
    Other,
}

#[derive(Debug, Clone)]
struct Inner {
    kind: ErrorKind,
    message: String,
    runtime: bool,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

/// An action-domain error.
///
/// Clones share the same allocation, so [`ActionError::ptr_eq`] tells whether
/// two values are the very same error.
#[derive(Debug, Clone)]
pub struct ActionError(Arc<Inner>);

impl ActionError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self(Arc::new(Inner {
            kind,
            message: message.into(),
            runtime: false,
            source: None,
        }))
    }

    /// A user-facing error.
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User, message)
    }

    /// The generic cancellation error.
    pub fn canceled() -> Self {
        Self::user(CANCELED_MESSAGE)
    }

    /// An invalid argument error naming the offending argument.
    pub fn argument_invalid(name: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ArgumentInvalid,
            format!("Argument '{name}' is invalid: {reason}"),
        )
    }

    /// An invalid operation error.
    pub fn operation_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationInvalid, message)
    }

    /// A plain internal error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    /// Wrap a foreign error. The message is taken from its `Display`.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(Inner {
            kind: ErrorKind::Other,
            message: err.to_string(),
            runtime: false,
            source: Some(Arc::new(err)),
        }))
    }

    /// Mark this error as a runtime error.
    ///
    /// Runtime errors always fail an execution, even when user-facing.
    pub fn into_runtime(self) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.0);
        inner.runtime = true;
        Self(Arc::new(inner))
    }

    /// Attach an underlying cause.
    pub fn with_source<E>(self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut inner = Arc::unwrap_or_clone(self.0);
        inner.source = Some(Arc::new(source));
        Self(Arc::new(inner))
    }

    /// The kind of error.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// Returns `true` for user-facing errors.
    pub fn is_user_error(&self) -> bool {
        self.0.kind == ErrorKind::User
    }

    /// Returns `true` if marked with [`ActionError::into_runtime`].
    pub fn is_runtime_error(&self) -> bool {
        self.0.runtime
    }

    /// Returns `true` if both values are the same error instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.message)
    }
}

impl StdError for ActionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0
            .source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

// ============================================================================
// Usage Error
// ============================================================================

/// An execution was driven in a way its lifecycle does not allow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// An entry point was called while a phase was being advanced.
    #[error("Cannot call {operation} from within an active phase")]
    Reentrant {
        /// The offending entry point.
        operation: &'static str,
    },

    /// An operation is not allowed in the current state.
    #[error("Cannot call {operation} in state '{state}'")]
    InvalidState {
        /// The offending operation.
        operation: &'static str,
        /// The state at the time of the call.
        state: ExecutionState,
    },

    /// The action was modified after the will phase sealed it.
    #[error("The action is sealed and can no longer be modified")]
    ActionSealed,

    /// An asynchronous action was executed outside a tokio runtime.
    #[error("Asynchronous actions must be executed within a tokio runtime")]
    NoRuntime,
}

impl From<UsageError> for ActionError {
    fn from(err: UsageError) -> Self {
        Self::operation_invalid(err.to_string()).with_source(err)
    }
}
