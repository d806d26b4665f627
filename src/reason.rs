//! Rejection reasons and their classification.

use serde_json::Value;

use crate::error::ActionError;
use crate::state::Rejection;

/// Why an execution is being rejected.
///
/// Most callers never name this type: `reject` accepts anything that
/// converts into it, such as `()`, `&str`, `String`, [`ActionError`] or a
/// JSON value.
#[derive(Debug, Clone)]
pub enum Reason {
    /// No reason given.
    Empty,
    /// A plain text message.
    Message(String),
    /// An error value.
    Error(ActionError),
    /// Any other value. Not a valid reason.
    Value(Value),
}

impl From<()> for Reason {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<ActionError> for Reason {
    fn from(err: ActionError) -> Self {
        Self::Error(err)
    }
}

impl From<Value> for Reason {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(message) if message.is_empty() => Self::Empty,
            Value::String(message) => Self::Message(message),
            other => Self::Value(other),
        }
    }
}

impl<T> From<Option<T>> for Reason
where
    T: Into<Reason>,
{
    fn from(reason: Option<T>) -> Self {
        reason.map_or(Self::Empty, Into::into)
    }
}

/// Turn a reason into the error to record and the outcome it implies.
///
/// This is the only place that decides between canceled and failed.
pub fn classify(reason: Reason) -> (ActionError, Rejection) {
    match reason {
        Reason::Empty => (ActionError::canceled(), Rejection::Canceled),
        Reason::Message(message) if message.is_empty() => {
            (ActionError::canceled(), Rejection::Canceled)
        }
        Reason::Message(message) => (ActionError::user(message), Rejection::Canceled),
        Reason::Error(err) => {
            let rejection = if err.is_user_error() && !err.is_runtime_error() {
                Rejection::Canceled
            } else {
                Rejection::Failed
            };
            (err, rejection)
        }
        Reason::Value(value) => (
            ActionError::argument_invalid(
                "reason",
                format!("expected an error or a message, got {value}"),
            ),
            Rejection::Failed,
        ),
    }
}
