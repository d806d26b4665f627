//! Phase and outcome states of an execution.
//!
//! States are ordered: the four executing stages come first, followed by the
//! terminal outcomes. Advancing an execution is always an ordinal increase,
//! except that any unsettled stage may jump straight to a rejected outcome.

use serde::{Deserialize, Serialize};

/// Get the current Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================================================
// Execution State
// ============================================================================

/// The stage or outcome an execution is in.
///
/// Whether the execution has also *finished* (ran its finally phase) is
/// tracked separately; see [`Execution::is_finished`](crate::Execution::is_finished).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, `execute` not yet called.
    #[default]
    Unstarted,
    /// Running the init phase. The action is still mutable.
    Init,
    /// Running the will phase. The action is sealed.
    Will,
    /// Running the do phase.
    Do,
    /// Completed successfully.
    Did,
    /// Rejected with a user-facing cancellation.
    Canceled,
    /// Rejected with an unexpected failure.
    Failed,
}

impl ExecutionState {
    /// `Unstarted`, `Init`, `Will` or `Do`.
    pub fn is_executing_unsettled(self) -> bool {
        self <= Self::Do
    }

    /// `Init`, `Will` or `Do`.
    pub fn is_executing(self) -> bool {
        matches!(self, Self::Init | Self::Will | Self::Do)
    }

    /// `Canceled` or `Failed`.
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::Canceled | Self::Failed)
    }

    /// `Did`, `Canceled` or `Failed`.
    pub fn is_settled(self) -> bool {
        self > Self::Do
    }

    /// The phase running in this state, if any.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Init => Some(Phase::Init),
            Self::Will => Some(Phase::Will),
            Self::Do => Some(Phase::Do),
            _ => None,
        }
    }

    /// Lowercase name, as used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Init => "init",
            Self::Will => "will",
            Self::Do => "do",
            Self::Did => "did",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rejected execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Expected, user-facing cancellation.
    Canceled,
    /// Unexpected, internal failure.
    Failed,
}

impl From<Rejection> for ExecutionState {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Canceled => Self::Canceled,
            Rejection::Failed => Self::Failed,
        }
    }
}

// ============================================================================
// Phase Timing
// ============================================================================

/// One of the ordered stages of running an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before validation.
    Init,
    /// Validation passed, action sealed.
    Will,
    /// Doing the work.
    Do,
    /// Cleanup, always runs once driven.
    Finally,
}

/// Timing information for a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTiming {
    /// The phase.
    pub phase: Phase,
    /// When the phase started (Unix timestamp ms).
    pub started_at: u64,
    /// When the phase completed (Unix timestamp ms), if completed.
    pub completed_at: Option<u64>,
}

impl PhaseTiming {
    /// Start timing the given phase now.
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            started_at: now_millis(),
            completed_at: None,
        }
    }

    /// Mark the phase as completed.
    pub fn complete(&mut self) {
        self.completed_at = Some(now_millis());
    }

    /// Get the duration in milliseconds, if completed.
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at
            .map(|end| end.saturating_sub(self.started_at))
    }
}
