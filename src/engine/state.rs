//! Run states and lifecycle observers.

use crate::error::EngineError;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of an [`Engine`](super::Engine).
///
/// ```text
/// Stopped --prepare--> Ready --start/step--> Running --+--> Paused --start/step--> Running
///                                                      +--> Stopped | Aborted | Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionState {
    /// Prepared, nothing executed yet.
    Ready,
    /// Draining the continuation.
    Running,
    /// Halted with the continuation kept; can resume.
    Paused,
    /// Finished, or stopped on request. The continuation is empty.
    Stopped,
    /// Aborted on request. The continuation is empty.
    Aborted,
    /// An operation failed. The failing operation is back on the
    /// continuation and the error is kept.
    Faulted,
}

impl ExecutionState {
    /// Returns `true` if `start` or `step` may be called.
    pub fn can_run(self) -> bool {
        matches!(self, ExecutionState::Ready | ExecutionState::Paused)
    }

    /// Returns `true` for states a run cannot leave without `prepare`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Stopped | ExecutionState::Aborted | ExecutionState::Faulted
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Ready => "ready",
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Stopped => "stopped",
            ExecutionState::Aborted => "aborted",
            ExecutionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Receives lifecycle events from an engine.
///
/// Callbacks run on the thread driving the engine, between operations.
/// All methods default to no-ops.
pub trait EngineObserver: Send + Sync {
    fn execution_state_changed(&self, _state: ExecutionState) {}

    /// Total time spent running so far.
    fn execution_time_changed(&self, _elapsed: Duration) {}

    fn exception_occurred(&self, _error: &EngineError) {}
}
