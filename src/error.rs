//! Error taxonomy shared by resolution, graph traversal and the engine.
//!
//! Resolution and graph-structure errors fault the current run and are
//! surfaced to the caller unchanged. [`EngineError::Cancelled`] is the one
//! variant that is not a failure: the engine maps it to a stopped run.

use crate::engine::ExecutionState;
use crate::item::ItemType;
use crate::operator::OperatorId;

/// Errors raised while resolving parameters, traversing an operator graph,
/// or driving a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// No variable with the translated name exists along the scope chain and
    /// no default value was declared.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },

    /// A value was found but the parameter's declared type does not accept it.
    #[error("parameter `{parameter}` expects {expected} but found {found}")]
    TypeMismatch {
        parameter: String,
        expected: ItemType,
        found: ItemType,
    },

    /// The actual-name chain revisited a name it had already translated.
    #[error("alias cycle while resolving `{parameter}`: {}", .chain.join(" -> "))]
    AliasCycle {
        parameter: String,
        chain: Vec<String>,
    },

    /// The executing operator declares no parameter with this name.
    #[error("operator `{operator}` declares no parameter `{parameter}`")]
    UnknownParameter { operator: String, parameter: String },

    /// A write went through a parameter whose alias chain ends at a fixed value.
    #[error("parameter `{parameter}` resolves to a fixed value and cannot be written")]
    ReadOnlyParameter { parameter: String },

    /// An operator id does not address a node of the graph.
    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),

    /// A successor chain looped, or the continuation grew past its bound.
    #[error("graph cycle at operator `{operator}`: {reason}")]
    GraphCycle { operator: String, reason: String },

    /// An operator's own logic failed.
    #[error("operator `{operator}` failed: {message}")]
    OperatorExecution { operator: String, message: String },

    /// Cooperative cancellation was observed.
    #[error("execution cancelled")]
    Cancelled,

    /// A scope tree invariant would have been violated.
    #[error("scope error: {0}")]
    Scope(String),

    /// A lifecycle call was made in a state that does not allow it.
    #[error("cannot {action} while the engine is {state}")]
    InvalidState {
        action: &'static str,
        state: ExecutionState,
    },

    /// The engine configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::OperatorExecution`].
    pub fn execution(operator: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::OperatorExecution {
            operator: operator.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors that stop a run without faulting it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
