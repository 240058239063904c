//! Operators, operator graphs and execution contexts.
//!
//! An algorithm is an [`OperatorGraph`]: an arena of [`Operator`] nodes
//! linked by successor ids and by the child ids of composite nodes. When the
//! engine runs a node it binds it to a scope through an [`ExecutionContext`];
//! the node returns the next [`Operation`] to schedule.
//!
//! # Core Traits
//!
//! - [`Operator`]: the node contract (`execute` → next operation)
//!
//! # Key Types
//!
//! - [`OperatorGraph`]: node arena plus the algorithm's own parameters
//! - [`ExecutionContext`]: operator + scope + parent context
//! - [`Operation`]: atomic call, or sequential/parallel collection
//!
//! # Generic Operators
//!
//! Composites schedule other operators and do no work themselves:
//! [`SequentialProcessor`], [`SubScopesProcessor`],
//! [`UniformSubScopesProcessor`], [`ConditionalBranch`], [`Loop`],
//! [`Placeholder`].
//!
//! Leaves are the domain-free building blocks every algorithm graph needs:
//! [`EmptyOperator`], [`Assigner`], [`IntCounter`], [`Comparator`],
//! [`VariableCreator`], [`SubScopesCreator`], [`SubScopesRemover`],
//! [`SubScopeDuplicator`].

mod basic;
mod composite;
mod context;
mod graph;
mod operation;
mod types;

pub use basic::{
    Assigner, Comparator, Comparison, EmptyOperator, IntCounter, SubScopeDuplicator,
    SubScopesCreator, SubScopesRemover, VariableCreator,
};
pub use composite::{
    ConditionalBranch, Loop, Placeholder, SequentialProcessor, SubScopesProcessor,
    UniformSubScopesProcessor,
};
pub use context::ExecutionContext;
pub use graph::OperatorGraph;
pub use operation::Operation;
pub use types::{operator_parameter, Operator, OperatorBase, OperatorId};
