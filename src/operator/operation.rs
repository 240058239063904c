//! Scheduled units of work.

use super::context::ExecutionContext;
use crate::cloner::{Cloner, DeepClone};
use std::sync::Arc;

/// A unit of work for the engine.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Run one operator in one context.
    Atomic(Arc<ExecutionContext>),
    /// Run these operations left to right.
    Sequence(Vec<Operation>),
    /// Run these operations as independent branches. Branches must touch
    /// disjoint scope subtrees; the engine joins them before moving on.
    Parallel(Vec<Operation>),
}

impl Operation {
    /// Packs `ops` as a sequence, collapsing the empty and single cases.
    pub fn sequence(mut ops: Vec<Operation>) -> Option<Operation> {
        match ops.len() {
            0 => None,
            1 => ops.pop(),
            _ => Some(Operation::Sequence(ops)),
        }
    }

    /// Packs `ops` as a parallel collection, or `None` if empty.
    pub fn parallel(ops: Vec<Operation>) -> Option<Operation> {
        if ops.is_empty() {
            None
        } else {
            Some(Operation::Parallel(ops))
        }
    }

    /// Number of atomic operations contained, recursively.
    pub fn atomic_count(&self) -> usize {
        match self {
            Operation::Atomic(_) => 1,
            Operation::Sequence(ops) | Operation::Parallel(ops) => {
                ops.iter().map(Operation::atomic_count).sum()
            }
        }
    }
}

impl DeepClone for Operation {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        match self {
            Operation::Atomic(ctx) => Operation::Atomic(ctx.deep_clone(cloner)),
            Operation::Sequence(ops) => Operation::Sequence(ops.deep_clone(cloner)),
            Operation::Parallel(ops) => Operation::Parallel(ops.deep_clone(cloner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorGraph;
    use crate::scope::Scope;

    fn atomic() -> Operation {
        let ctx = ExecutionContext::root(Arc::new(OperatorGraph::new("g")), Scope::new("s"));
        Operation::Atomic(ctx)
    }

    #[test]
    fn test_sequence_collapses() {
        assert!(Operation::sequence(vec![]).is_none());
        assert!(matches!(
            Operation::sequence(vec![atomic()]),
            Some(Operation::Atomic(_))
        ));
        assert!(matches!(
            Operation::sequence(vec![atomic(), atomic()]),
            Some(Operation::Sequence(_))
        ));
        assert!(Operation::parallel(vec![]).is_none());
    }

    #[test]
    fn test_atomic_count() {
        let op = Operation::Sequence(vec![
            atomic(),
            Operation::Parallel(vec![atomic(), atomic()]),
        ]);
        assert_eq!(op.atomic_count(), 3);
    }
}
