//! Binding of one operator to one scope for one execution step.

use super::graph::OperatorGraph;
use super::operation::Operation;
use super::types::{Operator, OperatorId};
use crate::cloner::{Cloner, DeepClone};
use crate::error::{EngineError, Result};
use crate::item::{ItemRef, ItemType, RandomSource, Value};
use crate::parameter::{self, ParameterCollection};
use crate::scope::ScopeRef;
use std::fmt;
use std::sync::Arc;

/// The frame through which an operator observes and mutates state.
///
/// Contexts form a chain: a composite operator's children get a context
/// whose parent is the composite's context, while a successor gets a
/// *sibling* context sharing the same parent. Parameter resolution walks
/// this chain, not the raw scope tree.
///
/// The root of every chain is the graph frame: it binds no operator, carries
/// the graph's own parameters and the global scope.
///
/// Contexts are immutable once created and shared through `Arc`, so an
/// unexecuted continuation can be cloned or handed to another thread as is.
pub struct ExecutionContext {
    graph: Arc<OperatorGraph>,
    operator: Option<OperatorId>,
    scope: ScopeRef,
    parent: Option<Arc<ExecutionContext>>,
    depth: usize,
    /// Operators visited along the current successor chain.
    trail: Vec<OperatorId>,
}

impl ExecutionContext {
    /// The graph frame for a run over `scope`.
    pub fn root(graph: Arc<OperatorGraph>, scope: ScopeRef) -> Arc<Self> {
        Arc::new(Self {
            graph,
            operator: None,
            scope,
            parent: None,
            depth: 0,
            trail: Vec::new(),
        })
    }

    /// A context for `operator` nested under this one.
    pub fn child_context(self: &Arc<Self>, operator: OperatorId, scope: ScopeRef) -> Arc<Self> {
        Arc::new(Self {
            graph: self.graph.clone(),
            operator: Some(operator),
            scope,
            parent: Some(self.clone()),
            depth: self.depth + 1,
            trail: vec![operator],
        })
    }

    fn sibling(&self, operator: OperatorId, trail: Vec<OperatorId>) -> Arc<Self> {
        Arc::new(Self {
            graph: self.graph.clone(),
            operator: Some(operator),
            scope: self.scope.clone(),
            parent: self.parent.clone(),
            depth: self.depth,
            trail,
        })
    }

    pub fn graph(&self) -> &Arc<OperatorGraph> {
        &self.graph
    }

    pub fn operator_id(&self) -> Option<OperatorId> {
        self.operator
    }

    /// The bound operator. Fails on the graph frame.
    pub fn operator(&self) -> Result<&dyn Operator> {
        match self.operator {
            Some(id) => self.graph.get(id),
            None => Err(EngineError::execution(
                self.graph.name(),
                "the graph frame binds no operator",
            )),
        }
    }

    /// Name of the bound operator, or of the graph for the graph frame.
    pub fn operator_name(&self) -> String {
        match self.operator.and_then(|id| self.graph.get(id).ok()) {
            Some(op) => op.name().to_string(),
            None => self.graph.name().to_string(),
        }
    }

    /// Parameters declared by this frame.
    pub fn parameters(&self) -> Result<&ParameterCollection> {
        match self.operator {
            Some(id) => Ok(self.graph.get(id)?.parameters()),
            None => Ok(self.graph.parameters()),
        }
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionContext>> {
        self.parent.as_ref()
    }

    /// Number of frames above this one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn trail(&self) -> &[OperatorId] {
        &self.trail
    }

    // ---- parameter access ----

    /// Resolves a parameter to its item. See [`parameter::resolve`].
    pub fn get(&self, parameter: &str) -> Result<ItemRef> {
        parameter::resolve(self, parameter)
    }

    /// Resolves a parameter, yielding `None` when no variable or default
    /// exists.
    pub fn get_optional(&self, parameter: &str) -> Result<Option<ItemRef>> {
        parameter::resolve_optional(self, parameter)
    }

    /// Resolves a parameter and copies its value.
    pub fn value(&self, parameter: &str) -> Result<Value> {
        Ok(self.get(parameter)?.get())
    }

    pub fn get_bool(&self, parameter: &str) -> Result<bool> {
        self.typed(parameter, ItemType::Bool, Value::as_bool)
    }

    pub fn get_int(&self, parameter: &str) -> Result<i64> {
        self.typed(parameter, ItemType::Int, Value::as_int)
    }

    pub fn get_double(&self, parameter: &str) -> Result<f64> {
        self.typed(parameter, ItemType::Double, Value::as_double)
    }

    pub fn get_operator(&self, parameter: &str) -> Result<OperatorId> {
        self.typed(parameter, ItemType::Operator, Value::as_operator)
    }

    fn typed<T>(&self, parameter: &str, expected: ItemType, f: impl Fn(&Value) -> Option<T>) -> Result<T> {
        let item = self.get(parameter)?;
        let value = item.read();
        f(&value).ok_or_else(|| EngineError::TypeMismatch {
            parameter: parameter.to_string(),
            expected,
            found: value.item_type(),
        })
    }

    /// Writes a fresh item holding `value` through a parameter.
    pub fn set(&self, parameter: &str, value: impl Into<Value>) -> Result<()> {
        parameter::assign(self, parameter, ItemRef::new(value))
    }

    /// Binds an existing item through a parameter, sharing it.
    pub fn set_item(&self, parameter: &str, item: ItemRef) -> Result<()> {
        parameter::assign(self, parameter, item)
    }

    /// Removes the variable a parameter translates to from the bound scope
    /// only.
    pub fn remove(&self, parameter: &str) -> Result<Option<ItemRef>> {
        match parameter::translate(self, parameter)? {
            parameter::Translation::Fixed { .. } => Err(EngineError::ReadOnlyParameter {
                parameter: parameter.to_string(),
            }),
            parameter::Translation::Variable { name, .. } => {
                Ok(self.scope.remove_variable(&name).map(|v| v.value().clone()))
            }
        }
    }

    /// Runs `f` with exclusive access to the random source a parameter
    /// resolves to.
    ///
    /// A source that only exists as a default is first created in the bound
    /// scope, so later draws continue its stream. A fixed source is copied
    /// afresh on every call.
    pub fn with_random<T>(&self, parameter: &str, f: impl FnOnce(&mut RandomSource) -> T) -> Result<T> {
        let item = match parameter::resolve_variable(self, parameter)? {
            Some(item) => item,
            None => {
                let item = self.get(parameter)?;
                match parameter::assign(self, parameter, item.clone()) {
                    Ok(()) | Err(EngineError::ReadOnlyParameter { .. }) => {}
                    Err(e) => return Err(e),
                }
                item
            }
        };
        let mut value = item.write();
        match &mut *value {
            Value::Random(rng) => Ok(f(rng)),
            other => Err(EngineError::TypeMismatch {
                parameter: parameter.to_string(),
                expected: ItemType::Random,
                found: other.item_type(),
            }),
        }
    }

    // ---- building operations ----

    /// Schedules `operator` on `scope` as a child of this context.
    pub fn child(self: &Arc<Self>, operator: OperatorId, scope: ScopeRef) -> Operation {
        Operation::Atomic(self.child_context(operator, scope))
    }

    /// Schedules the bound operator's successor on the same scope.
    ///
    /// Fails with [`EngineError::GraphCycle`] if the successor was already
    /// visited on this successor chain.
    pub fn successor(self: &Arc<Self>) -> Result<Option<Operation>> {
        let Some(next) = self.operator()?.successor() else {
            return Ok(None);
        };
        if self.trail.contains(&next) {
            return Err(EngineError::GraphCycle {
                operator: self.graph.get(next)?.name().to_string(),
                reason: "successor chain revisits this operator".into(),
            });
        }
        let mut trail = self.trail.clone();
        trail.push(next);
        Ok(Some(Operation::Atomic(self.sibling(next, trail))))
    }

    /// Schedules the bound operator again on the same scope, starting a new
    /// successor chain. Used by iterative composites.
    pub fn reenter(self: &Arc<Self>) -> Result<Operation> {
        match self.operator {
            Some(id) => Ok(Operation::Atomic(self.sibling(id, vec![id]))),
            None => Err(EngineError::execution(
                self.graph.name(),
                "cannot re-enter the graph frame",
            )),
        }
    }

    /// Appends the successor (if any) to `ops` and packs them as one
    /// sequential operation.
    pub fn then_successor(self: &Arc<Self>, mut ops: Vec<Operation>) -> Result<Option<Operation>> {
        if let Some(next) = self.successor()? {
            ops.push(next);
        }
        Ok(Operation::sequence(ops))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operator", &self.operator_name())
            .field("scope", &self.scope.name())
            .field("depth", &self.depth)
            .finish()
    }
}

impl DeepClone for Arc<ExecutionContext> {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        if let Some(existing) = cloner.lookup_context(self) {
            return existing;
        }
        let copy = Arc::new(ExecutionContext {
            graph: self.graph.deep_clone(cloner),
            operator: self.operator.map(|id| cloner.operator(id)),
            scope: self.scope.deep_clone(cloner),
            parent: self.parent.deep_clone(cloner),
            depth: self.depth,
            trail: self.trail.iter().map(|&id| cloner.operator(id)).collect(),
        });
        cloner.register_context(self, copy.clone());
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::EmptyOperator;
    use crate::parameter::Parameter;
    use crate::scope::Scope;

    fn chain_graph() -> (Arc<OperatorGraph>, OperatorId, OperatorId) {
        let mut graph = OperatorGraph::new("g");
        let mut a = EmptyOperator::new("A");
        a.base_mut()
            .parameters
            .insert(Parameter::lookup("Count", ItemType::Int));
        a.base_mut()
            .parameters
            .insert(Parameter::lookup("Random", ItemType::Random));
        let a = graph.add(a);
        let b = graph.add(EmptyOperator::new("B"));
        graph.set_successor(a, Some(b)).unwrap();
        (Arc::new(graph), a, b)
    }

    #[test]
    fn test_successor_is_sibling() {
        let (graph, a, b) = chain_graph();
        let scope = Scope::new("g");
        let root = ExecutionContext::root(graph, scope);
        let ctx = root.child_context(a, root.scope().clone());
        let Some(Operation::Atomic(next)) = ctx.successor().unwrap() else {
            panic!("expected atomic successor");
        };
        assert_eq!(next.operator_id(), Some(b));
        assert_eq!(next.depth(), ctx.depth());
        assert!(Arc::ptr_eq(next.parent().unwrap(), &root));
        assert_eq!(next.trail(), &[a, b]);
    }

    #[test]
    fn test_typed_getters() {
        let (graph, a, _) = chain_graph();
        let scope = Scope::new("g");
        scope.set_value("Count", 3i64);
        let root = ExecutionContext::root(graph, scope.clone());
        let ctx = root.child_context(a, scope.clone());
        assert_eq!(ctx.get_int("Count").unwrap(), 3);
        ctx.set("Count", 4i64).unwrap();
        assert_eq!(ctx.get_int("Count").unwrap(), 4);
        assert!(ctx.get_bool("Count").is_err());
        assert_eq!(ctx.remove("Count").unwrap().unwrap().get(), Value::Int(4));
        assert!(ctx.get_optional("Count").unwrap().is_none());
    }

    #[test]
    fn test_with_random_draws_from_scope_item() {
        let (graph, a, _) = chain_graph();
        let scope = Scope::new("g");
        scope.set_value("Random", RandomSource::new(1));
        let root = ExecutionContext::root(graph, scope.clone());
        let ctx = root.child_context(a, scope.clone());
        let x = ctx
            .with_random("Random", |rng| rand::Rng::random_range(rng, 0..10))
            .unwrap();
        assert!(x < 10);
        let item = scope.variable("Random").unwrap();
        match &*item.read() {
            Value::Random(rng) => assert!(rng.draws() > 0),
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn test_with_random_default_leaves_graph_untouched() {
        let mut graph = OperatorGraph::new("g");
        let mut a = EmptyOperator::new("A");
        a.base_mut().parameters.insert(
            Parameter::lookup("Random", ItemType::Random).with_default(RandomSource::new(9)),
        );
        let a = graph.add(a);
        let graph = Arc::new(graph);

        let draw = |scope: &ScopeRef| {
            let root = ExecutionContext::root(graph.clone(), scope.clone());
            let ctx = root.child_context(a, scope.clone());
            (0..3)
                .map(|_| ctx.with_random("Random", |rng| rand::RngCore::next_u64(rng)).unwrap())
                .collect::<Vec<_>>()
        };
        let first = Scope::new("g");
        let second = Scope::new("g");
        let xs = draw(&first);
        assert_eq!(xs, draw(&second));
        assert_ne!(xs[0], xs[1]);
        assert!(first.contains_variable("Random"));

        let declared = graph.get(a).unwrap().parameters().get("Random").unwrap();
        match &*declared.default_value().unwrap().read() {
            Value::Random(rng) => assert_eq!(rng.draws(), 0),
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn test_graph_frame_has_no_operator() {
        let (graph, _, _) = chain_graph();
        let root = ExecutionContext::root(graph, Scope::new("g"));
        assert!(root.operator().is_err());
        assert_eq!(root.operator_name(), "g");
        assert!(root.reenter().is_err());
    }

    #[test]
    fn test_deep_clone_shares_parent_frames() {
        let (graph, a, b) = chain_graph();
        let scope = Scope::new("g");
        let root = ExecutionContext::root(graph, scope.clone());
        let x = root.child_context(a, scope.clone());
        let y = root.child_context(b, scope.clone());

        let mut cloner = Cloner::new();
        let x2 = x.deep_clone(&mut cloner);
        let y2 = y.deep_clone(&mut cloner);
        assert!(Arc::ptr_eq(x2.parent().unwrap(), y2.parent().unwrap()));
        assert!(!Arc::ptr_eq(x2.parent().unwrap(), &root));
        assert!(Arc::ptr_eq(x2.scope(), y2.scope()));
        assert!(!Arc::ptr_eq(x2.scope(), &scope));
    }
}
