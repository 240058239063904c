//! Cycle-safe deep copying.
//!
//! A [`Cloner`] is one clone session. It keeps an identity map from every
//! original object (keyed by allocation address, or by [`OperatorId`] for
//! graph nodes) to the copy already produced for it. Each [`DeepClone`]
//! implementation checks the map first, so an object reachable along two
//! paths is copied once and both paths in the copy reach the same new
//! object.
//!
//! Scopes and items register their (still empty) copy *before* cloning
//! their contents, so a child's parent link resolves to the copy under
//! construction. Graph nodes are mapped by id, so a successor cycle in a
//! duplicated subgraph resolves to the new ids without recursing. Execution
//! contexts and whole graphs are immutable once shared; they only point
//! towards the root or into the arena, cannot reach themselves, and register
//! their copy once it is built.
//!
//! A session lives for one top-level clone call and is never shared across
//! threads.
//!
//! # Examples
//!
//! ```
//! use u_opgraph::cloner::{Cloner, DeepClone};
//! use u_opgraph::item::ItemRef;
//! use u_opgraph::scope::Scope;
//!
//! let root = Scope::new("root");
//! let shared = ItemRef::new(3i64);
//! root.set_variable("A", shared.clone());
//! root.set_variable("B", shared);
//!
//! let copy = root.deep_clone(&mut Cloner::new());
//! let a = copy.variable("A").unwrap();
//! let b = copy.variable("B").unwrap();
//! assert!(a.ptr_eq(&b));
//! assert!(!a.ptr_eq(&root.variable("A").unwrap()));
//! ```

use crate::item::ItemRef;
use crate::operator::{ExecutionContext, OperatorGraph, OperatorId};
use crate::scope::ScopeRef;
use std::collections::HashMap;
use std::sync::Arc;

/// Deep copy through a clone session.
pub trait DeepClone {
    /// Produces a copy of `self`, reusing copies already recorded in `cloner`.
    fn deep_clone(&self, cloner: &mut Cloner) -> Self;
}

/// Identity map for one clone session.
#[derive(Default)]
pub struct Cloner {
    items: HashMap<usize, ItemRef>,
    scopes: HashMap<usize, ScopeRef>,
    contexts: HashMap<usize, Arc<ExecutionContext>>,
    graphs: HashMap<usize, Arc<OperatorGraph>>,
    operators: HashMap<OperatorId, OperatorId>,
}

impl Cloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for a single clone call with a fresh session.
    pub fn clone_one<T: DeepClone>(value: &T) -> T {
        value.deep_clone(&mut Cloner::new())
    }

    /// Number of objects copied so far in this session.
    pub fn len(&self) -> usize {
        self.items.len() + self.scopes.len() + self.contexts.len() + self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- operators ----

    /// Records that graph node `original` is copied as `copy`.
    pub fn map_operator(&mut self, original: OperatorId, copy: OperatorId) {
        self.operators.insert(original, copy);
    }

    /// Translates an operator id. Ids not remapped in this session stay as
    /// they are, which is what cloning a whole graph wants.
    pub fn operator(&self, original: OperatorId) -> OperatorId {
        self.operators.get(&original).copied().unwrap_or(original)
    }

    // ---- items ----

    pub(crate) fn lookup_item(&self, original: &ItemRef) -> Option<ItemRef> {
        self.items.get(&original.key()).cloned()
    }

    pub(crate) fn register_item(&mut self, original: &ItemRef, copy: ItemRef) {
        self.items.insert(original.key(), copy);
    }

    // ---- scopes ----

    pub(crate) fn lookup_scope(&self, original: &ScopeRef) -> Option<ScopeRef> {
        self.scopes.get(&address(original)).cloned()
    }

    pub(crate) fn register_scope(&mut self, original: &ScopeRef, copy: ScopeRef) {
        self.scopes.insert(address(original), copy);
    }

    // ---- execution contexts ----

    pub(crate) fn lookup_context(
        &self,
        original: &Arc<ExecutionContext>,
    ) -> Option<Arc<ExecutionContext>> {
        self.contexts.get(&address(original)).cloned()
    }

    pub(crate) fn register_context(
        &mut self,
        original: &Arc<ExecutionContext>,
        copy: Arc<ExecutionContext>,
    ) {
        self.contexts.insert(address(original), copy);
    }

    // ---- graphs ----

    pub(crate) fn lookup_graph(&self, original: &Arc<OperatorGraph>) -> Option<Arc<OperatorGraph>> {
        self.graphs.get(&address(original)).cloned()
    }

    pub(crate) fn register_graph(&mut self, original: &Arc<OperatorGraph>, copy: Arc<OperatorGraph>) {
        self.graphs.insert(address(original), copy);
    }
}

fn address<T>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

impl<T: DeepClone> DeepClone for Option<T> {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        self.as_ref().map(|v| v.deep_clone(cloner))
    }
}

impl<T: DeepClone> DeepClone for Vec<T> {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        self.iter().map(|v| v.deep_clone(cloner)).collect()
    }
}
