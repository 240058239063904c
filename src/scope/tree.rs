//! Scope nodes and variables.

use super::snapshot::ScopeSnapshot;
use crate::cloner::{Cloner, DeepClone};
use crate::error::{EngineError, Result};
use crate::item::{ItemRef, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Shared handle to a scope node.
pub type ScopeRef = Arc<Scope>;

/// A named binding inside a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    value: ItemRef,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: ItemRef) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ItemRef {
        &self.value
    }
}

impl DeepClone for Variable {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        Self {
            name: self.name.clone(),
            value: self.value.deep_clone(cloner),
        }
    }
}

/// A node of the scope tree.
///
/// # Examples
///
/// ```
/// use u_opgraph::scope::Scope;
///
/// let global = Scope::new("Global");
/// global.set_value("PopulationSize", 10i64);
///
/// let child = Scope::new("0");
/// global.add_sub_scope(child.clone()).unwrap();
///
/// assert_eq!(child.depth(), 1);
/// assert!(child.parent().is_some());
/// assert_eq!(global.sub_scope_count(), 1);
/// ```
pub struct Scope {
    name: RwLock<String>,
    variables: RwLock<BTreeMap<String, Variable>>,
    sub_scopes: RwLock<Vec<ScopeRef>>,
    parent: RwLock<Weak<Scope>>,
}

impl Scope {
    /// Creates a detached scope.
    pub fn new(name: impl Into<String>) -> ScopeRef {
        Arc::new(Self {
            name: RwLock::new(name.into()),
            variables: RwLock::new(BTreeMap::new()),
            sub_scopes: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn rename(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// Returns the parent scope, or `None` for a root or detached scope.
    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent.read().upgrade()
    }

    /// Number of ancestors above this scope.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(scope) = current {
            depth += 1;
            current = scope.parent();
        }
        depth
    }

    // ---- variables ----

    pub fn variable(&self, name: &str) -> Option<ItemRef> {
        self.variables.read().get(name).map(|v| v.value.clone())
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variables.read().contains_key(name)
    }

    /// Binds `name` to `value`, replacing any existing binding.
    pub fn set_variable(&self, name: impl Into<String>, value: ItemRef) {
        let name = name.into();
        self.variables
            .write()
            .insert(name.clone(), Variable::new(name, value));
    }

    /// Binds `name` to a fresh item holding `value`.
    pub fn set_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.set_variable(name, ItemRef::new(value));
    }

    /// Adds a variable, failing if the name is already bound in this scope.
    pub fn add_variable(&self, variable: Variable) -> Result<()> {
        let mut variables = self.variables.write();
        if variables.contains_key(&variable.name) {
            return Err(EngineError::Scope(format!(
                "variable `{}` already exists in scope `{}`",
                variable.name,
                self.name()
            )));
        }
        variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    pub fn remove_variable(&self, name: &str) -> Option<Variable> {
        self.variables.write().remove(name)
    }

    /// Variable names in sorted order.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.read().keys().cloned().collect()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.read().len()
    }

    // ---- sub-scopes ----

    /// Appends `child` as the last sub-scope.
    ///
    /// Fails if `child` already has a parent or is `self` or an ancestor of
    /// `self`, which would break the tree shape.
    pub fn add_sub_scope(self: &Arc<Self>, child: ScopeRef) -> Result<()> {
        let index = self.sub_scope_count();
        self.insert_sub_scope(index, child)
    }

    /// Inserts `child` at `index`, shifting later sub-scopes right.
    pub fn insert_sub_scope(self: &Arc<Self>, index: usize, child: ScopeRef) -> Result<()> {
        if child.parent().is_some() {
            return Err(EngineError::Scope(format!(
                "scope `{}` is already attached to a parent",
                child.name()
            )));
        }
        if self.is_self_or_ancestor(&child) {
            return Err(EngineError::Scope(format!(
                "attaching `{}` under `{}` would create a cycle",
                child.name(),
                self.name()
            )));
        }
        let count = self.sub_scope_count();
        if index > count {
            return Err(EngineError::Scope(format!(
                "sub-scope index {index} out of range (count {count})"
            )));
        }
        *child.parent.write() = Arc::downgrade(self);
        self.sub_scopes.write().insert(index, child);
        Ok(())
    }

    /// Detaches and returns the sub-scope at `index`.
    pub fn remove_sub_scope(&self, index: usize) -> Option<ScopeRef> {
        let removed = {
            let mut subs = self.sub_scopes.write();
            if index >= subs.len() {
                return None;
            }
            subs.remove(index)
        };
        *removed.parent.write() = Weak::new();
        Some(removed)
    }

    /// Detaches and returns all sub-scopes.
    pub fn clear_sub_scopes(&self) -> Vec<ScopeRef> {
        let removed = std::mem::take(&mut *self.sub_scopes.write());
        for child in &removed {
            *child.parent.write() = Weak::new();
        }
        removed
    }

    pub fn sub_scope(&self, index: usize) -> Option<ScopeRef> {
        self.sub_scopes.read().get(index).cloned()
    }

    /// Returns the current sub-scopes in order.
    pub fn sub_scopes(&self) -> Vec<ScopeRef> {
        self.sub_scopes.read().clone()
    }

    pub fn sub_scope_count(&self) -> usize {
        self.sub_scopes.read().len()
    }

    /// Returns all scopes exactly `depth` levels below this one, in
    /// depth-first order. `depth == 0` yields `self`.
    pub fn scopes_at_depth(self: &Arc<Self>, depth: usize) -> Vec<ScopeRef> {
        let mut level = vec![self.clone()];
        for _ in 0..depth {
            level = level.iter().flat_map(|s| s.sub_scopes()).collect();
        }
        level
    }

    /// Plain copy of this subtree's names and values.
    pub fn snapshot(&self) -> ScopeSnapshot {
        let variables = self
            .variables
            .read()
            .iter()
            .map(|(name, var)| (name.clone(), var.value.get()))
            .collect();
        ScopeSnapshot {
            name: self.name(),
            variables,
            sub_scopes: self.sub_scopes().iter().map(|s| s.snapshot()).collect(),
        }
    }

    fn is_self_or_ancestor(self: &Arc<Self>, candidate: &ScopeRef) -> bool {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if Arc::ptr_eq(&scope, candidate) {
                return true;
            }
            current = scope.parent();
        }
        false
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name())
            .field("variables", &self.variable_names())
            .field("sub_scopes", &self.sub_scope_count())
            .finish()
    }
}

/// Copies the subtree rooted at this scope.
///
/// The copy is detached unless its parent was copied in the same session,
/// in which case the parent's copy attaches it.
impl DeepClone for ScopeRef {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        if let Some(existing) = cloner.lookup_scope(self) {
            return existing;
        }
        let copy = Scope::new(self.name());
        cloner.register_scope(self, copy.clone());

        let variables: Vec<Variable> = self.variables.read().values().cloned().collect();
        {
            let copied: Vec<Variable> = variables.iter().map(|v| v.deep_clone(cloner)).collect();
            let mut target = copy.variables.write();
            for var in copied {
                target.insert(var.name.clone(), var);
            }
        }

        for child in self.sub_scopes() {
            let child_copy = child.deep_clone(cloner);
            *child_copy.parent.write() = Arc::downgrade(&copy);
            copy.sub_scopes.write().push(child_copy);
        }
        copy
    }
}
