//! Plain-data view of a scope subtree.

use crate::item::Value;
use std::collections::BTreeMap;

/// Names and values of a scope subtree, detached from any locks.
///
/// Two runs that end in equal snapshots ended in equal scope trees, which is
/// how determinism and pause/resume equivalence are checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSnapshot {
    pub name: String,
    pub variables: BTreeMap<String, Value>,
    pub sub_scopes: Vec<ScopeSnapshot>,
}

impl ScopeSnapshot {
    /// Looks up a variable by path of sub-scope indices.
    pub fn value_at(&self, path: &[usize], name: &str) -> Option<&Value> {
        let mut node = self;
        for &index in path {
            node = node.sub_scopes.get(index)?;
        }
        node.variables.get(name)
    }

    /// Total number of scopes in the subtree, including this one.
    pub fn scope_count(&self) -> usize {
        1 + self.sub_scopes.iter().map(|s| s.scope_count()).sum::<usize>()
    }
}
