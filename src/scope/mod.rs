//! Hierarchical variable store.
//!
//! A scope tree is the only shared mutable state of a run. Each [`Scope`]
//! owns an ordered list of child scopes and a name → [`Variable`] map, and
//! keeps a weak back-reference to its parent. Scopes are handed around as
//! [`ScopeRef`] (`Arc<Scope>`); every part of a scope sits behind its own
//! lock, so parallel branches working on disjoint subtrees never contend.
//!
//! # Key Types
//!
//! - [`Scope`]: one node of the tree
//! - [`Variable`]: a named binding to an [`ItemRef`](crate::item::ItemRef)
//! - [`ScopeSnapshot`]: plain, comparable copy of a subtree's contents

mod snapshot;
mod tree;

pub use snapshot::ScopeSnapshot;
pub use tree::{Scope, ScopeRef, Variable};
