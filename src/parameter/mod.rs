//! Operator parameters and actual-name resolution.
//!
//! Operators never touch the scope tree by variable name directly. They
//! declare [`Parameter`]s and read/write through them; each parameter carries
//! an *actual name* that says which variable it really means. Rewiring a
//! graph is therefore a matter of changing actual names at assembly time,
//! with no change to operator code.
//!
//! # Resolution
//!
//! [`resolve`] looks a parameter up in three stages:
//!
//! 1. a parameter with a fixed value yields it;
//! 2. the actual name is translated through the parameter collections of the
//!    enclosing execution contexts (an enclosing operator, or the graph
//!    itself, may declare a parameter of that name which fixes the value or
//!    renames it again);
//! 3. the translated name is looked up as a variable in the bound scope and
//!    then in the scopes of the parent context chain.
//!
//! If nothing is found the first default value met along the chain is used,
//! otherwise resolution fails with
//! [`UnknownVariable`](crate::EngineError::UnknownVariable). Alias chains are
//! walked with a visited set, so a cyclic chain fails fast with
//! [`AliasCycle`](crate::EngineError::AliasCycle).
//!
//! Fixed values and defaults are part of the graph. Resolution hands out
//! copies of them, so writing through a resolved item never changes the
//! graph, and one graph can be run any number of times from equal scopes.

mod resolver;
mod types;

pub use resolver::{
    assign, resolve, resolve_optional, resolve_variable, translate, Translation, MAX_ALIAS_DEPTH,
};
pub use types::{Parameter, ParameterCollection};
