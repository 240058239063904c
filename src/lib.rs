//! Operator-graph execution runtime for metaheuristic algorithms.
//!
//! An algorithm is assembled from small reusable operators wired into a
//! graph, and executed by an engine over a tree of scoped variables:
//!
//! - **Scopes**: a hierarchical variable store. A population is a scope
//!   whose sub-scopes are the individuals.
//! - **Parameters**: operators read and write state only through declared
//!   parameters, each with an *actual name* that can be rewired at assembly
//!   time or re-aliased by an enclosing operator.
//! - **Operators**: composite nodes (sequences, per-sub-scope processors,
//!   loops, branches) schedule other nodes; leaf nodes do the work.
//! - **Engine**: drains a continuation of operations, runs parallel
//!   branches on rayon, and supports pause, resume, stop, abort and
//!   cooperative cancellation.
//! - **Cloner**: deep copies of scope trees, graphs and paused engines that
//!   preserve shared references and cycles.
//!
//! # Architecture
//!
//! Operators live in an arena ([`operator::OperatorGraph`]) and are
//! addressed by id; scopes are shared `Arc`s with per-scope locks. The
//! crate contains no problem-specific concepts. Encodings, evaluators and
//! move operators are defined by consumers as further [`operator::Operator`]
//! implementations.
//!
//! # Examples
//!
//! ```
//! use u_opgraph::engine::{Engine, EngineConfig, ExecutionState};
//! use u_opgraph::operator::{Comparator, Comparison, IntCounter, Loop, OperatorGraph};
//! use u_opgraph::scope::Scope;
//!
//! let mut graph = OperatorGraph::new("count to ten");
//! let counter = graph.add(IntCounter::new("Counter"));
//! let done = graph.add(Comparator::new("Done?", Comparison::GreaterOrEqual));
//! graph.set_actual_name(done, "Left", "Value").unwrap();
//! graph.set_actual_name(done, "Right", "Limit").unwrap();
//! graph.set_actual_name(done, "Result", "Terminate").unwrap();
//! let main = graph.add(Loop::new("Main", Some(counter), Some(done)));
//! graph.set_initial(main).unwrap();
//!
//! let global = Scope::new("Global");
//! global.set_value("Limit", 10i64);
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! engine.prepare(graph, global.clone()).unwrap();
//! assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
//! assert_eq!(global.variable("Value").unwrap().get().as_int(), Some(10));
//! ```

pub mod cloner;
pub mod engine;
pub mod error;
pub mod item;
pub mod operator;
pub mod parameter;
pub mod scope;

pub use error::{EngineError, Result};
