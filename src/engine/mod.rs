//! Run lifecycle and scheduling.
//!
//! The [`Engine`] drains a continuation of [`Operation`](crate::operator::Operation)s
//! over a scope tree. Parallel collections run on the rayon pool (feature
//! `parallel`), each branch draining its own stack, and are joined before
//! the next entry. Runs can be paused, stopped or aborted from other threads
//! through an [`EngineHandle`], and a paused engine can be deep-cloned.
//!
//! # Key Types
//!
//! - [`Engine`]: prepare / start / step / stop
//! - [`EngineConfig`]: parallelism and runaway bounds
//! - [`ExecutionState`]: lifecycle states
//! - [`EngineObserver`]: state, time and error events
//! - [`CancellationToken`]: cooperative cancellation seen by operators

mod config;
mod control;
mod runner;
mod state;

pub use config::EngineConfig;
pub use control::{CancellationToken, EngineHandle};
pub use runner::Engine;
pub use state::{EngineObserver, ExecutionState};
