//! Engine configuration.
//!
//! [`EngineConfig`] holds the knobs that bound and schedule a run.

use std::time::Duration;

/// Configuration for the [`Engine`](super::Engine).
///
/// # Defaults
///
/// ```
/// use u_opgraph::engine::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert!(config.parallel);
/// assert_eq!(config.max_stack_depth, 100_000);
/// assert!(config.validate().is_ok());
/// ```
///
/// # Builder Pattern
///
/// ```
/// use u_opgraph::engine::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_parallel(false)
///     .with_max_stack_depth(1_000)
///     .with_time_update_interval_ms(50);
/// assert_eq!(config.max_stack_depth, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Whether `Operation::Parallel` branches run on the rayon pool.
    ///
    /// Has no effect without the `parallel` feature; branches then run in
    /// order.
    pub parallel: bool,

    /// Largest continuation the engine accepts before treating the graph as
    /// runaway and faulting with `GraphCycle`.
    ///
    /// Counted per stack: each parallel branch drains its own.
    pub max_stack_depth: usize,

    /// Deepest chain of nested execution contexts allowed.
    ///
    /// Composites that schedule themselves as their own child would grow
    /// this without bound.
    pub max_context_depth: usize,

    /// Minimum interval between `execution_time_changed` events while
    /// running, in milliseconds.
    pub time_update_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_stack_depth: 100_000,
            max_context_depth: 10_000,
            time_update_interval_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Enables or disables parallel branch execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the continuation bound.
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Sets the context nesting bound.
    pub fn with_max_context_depth(mut self, depth: usize) -> Self {
        self.max_context_depth = depth;
        self
    }

    /// Sets the time event interval in milliseconds.
    pub fn with_time_update_interval_ms(mut self, ms: u64) -> Self {
        self.time_update_interval_ms = ms;
        self
    }

    /// Preset that runs every branch on the calling thread.
    ///
    /// Runs are then fully deterministic for a given seed.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_interval_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_stack_depth == 0 {
            return Err("max_stack_depth must be at least 1".into());
        }
        if self.max_context_depth == 0 {
            return Err("max_context_depth must be at least 1".into());
        }
        if self.time_update_interval_ms == 0 {
            return Err("time_update_interval_ms must be positive".into());
        }
        Ok(())
    }
}
