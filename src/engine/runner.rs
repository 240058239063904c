//! The engine: drains an operation continuation over a scope tree.
//!
//! The continuation is a stack of [`Operation`]s. Each pop either expands a
//! collection (sequences push their parts in reverse so the first runs next)
//! or executes one operator and pushes what it returns. Operators never call
//! each other, so loops and deep graphs cost heap, not native stack.

use super::config::EngineConfig;
use super::control::{CancellationToken, Control, EngineHandle, Halt};
use super::state::{EngineObserver, ExecutionState};
use crate::cloner::{Cloner, DeepClone};
use crate::error::{EngineError, Result};
use crate::operator::{ExecutionContext, Operation, OperatorGraph};
use crate::scope::ScopeRef;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Runs an [`OperatorGraph`] against a global scope.
///
/// # Lifecycle
///
/// [`prepare`](Engine::prepare) binds a graph and a scope tree and schedules
/// the graph's initial operator. [`start`](Engine::start) drains the
/// continuation on the calling thread until it is empty, a halt is
/// requested through an [`EngineHandle`], or an operation fails.
/// [`step`](Engine::step) executes a single operator and pauses.
///
/// A paused engine can be resumed with `start`, or copied with
/// [`DeepClone`] and the copy resumed independently.
///
/// # Examples
///
/// ```
/// use u_opgraph::engine::{Engine, EngineConfig, ExecutionState};
/// use u_opgraph::operator::{IntCounter, OperatorGraph};
/// use u_opgraph::scope::Scope;
///
/// let mut graph = OperatorGraph::new("count");
/// let counter = graph.add(IntCounter::new("Counter"));
/// graph.set_initial(counter).unwrap();
///
/// let global = Scope::new("Global");
/// global.set_value("Value", 41i64);
///
/// let mut engine = Engine::new(EngineConfig::sequential()).unwrap();
/// engine.prepare(graph, global.clone()).unwrap();
/// assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
/// assert_eq!(global.variable("Value").unwrap().get().as_int(), Some(42));
/// ```
pub struct Engine {
    config: EngineConfig,
    state: ExecutionState,
    graph: Option<Arc<OperatorGraph>>,
    global_scope: Option<ScopeRef>,
    /// Pending operations; the top is the last element.
    continuation: Vec<Operation>,
    control: Arc<Control>,
    error: Option<EngineError>,
    execution_time: Duration,
    executed: u64,
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl Engine {
    /// Creates an engine with nothing prepared.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: EngineConfig) -> Self {
        Self {
            config,
            state: ExecutionState::Stopped,
            graph: None,
            global_scope: None,
            continuation: Vec::new(),
            control: Arc::new(Control::default()),
            error: None,
            execution_time: Duration::ZERO,
            executed: 0,
            observers: Vec::new(),
        }
    }

    /// Uses `token` as the cancellation token seen by operators.
    ///
    /// The engine never clears a caller's token: a cancellation made before
    /// [`prepare`](Engine::prepare) still stops the next run. Deep copies of
    /// the engine share it. Handles obtained earlier keep controlling the
    /// old token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.control = Arc::new(Control::with_token(token));
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// Binds `graph` and `global_scope` and schedules the graph's initial
    /// operator on the global scope.
    ///
    /// Resets counters, the stored error, pending requests and an
    /// engine-owned token.
    /// A graph without an initial operator prepares an empty run.
    pub fn prepare(&mut self, graph: impl Into<Arc<OperatorGraph>>, global_scope: ScopeRef) -> Result<()> {
        if self.state == ExecutionState::Running {
            return Err(EngineError::InvalidState {
                action: "prepare",
                state: self.state,
            });
        }
        let graph = graph.into();
        graph.validate()?;

        self.continuation.clear();
        if let Some(initial) = graph.initial() {
            let root = ExecutionContext::root(graph.clone(), global_scope.clone());
            self.continuation.push(root.child(initial, global_scope.clone()));
        }
        debug!(graph = graph.name(), operators = graph.len(), "engine prepared");

        self.graph = Some(graph);
        self.global_scope = Some(global_scope);
        self.control.reset();
        self.error = None;
        self.execution_time = Duration::ZERO;
        self.executed = 0;
        self.set_state(ExecutionState::Ready);
        Ok(())
    }

    /// Drains the continuation on the calling thread.
    ///
    /// Returns the state the run ended in (`Paused`, `Stopped` or
    /// `Aborted`), or the error that faulted it.
    pub fn start(&mut self) -> Result<ExecutionState> {
        self.run("start", None)
    }

    /// Executes exactly one operator, then pauses (or stops if nothing is
    /// left).
    pub fn step(&mut self) -> Result<ExecutionState> {
        self.run("step", Some(1))
    }

    /// Discards the continuation of an engine that is not running. The scope
    /// tree is left as it is.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            ExecutionState::Ready | ExecutionState::Paused | ExecutionState::Faulted => {
                self.continuation.clear();
                self.set_state(ExecutionState::Stopped);
                Ok(())
            }
            state => Err(EngineError::InvalidState {
                action: "stop",
                state,
            }),
        }
    }

    /// A handle for pausing, stopping or aborting from other threads.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.control.clone())
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// The error that faulted the last run.
    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    /// Total time spent running since `prepare`.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// Number of operators executed since `prepare`.
    pub fn executed_operations(&self) -> u64 {
        self.executed
    }

    /// Number of entries on the continuation stack.
    pub fn continuation_len(&self) -> usize {
        self.continuation.len()
    }

    pub fn global_scope(&self) -> Option<&ScopeRef> {
        self.global_scope.as_ref()
    }

    pub fn graph(&self) -> Option<&Arc<OperatorGraph>> {
        self.graph.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
        debug!(%state, "engine state changed");
        for observer in &self.observers {
            observer.execution_state_changed(state);
        }
    }

    fn run(&mut self, action: &'static str, budget: Option<usize>) -> Result<ExecutionState> {
        if !self.state.can_run() {
            return Err(EngineError::InvalidState {
                action,
                state: self.state,
            });
        }
        self.set_state(ExecutionState::Running);

        let state = match self.drain(budget) {
            Ok(halt @ (None | Some(Halt::Pause | Halt::Budget | Halt::Fault))) => {
                if halt == Some(Halt::Pause) {
                    self.control.clear_pause();
                }
                if self.continuation.is_empty() {
                    ExecutionState::Stopped
                } else {
                    ExecutionState::Paused
                }
            }
            Ok(Some(Halt::Stop | Halt::Cancel)) => {
                self.continuation.clear();
                ExecutionState::Stopped
            }
            Ok(Some(Halt::Abort)) => {
                self.continuation.clear();
                ExecutionState::Aborted
            }
            Err(EngineError::Cancelled) => {
                self.continuation.clear();
                if self.control.aborted() {
                    ExecutionState::Aborted
                } else {
                    ExecutionState::Stopped
                }
            }
            Err(e) => {
                warn!(error = %e, "operation failed");
                for observer in &self.observers {
                    observer.exception_occurred(&e);
                }
                self.error = Some(e.clone());
                self.set_state(ExecutionState::Faulted);
                return Err(e);
            }
        };
        self.set_state(state);
        Ok(state)
    }

    fn drain(&mut self, budget: Option<usize>) -> Result<Option<Halt>> {
        let mut stack = std::mem::take(&mut self.continuation);
        let executed = AtomicU64::new(self.executed);
        let base = self.execution_time;
        let started = Instant::now();
        let interval = self.config.time_update_interval();
        let observers = &self.observers;

        let mut last_event = started;
        let mut tick = || {
            if last_event.elapsed() >= interval {
                last_event = Instant::now();
                let elapsed = base + started.elapsed();
                for observer in observers {
                    observer.execution_time_changed(elapsed);
                }
            }
        };

        let mut budget = budget;
        let fault = AtomicBool::new(false);
        let drain = Drain {
            control: &self.control,
            config: &self.config,
            executed: &executed,
            fault: &fault,
        };
        let outcome = drain.run(&mut stack, budget.as_mut(), &mut tick);

        self.continuation = stack;
        self.executed = executed.into_inner();
        self.execution_time = base + started.elapsed();
        for observer in &self.observers {
            observer.execution_time_changed(self.execution_time);
        }
        outcome
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_valid_config(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("graph", &self.graph.as_ref().map(|g| g.name().to_string()))
            .field("continuation", &self.continuation.len())
            .field("executed", &self.executed)
            .finish()
    }
}

impl DeepClone for Engine {
    /// Copies a paused (or otherwise halted) engine with its scope tree,
    /// graph and continuation. The copy gets fresh run control and no
    /// observers. A caller-supplied token is shared.
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        // The whole tree first, so contexts in the continuation land on
        // copies attached to the copied tree.
        let global_scope = self.global_scope.deep_clone(cloner);
        let graph = self.graph.deep_clone(cloner);
        let continuation = self.continuation.deep_clone(cloner);
        Self {
            config: self.config.clone(),
            state: self.state,
            graph,
            global_scope,
            continuation,
            control: Arc::new(self.control.detached()),
            error: self.error.clone(),
            execution_time: self.execution_time,
            executed: self.executed,
            observers: Vec::new(),
        }
    }
}

/// Shared state of one drain: the top-level loop and every parallel branch
/// below it.
struct Drain<'a> {
    control: &'a Control,
    config: &'a EngineConfig,
    executed: &'a AtomicU64,
    /// Set by the first non-cancellation failure in any branch.
    fault: &'a AtomicBool,
}

impl Drain<'_> {
    /// Drains `stack` until it is empty, a halt is requested or an operation
    /// fails. A failing operation is pushed back before the error returns.
    fn run(
        &self,
        stack: &mut Vec<Operation>,
        mut budget: Option<&mut usize>,
        tick: &mut dyn FnMut(),
    ) -> Result<Option<Halt>> {
        while let Some(op) = stack.pop() {
            if let Some(halt) = self.control.halt() {
                stack.push(op);
                return Ok(Some(halt));
            }
            if self.fault.load(Ordering::Relaxed) {
                stack.push(op);
                return Ok(Some(Halt::Fault));
            }
            match op {
                Operation::Sequence(ops) => stack.extend(ops.into_iter().rev()),
                #[cfg(feature = "parallel")]
                Operation::Parallel(ops) if budget.is_none() && self.config.parallel && ops.len() > 1 => {
                    if let Some(halt) = self.run_parallel(ops, stack)? {
                        return Ok(Some(halt));
                    }
                }
                Operation::Parallel(ops) => stack.extend(ops.into_iter().rev()),
                Operation::Atomic(ctx) => {
                    match self.execute(&ctx, stack.len()) {
                        Ok(next) => {
                            self.executed.fetch_add(1, Ordering::Relaxed);
                            stack.extend(next);
                        }
                        Err(e) => {
                            if !e.is_cancellation() {
                                self.fault.store(true, Ordering::Relaxed);
                            }
                            stack.push(Operation::Atomic(ctx));
                            return Err(e);
                        }
                    }
                    if let Some(remaining) = budget.as_deref_mut() {
                        *remaining = remaining.saturating_sub(1);
                        if *remaining == 0 {
                            return Ok(Some(Halt::Budget));
                        }
                    }
                }
            }
            tick();
        }
        Ok(None)
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, pending: usize) -> Result<Option<Operation>> {
        if pending + 1 > self.config.max_stack_depth {
            return Err(EngineError::GraphCycle {
                operator: ctx.operator_name(),
                reason: format!(
                    "continuation exceeds {} operations",
                    self.config.max_stack_depth
                ),
            });
        }
        if ctx.depth() > self.config.max_context_depth {
            return Err(EngineError::GraphCycle {
                operator: ctx.operator_name(),
                reason: format!(
                    "execution contexts nested deeper than {}",
                    self.config.max_context_depth
                ),
            });
        }
        let operator = ctx.operator()?;
        trace!(
            operator = operator.name(),
            depth = ctx.depth(),
            scope = %ctx.scope().name(),
            "executing operator"
        );
        operator.execute(ctx, self.control.token())
    }

    /// Runs each branch on the rayon pool with its own stack and joins them.
    ///
    /// A failing branch makes its siblings halt before their next operation.
    /// Branches interrupted by a halt or a failure leave their remaining
    /// work on the continuation as one parallel collection.
    #[cfg(feature = "parallel")]
    fn run_parallel(&self, ops: Vec<Operation>, stack: &mut Vec<Operation>) -> Result<Option<Halt>> {
        trace!(branches = ops.len(), "running parallel branches");
        let outcomes: Vec<(Vec<Operation>, Result<Option<Halt>>)> = ops
            .into_par_iter()
            .map(|op| {
                let mut branch = vec![op];
                let outcome = self.run(&mut branch, None, &mut || {});
                (branch, outcome)
            })
            .collect();

        let mut pending = Vec::new();
        let mut failure: Option<EngineError> = None;
        let mut halt = None;
        for (branch, outcome) in outcomes {
            if !branch.is_empty() {
                pending.push(Operation::Sequence(branch.into_iter().rev().collect()));
            }
            match outcome {
                Ok(h) => halt = halt.or(h),
                Err(e) => {
                    if failure.as_ref().map_or(true, EngineError::is_cancellation) {
                        failure = Some(e);
                    }
                }
            }
        }
        stack.extend(Operation::parallel(pending));
        match failure {
            Some(e) => Err(e),
            None => Ok(halt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemType, RandomSource, Value};
    use crate::operator::{
        Comparator, Comparison, EmptyOperator, IntCounter, Loop, Operator, OperatorBase, OperatorId,
        Placeholder, SequentialProcessor, SubScopesProcessor, UniformSubScopesProcessor,
        VariableCreator,
    };
    use crate::parameter::Parameter;
    use crate::scope::{Scope, ScopeSnapshot};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use rand::Rng;
    use std::thread;

    /// Writes `Quality = X²` and then advances `X` by one.
    #[derive(Debug)]
    struct Evaluate {
        base: OperatorBase,
        delay: Duration,
    }

    impl Evaluate {
        fn new() -> Self {
            Self {
                base: OperatorBase::new("Evaluate")
                    .with_parameter(Parameter::lookup("X", ItemType::Double))
                    .with_parameter(Parameter::lookup("Quality", ItemType::Double)),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay, ..Self::new() }
        }
    }

    impl Operator for Evaluate {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OperatorBase {
            &mut self.base
        }

        fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let x = ctx.get_double("X")?;
            ctx.set("Quality", x * x)?;
            ctx.set("X", x + 1.0)?;
            ctx.successor()
        }

        fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
            Box::new(Self {
                base: self.base.deep_clone(cloner),
                delay: self.delay,
            })
        }
    }

    /// Adds a draw from the shared `Random` source to `X`.
    #[derive(Debug)]
    struct Perturb {
        base: OperatorBase,
    }

    impl Perturb {
        fn new() -> Self {
            Self {
                base: OperatorBase::new("Perturb")
                    .with_parameter(Parameter::lookup("X", ItemType::Double))
                    .with_parameter(Parameter::lookup("Random", ItemType::Random)),
            }
        }
    }

    impl Operator for Perturb {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OperatorBase {
            &mut self.base
        }

        fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
            let draw = ctx.with_random("Random", |rng| rng.random_range(0.0..1.0))?;
            let x = ctx.get_double("X")?;
            ctx.set("X", x + draw)?;
            ctx.successor()
        }

        fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
            Box::new(Self {
                base: self.base.deep_clone(cloner),
            })
        }
    }

    /// Blocks until cancelled.
    #[derive(Debug)]
    struct WaitForCancel {
        base: OperatorBase,
    }

    impl Operator for WaitForCancel {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OperatorBase {
            &mut self.base
        }

        fn execute(&self, _ctx: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Option<Operation>> {
            loop {
                token.check()?;
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
            Box::new(Self {
                base: self.base.deep_clone(cloner),
            })
        }
    }

    /// Waits, optionally cancels the token, then fails.
    #[derive(Debug)]
    struct Explode {
        base: OperatorBase,
        cancel: bool,
    }

    impl Explode {
        fn new(cancel: bool) -> Self {
            Self {
                base: OperatorBase::new("Explode"),
                cancel,
            }
        }
    }

    impl Operator for Explode {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OperatorBase {
            &mut self.base
        }

        fn execute(&self, _ctx: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Option<Operation>> {
            thread::sleep(Duration::from_millis(20));
            if self.cancel {
                token.cancel();
            }
            Err(EngineError::execution("Explode", "boom"))
        }

        fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
            Box::new(Self {
                base: self.base.deep_clone(cloner),
                cancel: self.cancel,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<ExecutionState>>,
        ticks: Mutex<usize>,
        errors: Mutex<Vec<EngineError>>,
    }

    impl EngineObserver for Recorder {
        fn execution_state_changed(&self, state: ExecutionState) {
            self.states.lock().push(state);
        }

        fn execution_time_changed(&self, _elapsed: Duration) {
            *self.ticks.lock() += 1;
        }

        fn exception_occurred(&self, error: &EngineError) {
            self.errors.lock().push(error.clone());
        }
    }

    /// `Init -> Main` where `Main` loops `[individuals; Generations += 1]`
    /// until `Generations >= MaxGenerations`.
    fn evolution_graph<O: Operator + 'static>(individual: O, parallel: bool) -> OperatorGraph {
        let mut g = OperatorGraph::new("evolution");
        let individual = g.add(individual);
        let each = g.add(UniformSubScopesProcessor::new("Individuals", Some(individual)).with_parallel(parallel));
        let counter = g.add(IntCounter::new("Generation++"));
        g.set_actual_name(counter, "Value", "Generations").unwrap();
        g.set_successor(each, Some(counter)).unwrap();

        let done = g.add(Comparator::new("Done?", Comparison::GreaterOrEqual));
        g.set_actual_name(done, "Left", "Generations").unwrap();
        g.set_actual_name(done, "Right", "MaxGenerations").unwrap();
        g.set_actual_name(done, "Result", "Terminate").unwrap();

        let main = g.add(Loop::new("Main", Some(each), Some(done)));
        let init = g.add(VariableCreator::new("Init").with_variable("Generations", 0i64));
        g.set_successor(init, Some(main)).unwrap();
        g.set_initial(init).unwrap();
        g
    }

    fn population(n: usize, generations: i64) -> ScopeRef {
        let global = Scope::new("Global");
        global.set_value("MaxGenerations", generations);
        global.set_value("Random", RandomSource::new(42));
        for i in 0..n {
            let individual = Scope::new(i.to_string());
            individual.set_value("X", i as f64);
            global.add_sub_scope(individual).unwrap();
        }
        global
    }

    fn run_to_end(config: EngineConfig, graph: OperatorGraph, global: &ScopeRef) -> Engine {
        let mut engine = Engine::new(config).unwrap();
        engine.prepare(graph, global.clone()).unwrap();
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        engine
    }

    fn full_run_snapshot() -> ScopeSnapshot {
        let global = population(8, 5);
        run_to_end(EngineConfig::sequential(), evolution_graph(Evaluate::new(), false), &global);
        global.snapshot()
    }

    // ================================================================
    // Scheduling
    // ================================================================

    #[test]
    fn test_parallel_branches_write_own_quality() {
        let global = population(8, 5);
        let engine = run_to_end(EngineConfig::default(), evolution_graph(Evaluate::new(), true), &global);

        let snap = global.snapshot();
        assert_eq!(snap.variables["Generations"], Value::Int(5));
        for i in 0..8 {
            let x = i as f64;
            assert_eq!(snap.value_at(&[i], "X"), Some(&Value::Double(x + 5.0)));
            assert_eq!(
                snap.value_at(&[i], "Quality"),
                Some(&Value::Double((x + 4.0) * (x + 4.0)))
            );
        }
        assert!(!snap.variables.contains_key("Quality"));
        assert_eq!(engine.continuation_len(), 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let parallel = population(16, 4);
        run_to_end(EngineConfig::default(), evolution_graph(Evaluate::new(), true), &parallel);
        let sequential = population(16, 4);
        run_to_end(EngineConfig::sequential(), evolution_graph(Evaluate::new(), true), &sequential);
        assert_eq!(parallel.snapshot(), sequential.snapshot());
    }

    #[test]
    fn test_sequential_runs_are_deterministic() {
        let run = |seed: u64| {
            let global = population(5, 3);
            global.set_value("Random", RandomSource::new(seed));
            run_to_end(EngineConfig::sequential(), evolution_graph(Perturb::new(), false), &global);
            global.snapshot()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(7));
    }

    #[test]
    fn test_loop_keeps_continuation_small() {
        let global = population(2, 200);
        let mut engine = Engine::new(EngineConfig::sequential().with_max_stack_depth(8)).unwrap();
        engine
            .prepare(evolution_graph(Evaluate::new(), false), global.clone())
            .unwrap();
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(global.variable("Generations").unwrap().get(), Value::Int(200));
        assert!(engine.executed_operations() > 200 * 5);
    }

    #[test]
    fn test_graph_without_initial_stops_immediately() {
        let mut engine = Engine::default();
        engine.prepare(OperatorGraph::new("empty"), Scope::new("g")).unwrap();
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(engine.executed_operations(), 0);
    }

    // ================================================================
    // Faults
    // ================================================================

    #[test]
    fn test_successor_cycle_faults() {
        let mut g = OperatorGraph::new("cycle");
        let a = g.add(EmptyOperator::new("A"));
        let b = g.add(EmptyOperator::new("B"));
        g.set_successor(a, Some(b)).unwrap();
        g.set_successor(b, Some(a)).unwrap();
        g.set_initial(a).unwrap();

        let recorder = Arc::new(Recorder::default());
        let mut engine = Engine::default();
        engine.add_observer(recorder.clone());
        engine.prepare(g, Scope::new("g")).unwrap();

        let err = engine.start().unwrap_err();
        assert!(matches!(err, EngineError::GraphCycle { ref operator, .. } if operator == "A"));
        assert_eq!(engine.state(), ExecutionState::Faulted);
        assert_eq!(engine.error(), Some(&err));
        assert_eq!(engine.continuation_len(), 1);
        assert_eq!(*recorder.errors.lock(), vec![err]);
        assert!(matches!(
            engine.start(),
            Err(EngineError::InvalidState { action: "start", .. })
        ));
    }

    #[test]
    fn test_stack_bound() {
        let mut g = OperatorGraph::new("wide");
        let children: Vec<OperatorId> = (0..10).map(|i| g.add(EmptyOperator::new(format!("E{i}")))).collect();
        let seq = g.add(SequentialProcessor::new("seq", children));
        g.set_initial(seq).unwrap();

        let mut engine = Engine::new(EngineConfig::default().with_max_stack_depth(3)).unwrap();
        engine.prepare(g, Scope::new("g")).unwrap();
        assert!(matches!(engine.start(), Err(EngineError::GraphCycle { .. })));
    }

    #[test]
    fn test_context_depth_bound() {
        let mut g = OperatorGraph::new("recursive");
        let p = g.add(Placeholder::new("Self", "Operator"));
        g.get_mut(p)
            .unwrap()
            .base_mut()
            .parameters
            .insert(Parameter::fixed("Operator", Value::Operator(p)));
        g.set_initial(p).unwrap();

        let mut engine = Engine::new(EngineConfig::default().with_max_context_depth(50)).unwrap();
        engine.prepare(g, Scope::new("g")).unwrap();
        assert!(matches!(engine.start(), Err(EngineError::GraphCycle { .. })));
        assert_eq!(engine.executed_operations(), 50);
    }

    #[test]
    fn test_resolution_error_faults() {
        let mut g = OperatorGraph::new("g");
        let counter = g.add(IntCounter::new("Counter"));
        g.set_initial(counter).unwrap();
        let global = Scope::new("g");
        global.set_value("Increment", "one");

        let mut engine = Engine::default();
        engine.prepare(g, global).unwrap();
        assert!(matches!(engine.start(), Err(EngineError::TypeMismatch { .. })));
        engine.stop().unwrap();
        assert_eq!(engine.continuation_len(), 0);
    }

    /// Two sub-scopes processed in parallel: `Explode` on the first, `other`
    /// on the second.
    fn exploding_pair(
        cancel: bool,
        other: impl FnOnce(&mut OperatorGraph) -> OperatorId,
    ) -> (OperatorGraph, ScopeRef) {
        let mut g = OperatorGraph::new("pair");
        let explode = g.add(Explode::new(cancel));
        let other = other(&mut g);
        let both = g.add(SubScopesProcessor::new("Both", vec![explode, other]).with_parallel(true));
        g.set_initial(both).unwrap();
        let global = Scope::new("g");
        global.add_sub_scope(Scope::new("0")).unwrap();
        global.add_sub_scope(Scope::new("1")).unwrap();
        (g, global)
    }

    #[test]
    fn test_branch_failure_preferred_over_sibling_cancellation() {
        let (g, global) = exploding_pair(true, |g| {
            g.add(WaitForCancel {
                base: OperatorBase::new("Wait"),
            })
        });
        let mut engine = Engine::default();
        engine.prepare(g, global).unwrap();

        let err = engine.start().unwrap_err();
        assert_eq!(err, EngineError::execution("Explode", "boom"));
        assert_eq!(engine.state(), ExecutionState::Faulted);
        assert_eq!(engine.error(), Some(&err));
        // Both interrupted branches are kept as one parallel collection.
        assert_eq!(engine.continuation_len(), 1);
    }

    #[test]
    fn test_branch_failure_halts_siblings() {
        let (g, global) = exploding_pair(false, |g| {
            let body = g.add(EmptyOperator::new("Body"));
            g.add(Loop::new("Forever", Some(body), None))
        });
        let mut engine = Engine::default();
        engine.prepare(g, global).unwrap();

        assert_eq!(
            engine.start().unwrap_err(),
            EngineError::execution("Explode", "boom")
        );
        assert_eq!(engine.continuation_len(), 1);
        engine.stop().unwrap();
        assert_eq!(engine.continuation_len(), 0);
    }

    #[test]
    fn test_one_graph_runs_twice_from_equal_scopes() {
        let mut g = OperatorGraph::new("shared");
        let counter = g.add(IntCounter::new("Counter"));
        g.get_mut(counter)
            .unwrap()
            .base_mut()
            .parameters
            .insert(Parameter::lookup("Value", ItemType::Int).with_default(0i64));
        let perturb = g.add(Perturb::new());
        g.get_mut(perturb)
            .unwrap()
            .base_mut()
            .parameters
            .insert(Parameter::lookup("Random", ItemType::Random).with_default(RandomSource::new(5)));
        g.set_successor(counter, Some(perturb)).unwrap();
        g.set_initial(counter).unwrap();
        let graph = Arc::new(g);

        let run = || {
            let global = Scope::new("g");
            global.set_value("X", 0.0);
            let mut engine = Engine::new(EngineConfig::sequential()).unwrap();
            engine.prepare(graph.clone(), global.clone()).unwrap();
            assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
            global.snapshot()
        };
        let first = run();
        assert_eq!(first.variables["Value"], Value::Int(1));
        assert_eq!(run(), first);
        assert_eq!(run(), first);
    }

    // ================================================================
    // Lifecycle
    // ================================================================

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Engine::new(EngineConfig::default().with_max_stack_depth(0)),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_start_requires_prepare() {
        let mut engine = Engine::default();
        assert_eq!(
            engine.start().unwrap_err(),
            EngineError::InvalidState {
                action: "start",
                state: ExecutionState::Stopped
            }
        );
    }

    #[test]
    fn test_observer_sees_transitions() {
        let recorder = Arc::new(Recorder::default());
        let global = population(2, 1);
        let mut engine = Engine::default();
        engine.add_observer(recorder.clone());
        engine
            .prepare(evolution_graph(Evaluate::new(), false), global)
            .unwrap();
        engine.start().unwrap();

        assert_eq!(
            *recorder.states.lock(),
            vec![
                ExecutionState::Ready,
                ExecutionState::Running,
                ExecutionState::Stopped
            ]
        );
        assert!(*recorder.ticks.lock() >= 1);
    }

    #[test]
    fn test_step_then_resume_matches_full_run() {
        let expected = full_run_snapshot();
        let global = population(8, 5);
        let mut engine = Engine::new(EngineConfig::sequential()).unwrap();
        engine
            .prepare(evolution_graph(Evaluate::new(), false), global.clone())
            .unwrap();
        for _ in 0..7 {
            assert_eq!(engine.step().unwrap(), ExecutionState::Paused);
        }
        assert_eq!(engine.executed_operations(), 7);
        assert!(engine.continuation_len() > 0);

        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(global.snapshot(), expected);
    }

    #[test]
    fn test_paused_engine_clone_resumes_independently() {
        let expected = full_run_snapshot();
        let global = population(8, 5);
        let mut engine = Engine::default();
        engine
            .prepare(evolution_graph(Evaluate::new(), true), global.clone())
            .unwrap();
        for _ in 0..10 {
            engine.step().unwrap();
        }
        let paused = global.snapshot();

        let mut copy = engine.deep_clone(&mut Cloner::new());
        assert_eq!(copy.state(), ExecutionState::Paused);
        assert_eq!(copy.continuation_len(), engine.continuation_len());
        assert_eq!(copy.start().unwrap(), ExecutionState::Stopped);

        let copy_global = copy.global_scope().unwrap().clone();
        assert!(!Arc::ptr_eq(&copy_global, &global));
        assert_eq!(copy_global.snapshot(), expected);
        assert_eq!(global.snapshot(), paused);

        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(global.snapshot(), expected);
    }

    #[test]
    fn test_pause_from_other_thread_then_stop() {
        let mut g = OperatorGraph::new("forever");
        let body = g.add(EmptyOperator::new("Body"));
        let main = g.add(Loop::new("Main", Some(body), None));
        g.set_initial(main).unwrap();

        let mut engine = Engine::default();
        engine.prepare(g, Scope::new("g")).unwrap();
        let handle = engine.handle();
        let pauser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.pause();
        });
        assert_eq!(engine.start().unwrap(), ExecutionState::Paused);
        pauser.join().unwrap();
        assert!(engine.continuation_len() > 0);
        assert!(engine.execution_time() > Duration::ZERO);

        engine.stop().unwrap();
        assert_eq!(engine.state(), ExecutionState::Stopped);
        assert_eq!(engine.continuation_len(), 0);
        assert!(engine.stop().is_err());
    }

    #[test]
    fn test_pause_during_parallel_branches_then_clone() {
        let expected = {
            let global = population(8, 10);
            run_to_end(EngineConfig::sequential(), evolution_graph(Evaluate::new(), false), &global);
            global.snapshot()
        };
        let global = population(8, 10);
        let mut engine = Engine::default();
        engine
            .prepare(
                evolution_graph(Evaluate::slow(Duration::from_millis(5)), true),
                global.clone(),
            )
            .unwrap();
        let handle = engine.handle();
        let pauser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            handle.pause();
        });
        assert_eq!(engine.start().unwrap(), ExecutionState::Paused);
        pauser.join().unwrap();
        assert!(engine.continuation_len() > 0);
        let paused = global.snapshot();

        let mut copy = engine.deep_clone(&mut Cloner::new());
        assert_eq!(copy.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(copy.global_scope().unwrap().snapshot(), expected);
        assert_eq!(global.snapshot(), paused);

        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(global.snapshot(), expected);
    }

    #[test]
    fn test_pause_before_start_is_honoured() {
        let global = population(2, 2);
        let mut engine = Engine::default();
        engine
            .prepare(evolution_graph(Evaluate::new(), false), global)
            .unwrap();
        engine.handle().pause();
        assert_eq!(engine.start().unwrap(), ExecutionState::Paused);
        assert_eq!(engine.executed_operations(), 0);
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
    }

    #[test]
    fn test_stop_from_other_thread() {
        let mut g = OperatorGraph::new("forever");
        let body = g.add(EmptyOperator::new("Body"));
        let main = g.add(Loop::new("Main", Some(body), None));
        g.set_initial(main).unwrap();
        let global = Scope::new("g");
        global.set_value("Kept", 1i64);

        let mut engine = Engine::default();
        engine.prepare(g, global.clone()).unwrap();
        let handle = engine.handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.stop();
        });
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        stopper.join().unwrap();
        assert_eq!(engine.continuation_len(), 0);
        assert!(global.contains_variable("Kept"));
    }

    #[test]
    fn test_abort_cancels_running_operator() {
        let mut g = OperatorGraph::new("blocking");
        let wait = g.add(WaitForCancel {
            base: OperatorBase::new("Wait"),
        });
        g.set_initial(wait).unwrap();

        let mut engine = Engine::default();
        engine.prepare(g, Scope::new("g")).unwrap();
        let handle = engine.handle();
        let aborter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.abort();
        });
        assert_eq!(engine.start().unwrap(), ExecutionState::Aborted);
        aborter.join().unwrap();
        assert!(engine.error().is_none());
    }

    #[test]
    fn test_external_token_stops_run() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut g = OperatorGraph::new("blocking");
        let wait = g.add(WaitForCancel {
            base: OperatorBase::new("Wait"),
        });
        g.set_initial(wait).unwrap();

        let mut engine = Engine::default().with_token(CancellationToken::from(flag.clone()));
        engine.prepare(g, Scope::new("g")).unwrap();
        let watchdog = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::Relaxed);
        });
        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        watchdog.join().unwrap();
    }

    #[test]
    fn test_prepare_keeps_external_cancellation() {
        let token = CancellationToken::new();
        let mut g = OperatorGraph::new("g");
        let counter = g.add(IntCounter::new("Counter"));
        g.set_initial(counter).unwrap();

        let mut engine = Engine::default().with_token(token.clone());
        token.cancel();
        engine.prepare(g, Scope::new("g")).unwrap();
        assert!(token.is_cancelled());

        let copy = engine.deep_clone(&mut Cloner::new());
        assert!(copy.handle().token().is_cancelled());

        assert_eq!(engine.start().unwrap(), ExecutionState::Stopped);
        assert_eq!(engine.executed_operations(), 0);
    }

    #[test]
    fn test_prepare_resets_run() {
        let global = population(2, 2);
        let mut engine = run_to_end(EngineConfig::default(), evolution_graph(Evaluate::new(), false), &global);
        assert!(engine.executed_operations() > 0);

        engine
            .prepare(evolution_graph(Evaluate::new(), false), population(2, 2))
            .unwrap();
        assert_eq!(engine.state(), ExecutionState::Ready);
        assert_eq!(engine.executed_operations(), 0);
        assert_eq!(engine.execution_time(), Duration::ZERO);
        assert_eq!(engine.continuation_len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_parallel_equivalent_to_sequential(n in 1usize..12, generations in 1i64..5) {
            let parallel = population(n, generations);
            run_to_end(EngineConfig::default(), evolution_graph(Evaluate::new(), true), &parallel);
            let sequential = population(n, generations);
            run_to_end(EngineConfig::sequential(), evolution_graph(Evaluate::new(), true), &sequential);
            prop_assert_eq!(parallel.snapshot(), sequential.snapshot());
        }
    }
}
