//! Composite operators.
//!
//! These nodes do no domain work. They return an [`Operation`] describing
//! which child operators run against which scopes, and whether in sequence
//! or as parallel branches. Loops re-enter themselves through the
//! continuation instead of recursing, so stack depth stays bounded however
//! many iterations run.

use super::context::ExecutionContext;
use super::operation::Operation;
use super::types::{operator_parameter, Operator, OperatorBase, OperatorId};
use crate::cloner::{Cloner, DeepClone};
use crate::engine::CancellationToken;
use crate::error::{EngineError, Result};
use crate::item::ItemType;
use crate::parameter::Parameter;
use std::sync::Arc;

fn parallel_parameter() -> Parameter {
    Parameter::lookup("Parallel", ItemType::Bool)
        .with_default(false)
        .with_description("Run the branches on the worker pool.")
}

fn remap(ids: &[OperatorId], cloner: &Cloner) -> Vec<OperatorId> {
    ids.iter().map(|&id| cloner.operator(id)).collect()
}

fn branches(ctx: &Arc<ExecutionContext>, ops: Vec<Operation>) -> Result<Option<Operation>> {
    let batch = if ctx.get_bool("Parallel")? {
        Operation::parallel(ops)
    } else {
        Operation::sequence(ops)
    };
    ctx.then_successor(batch.into_iter().collect())
}

/// Runs its operators one after another on the bound scope.
#[derive(Debug, Clone)]
pub struct SequentialProcessor {
    base: OperatorBase,
    operators: Vec<OperatorId>,
}

impl SequentialProcessor {
    pub fn new(name: impl Into<String>, operators: Vec<OperatorId>) -> Self {
        Self {
            base: OperatorBase::new(name),
            operators,
        }
    }
}

impl Operator for SequentialProcessor {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let ops = self
            .operators
            .iter()
            .map(|&id| ctx.child(id, ctx.scope().clone()))
            .collect();
        ctx.then_successor(ops)
    }

    fn children(&self) -> Vec<OperatorId> {
        self.operators.clone()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            operators: remap(&self.operators, cloner),
        })
    }
}

/// Runs operator *i* on sub-scope *i* of the bound scope.
///
/// Fails if the scope has fewer sub-scopes than the processor has
/// operators. With `Parallel` true the branches run concurrently.
#[derive(Debug, Clone)]
pub struct SubScopesProcessor {
    base: OperatorBase,
    operators: Vec<OperatorId>,
}

impl SubScopesProcessor {
    pub fn new(name: impl Into<String>, operators: Vec<OperatorId>) -> Self {
        Self {
            base: OperatorBase::new(name).with_parameter(parallel_parameter()),
            operators,
        }
    }

    /// Fixes the `Parallel` parameter.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.base.parameters.insert(Parameter::fixed("Parallel", parallel));
        self
    }
}

impl Operator for SubScopesProcessor {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let subs = ctx.scope().sub_scopes();
        if subs.len() < self.operators.len() {
            return Err(EngineError::execution(
                self.name(),
                format!(
                    "{} operators but only {} sub-scopes",
                    self.operators.len(),
                    subs.len()
                ),
            ));
        }
        let ops = self
            .operators
            .iter()
            .zip(subs)
            .map(|(&id, scope)| ctx.child(id, scope))
            .collect();
        branches(ctx, ops)
    }

    fn children(&self) -> Vec<OperatorId> {
        self.operators.clone()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            operators: remap(&self.operators, cloner),
        })
    }
}

/// Runs one operator on every scope `depth` levels below the bound scope.
#[derive(Debug, Clone)]
pub struct UniformSubScopesProcessor {
    base: OperatorBase,
    operator: Option<OperatorId>,
    depth: usize,
}

impl UniformSubScopesProcessor {
    pub fn new(name: impl Into<String>, operator: Option<OperatorId>) -> Self {
        Self {
            base: OperatorBase::new(name).with_parameter(parallel_parameter()),
            operator,
            depth: 1,
        }
    }

    /// Fixes the `Parallel` parameter.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.base.parameters.insert(Parameter::fixed("Parallel", parallel));
        self
    }

    /// Targets scopes this many levels down (at least 1).
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Operator for UniformSubScopesProcessor {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let ops = match self.operator {
            Some(id) => ctx
                .scope()
                .scopes_at_depth(self.depth)
                .into_iter()
                .map(|scope| ctx.child(id, scope))
                .collect(),
            None => Vec::new(),
        };
        branches(ctx, ops)
    }

    fn children(&self) -> Vec<OperatorId> {
        self.operator.into_iter().collect()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            operator: self.operator.map(|id| cloner.operator(id)),
            depth: self.depth,
        })
    }
}

/// Runs the true or false branch depending on the `Condition` parameter,
/// then its successor.
#[derive(Debug, Clone)]
pub struct ConditionalBranch {
    base: OperatorBase,
    true_branch: Option<OperatorId>,
    false_branch: Option<OperatorId>,
}

impl ConditionalBranch {
    pub fn new(
        name: impl Into<String>,
        true_branch: Option<OperatorId>,
        false_branch: Option<OperatorId>,
    ) -> Self {
        Self {
            base: OperatorBase::new(name).with_parameter(Parameter::lookup("Condition", ItemType::Bool)),
            true_branch,
            false_branch,
        }
    }
}

impl Operator for ConditionalBranch {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let branch = if ctx.get_bool("Condition")? {
            self.true_branch
        } else {
            self.false_branch
        };
        let ops = branch
            .map(|id| ctx.child(id, ctx.scope().clone()))
            .into_iter()
            .collect();
        ctx.then_successor(ops)
    }

    fn children(&self) -> Vec<OperatorId> {
        self.true_branch.into_iter().chain(self.false_branch).collect()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            true_branch: self.true_branch.map(|id| cloner.operator(id)),
            false_branch: self.false_branch.map(|id| cloner.operator(id)),
        })
    }
}

/// Repeats `body` then `terminator` until the `Terminate` parameter reads
/// true, then runs its successor.
///
/// `Terminate` is checked before every iteration and defaults to false. The
/// terminator operator is expected to write it. Each iteration is scheduled
/// as `[body, terminator, loop]` on the continuation.
#[derive(Debug, Clone)]
pub struct Loop {
    base: OperatorBase,
    body: Option<OperatorId>,
    terminator: Option<OperatorId>,
}

impl Loop {
    pub fn new(name: impl Into<String>, body: Option<OperatorId>, terminator: Option<OperatorId>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("Terminate", ItemType::Bool).with_default(false)),
            body,
            terminator,
        }
    }
}

impl Operator for Loop {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        if ctx.get_bool("Terminate")? {
            return ctx.successor();
        }
        let mut ops: Vec<Operation> = self
            .body
            .iter()
            .chain(self.terminator.iter())
            .map(|&id| ctx.child(id, ctx.scope().clone()))
            .collect();
        ops.push(ctx.reenter()?);
        Ok(Operation::sequence(ops))
    }

    fn children(&self) -> Vec<OperatorId> {
        self.body.into_iter().chain(self.terminator).collect()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            body: self.body.map(|id| cloner.operator(id)),
            terminator: self.terminator.map(|id| cloner.operator(id)),
        })
    }
}

/// Runs whatever operator its `Operator` parameter resolves to.
///
/// Rewiring the parameter's actual name (say to `"Evaluator"`) lets a graph
/// pick the operator from a variable or an enclosing parameter at run time.
#[derive(Debug, Clone)]
pub struct Placeholder {
    base: OperatorBase,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, actual_name: &str) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(operator_parameter("Operator").with_actual_name(actual_name)),
        }
    }
}

impl Operator for Placeholder {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let target = ctx.get_operator("Operator")?;
        ctx.graph().get(target)?;
        ctx.then_successor(vec![ctx.child(target, ctx.scope().clone())])
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}
