//! Leaf operators that every algorithm graph needs.

use super::context::ExecutionContext;
use super::operation::Operation;
use super::types::{Operator, OperatorBase};
use crate::cloner::{Cloner, DeepClone};
use crate::engine::CancellationToken;
use crate::error::{EngineError, Result};
use crate::item::{ItemType, Value};
use crate::parameter::{self, Parameter, Translation};
use crate::scope::Scope;
use std::cmp::Ordering;
use std::sync::Arc;

macro_rules! impl_base {
    () => {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OperatorBase {
            &mut self.base
        }
    };
}

/// Does nothing and continues with its successor.
#[derive(Debug, Clone)]
pub struct EmptyOperator {
    base: OperatorBase,
}

impl EmptyOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name),
        }
    }
}

impl Operator for EmptyOperator {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}

/// Writes a deep copy of `Right` to `Left`.
#[derive(Debug, Clone)]
pub struct Assigner {
    base: OperatorBase,
}

impl Assigner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("Left", ItemType::Any))
                .with_parameter(Parameter::lookup("Right", ItemType::Any)),
        }
    }
}

impl Operator for Assigner {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let right = ctx.get("Right")?;
        ctx.set_item("Left", Cloner::clone_one(&right))?;
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}

/// Adds `Increment` (default 1) to the integer `Value`. A missing `Value`
/// starts from its default, or 0, and is created in the bound scope.
#[derive(Debug, Clone)]
pub struct IntCounter {
    base: OperatorBase,
}

impl IntCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("Value", ItemType::Int))
                .with_parameter(Parameter::lookup("Increment", ItemType::Int).with_default(1i64)),
        }
    }
}

impl Operator for IntCounter {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let increment = ctx.get_int("Increment")?;
        match parameter::resolve_variable(ctx, "Value")? {
            Some(item) => {
                let mut value = item.write();
                let current = value.as_int().unwrap_or(0);
                *value = Value::Int(current.wrapping_add(increment));
            }
            None => {
                let start = match ctx.get_optional("Value")? {
                    Some(item) => item.get().as_int().unwrap_or(0),
                    None => 0,
                };
                ctx.set("Value", start.wrapping_add(increment))?;
            }
        }
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}

/// Relation tested by a [`Comparator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Comparison {
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
            Comparison::Greater => ordering == Ordering::Greater,
        }
    }
}

/// Compares `Left` with `Right` and writes the outcome to the boolean
/// `Result`.
///
/// Numbers compare numerically (an integer against a double widens),
/// booleans and strings compare with their natural order. Any other pairing
/// fails.
#[derive(Debug, Clone)]
pub struct Comparator {
    base: OperatorBase,
    comparison: Comparison,
}

impl Comparator {
    pub fn new(name: impl Into<String>, comparison: Comparison) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("Left", ItemType::Any))
                .with_parameter(Parameter::lookup("Right", ItemType::Any))
                .with_parameter(Parameter::lookup("Result", ItemType::Bool)),
            comparison,
        }
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.as_double()?.partial_cmp(&right.as_double()?),
    }
}

impl Operator for Comparator {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let left = ctx.value("Left")?;
        let right = ctx.value("Right")?;
        let ordering = compare(&left, &right).ok_or_else(|| {
            EngineError::execution(
                self.name(),
                format!("cannot compare {} with {}", left.item_type(), right.item_type()),
            )
        })?;
        ctx.set("Result", self.comparison.holds(ordering))?;
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            comparison: self.comparison,
        })
    }
}

/// Creates variables in the bound scope from its parameters' defaults.
///
/// Each parameter with a default creates a variable under the parameter's
/// translated name, holding a copy of the default. Variables that already
/// exist in the bound scope are left alone.
#[derive(Debug, Clone)]
pub struct VariableCreator {
    base: OperatorBase,
}

impl VariableCreator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name),
        }
    }

    /// Declares a variable to create with its initial value.
    pub fn with_variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let data_type = value.item_type();
        self.base
            .parameters
            .insert(Parameter::lookup(name, data_type).with_default(value));
        self
    }
}

impl Operator for VariableCreator {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let scope = ctx.scope();
        for param in self.parameters().iter() {
            let Translation::Variable { name, default, .. } = parameter::translate(ctx, param.name())? else {
                continue;
            };
            let Some(initial) = default else {
                continue;
            };
            if !scope.contains_variable(&name) {
                tracing::trace!(variable = %name, scope = %scope.name(), "creating variable");
                scope.set_variable(name, Cloner::clone_one(&initial));
            }
        }
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}

/// Appends `NumberOfSubScopes` empty sub-scopes, named by their index.
#[derive(Debug, Clone)]
pub struct SubScopesCreator {
    base: OperatorBase,
}

impl SubScopesCreator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("NumberOfSubScopes", ItemType::Int)),
        }
    }
}

impl Operator for SubScopesCreator {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Option<Operation>> {
        let count = ctx.get_int("NumberOfSubScopes")?;
        let count = usize::try_from(count).map_err(|_| {
            EngineError::execution(self.name(), format!("negative sub-scope count {count}"))
        })?;
        let scope = ctx.scope();
        let existing = scope.sub_scope_count();
        for i in 0..count {
            token.check()?;
            scope.add_sub_scope(Scope::new((existing + i).to_string()))?;
        }
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}

/// Removes the sub-scope at `SubScopeIndex`, or every sub-scope when built
/// with [`SubScopesRemover::all`].
#[derive(Debug, Clone)]
pub struct SubScopesRemover {
    base: OperatorBase,
    remove_all: bool,
}

impl SubScopesRemover {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("SubScopeIndex", ItemType::Int).with_default(0i64)),
            remove_all: false,
        }
    }

    pub fn all(name: impl Into<String>) -> Self {
        Self {
            remove_all: true,
            ..Self::new(name)
        }
    }

    pub fn removes_all(&self) -> bool {
        self.remove_all
    }
}

impl Operator for SubScopesRemover {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, _token: &CancellationToken) -> Result<Option<Operation>> {
        let scope = ctx.scope();
        if self.remove_all {
            scope.clear_sub_scopes();
        } else {
            let index = ctx.get_int("SubScopeIndex")?;
            usize::try_from(index)
                .ok()
                .and_then(|i| scope.remove_sub_scope(i))
                .ok_or_else(|| {
                    EngineError::execution(
                        self.name(),
                        format!(
                            "sub-scope index {index} out of range ({} sub-scopes)",
                            scope.sub_scope_count()
                        ),
                    )
                })?;
        }
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
            remove_all: self.remove_all,
        })
    }
}

/// Appends a deep copy of the sub-scope at `SubScopeIndex`.
///
/// Negative indexes count from the end; the default -1 copies the last
/// sub-scope. The copy is named by its new index.
#[derive(Debug, Clone)]
pub struct SubScopeDuplicator {
    base: OperatorBase,
}

impl SubScopeDuplicator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: OperatorBase::new(name)
                .with_parameter(Parameter::lookup("SubScopeIndex", ItemType::Int).with_default(-1i64)),
        }
    }
}

impl Operator for SubScopeDuplicator {
    impl_base!();

    fn execute(&self, ctx: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Option<Operation>> {
        let scope = ctx.scope();
        let count = scope.sub_scope_count();
        let index = ctx.get_int("SubScopeIndex")?;
        let position = if index < 0 {
            (count as i64).checked_add(index)
        } else {
            Some(index)
        };
        let source = position
            .and_then(|p| usize::try_from(p).ok())
            .and_then(|p| scope.sub_scope(p))
            .ok_or_else(|| {
                EngineError::execution(
                    self.name(),
                    format!("sub-scope index {index} out of range ({count} sub-scopes)"),
                )
            })?;

        token.check()?;
        let copy = Cloner::clone_one(&source);
        copy.rename(count.to_string());
        scope.add_sub_scope(copy)?;
        ctx.successor()
    }

    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.deep_clone(cloner),
        })
    }
}
