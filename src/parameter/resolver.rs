//! Actual-name translation and scope-chain lookup.

use crate::cloner::Cloner;
use crate::error::{EngineError, Result};
use crate::item::{ItemRef, ItemType};
use crate::operator::ExecutionContext;
use crate::scope::ScopeRef;
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on the number of names one alias chain may pass through.
pub const MAX_ALIAS_DEPTH: usize = 256;

/// Outcome of translating a parameter through the context chain.
#[derive(Debug, Clone)]
pub enum Translation {
    /// The chain ended at a parameter with a fixed value.
    Fixed { value: ItemRef, data_type: ItemType },
    /// The chain ended at a variable name to look up in the scope chain.
    Variable {
        name: String,
        default: Option<ItemRef>,
        data_type: ItemType,
    },
}

/// Follows the actual-name chain of `parameter` starting at `context`.
///
/// At each context frame, a parameter whose logical name equals the current
/// name either fixes the value or renames it. A rename to a different name
/// re-examines the same frame; otherwise the walk moves to the parent frame.
/// A `(frame, name)` pair met twice is an
/// [`AliasCycle`](EngineError::AliasCycle).
pub fn translate(context: &ExecutionContext, parameter: &str) -> Result<Translation> {
    let declared = context
        .parameters()?
        .get(parameter)
        .ok_or_else(|| EngineError::UnknownParameter {
            operator: context.operator_name(),
            parameter: parameter.to_string(),
        })?;
    let data_type = declared.data_type();

    let mut current = parameter.to_string();
    let mut chain = vec![current.clone()];
    let mut visited: HashSet<(usize, String)> = HashSet::new();
    let mut default: Option<ItemRef> = None;
    let mut frame: Option<&ExecutionContext> = Some(context);

    while let Some(ctx) = frame {
        let Some(param) = ctx.parameters()?.get(&current) else {
            frame = ctx.parent().map(Arc::as_ref);
            continue;
        };

        if !visited.insert((ctx.depth(), current.clone())) || chain.len() > MAX_ALIAS_DEPTH {
            return Err(EngineError::AliasCycle {
                parameter: parameter.to_string(),
                chain,
            });
        }
        if let Some(value) = param.fixed_value() {
            return Ok(Translation::Fixed {
                value: value.clone(),
                data_type,
            });
        }
        if default.is_none() {
            default = param.default_value().cloned();
        }

        let next = param.actual_name();
        if next == current {
            frame = ctx.parent().map(Arc::as_ref);
        } else {
            current = next.to_string();
            chain.push(current.clone());
        }
    }

    Ok(Translation::Variable {
        name: current,
        default,
        data_type,
    })
}

/// Resolves `parameter` of the operator bound to `context` to an item.
///
/// A variable found along the scope chain is returned shared, so writes
/// through it land in the scope tree. Fixed values and defaults belong to
/// the graph and are returned as detached copies.
pub fn resolve(context: &ExecutionContext, parameter: &str) -> Result<ItemRef> {
    match translate(context, parameter)? {
        Translation::Fixed { value, data_type } => detached(parameter, data_type, &value),
        Translation::Variable {
            name,
            default,
            data_type,
        } => match find_variable(context, &name) {
            Some((_, item)) => {
                check_type(parameter, data_type, &item)?;
                Ok(item)
            }
            None => match default {
                Some(default) => detached(parameter, data_type, &default),
                None => Err(EngineError::UnknownVariable { name }),
            },
        },
    }
}

/// Like [`resolve`], but a missing variable without default is `Ok(None)`.
pub fn resolve_optional(context: &ExecutionContext, parameter: &str) -> Result<Option<ItemRef>> {
    match resolve(context, parameter) {
        Err(EngineError::UnknownVariable { .. }) => Ok(None),
        other => other.map(Some),
    }
}

/// Resolves `parameter` against the scope chain only, ignoring fixed values
/// and defaults.
pub fn resolve_variable(context: &ExecutionContext, parameter: &str) -> Result<Option<ItemRef>> {
    match translate(context, parameter)? {
        Translation::Fixed { .. } => Ok(None),
        Translation::Variable { name, data_type, .. } => match find_variable(context, &name) {
            Some((_, item)) => {
                check_type(parameter, data_type, &item)?;
                Ok(Some(item))
            }
            None => Ok(None),
        },
    }
}

fn detached(parameter: &str, data_type: ItemType, item: &ItemRef) -> Result<ItemRef> {
    check_type(parameter, data_type, item)?;
    Ok(Cloner::clone_one(item))
}

/// Writes `value` through `parameter`.
///
/// If a variable with the translated name exists along the scope chain it is
/// rebound where it lives; otherwise the variable is created in the scope
/// bound to `context`.
pub fn assign(context: &ExecutionContext, parameter: &str, value: ItemRef) -> Result<()> {
    match translate(context, parameter)? {
        Translation::Fixed { .. } => Err(EngineError::ReadOnlyParameter {
            parameter: parameter.to_string(),
        }),
        Translation::Variable {
            name, data_type, ..
        } => {
            check_type(parameter, data_type, &value)?;
            let target = find_variable(context, &name)
                .map(|(scope, _)| scope)
                .unwrap_or_else(|| context.scope().clone());
            target.set_variable(name, value);
            Ok(())
        }
    }
}

/// Scopes searched for variables: the bound scope, then the scopes of the
/// parent context chain with consecutive repeats skipped.
pub(crate) fn scope_chain(context: &ExecutionContext) -> Vec<ScopeRef> {
    let mut scopes: Vec<ScopeRef> = Vec::new();
    let mut frame = Some(context);
    while let Some(ctx) = frame {
        if !scopes.last().is_some_and(|last| Arc::ptr_eq(last, ctx.scope())) {
            scopes.push(ctx.scope().clone());
        }
        frame = ctx.parent().map(Arc::as_ref);
    }
    scopes
}

fn find_variable(context: &ExecutionContext, name: &str) -> Option<(ScopeRef, ItemRef)> {
    scope_chain(context)
        .into_iter()
        .find_map(|scope| scope.variable(name).map(|item| (scope, item)))
}

fn check_type(parameter: &str, expected: ItemType, item: &ItemRef) -> Result<()> {
    let found = item.item_type();
    if expected.accepts(found) {
        Ok(())
    } else {
        Err(EngineError::TypeMismatch {
            parameter: parameter.to_string(),
            expected,
            found,
        })
    }
}
