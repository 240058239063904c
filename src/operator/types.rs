//! The operator contract.

use super::context::ExecutionContext;
use super::operation::Operation;
use crate::cloner::{Cloner, DeepClone};
use crate::engine::CancellationToken;
use crate::error::Result;
use crate::item::{ItemType, Value};
use crate::parameter::{Parameter, ParameterCollection};
use std::fmt;
use std::sync::Arc;

/// Handle to a node of an [`OperatorGraph`](super::OperatorGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorId(pub usize);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State every operator carries: its name, declared parameters and
/// optional successor.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorBase {
    pub name: String,
    pub parameters: ParameterCollection,
    pub successor: Option<OperatorId>,
}

impl OperatorBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: ParameterCollection::new(),
            successor: None,
        }
    }

    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.parameters.insert(param);
        self
    }
}

impl DeepClone for OperatorBase {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.deep_clone(cloner),
            successor: self.successor.map(|id| cloner.operator(id)),
        }
    }
}

/// A node of an operator graph.
///
/// `execute` is called with a context binding this operator to one scope.
/// It reads and writes state only through its declared parameters (see
/// [`ExecutionContext::get`] and [`ExecutionContext::set`]) and returns the
/// next [`Operation`] to schedule: usually its successor, for composite
/// operators a collection of child operations, or `None`.
///
/// Long-running operators must poll `token` and return
/// [`EngineError::Cancelled`](crate::EngineError::Cancelled) promptly once
/// it is set.
///
/// # Implementing
///
/// ```
/// use std::sync::Arc;
/// use u_opgraph::cloner::{Cloner, DeepClone};
/// use u_opgraph::engine::CancellationToken;
/// use u_opgraph::item::ItemType;
/// use u_opgraph::operator::{ExecutionContext, Operation, Operator, OperatorBase};
/// use u_opgraph::parameter::Parameter;
/// use u_opgraph::Result;
///
/// #[derive(Debug)]
/// struct Square {
///     base: OperatorBase,
/// }
///
/// impl Operator for Square {
///     fn base(&self) -> &OperatorBase { &self.base }
///     fn base_mut(&mut self) -> &mut OperatorBase { &mut self.base }
///
///     fn execute(
///         &self,
///         ctx: &Arc<ExecutionContext>,
///         _token: &CancellationToken,
///     ) -> Result<Option<Operation>> {
///         let x = ctx.get_double("X")?;
///         ctx.set("X", x * x)?;
///         ctx.successor()
///     }
///
///     fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator> {
///         Box::new(Square { base: self.base.deep_clone(cloner) })
///     }
/// }
///
/// let op = Square {
///     base: OperatorBase::new("Square").with_parameter(Parameter::lookup("X", ItemType::Double)),
/// };
/// assert_eq!(op.name(), "Square");
/// ```
pub trait Operator: fmt::Debug + Send + Sync {
    fn base(&self) -> &OperatorBase;

    fn base_mut(&mut self) -> &mut OperatorBase;

    /// Performs this operator's work and returns what to run next.
    fn execute(
        &self,
        context: &Arc<ExecutionContext>,
        token: &CancellationToken,
    ) -> Result<Option<Operation>>;

    /// Copies this operator, translating every [`OperatorId`] it holds
    /// through `cloner`.
    fn clone_operator(&self, cloner: &mut Cloner) -> Box<dyn Operator>;

    /// Sub-operators this node schedules, excluding its successor.
    fn children(&self) -> Vec<OperatorId> {
        Vec::new()
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn parameters(&self) -> &ParameterCollection {
        &self.base().parameters
    }

    fn successor(&self) -> Option<OperatorId> {
        self.base().successor
    }

    /// Every operator id this node can reach directly: successor, children,
    /// and operator values held by its parameter declarations.
    fn references(&self) -> Vec<OperatorId> {
        let mut refs: Vec<OperatorId> = self.successor().into_iter().collect();
        refs.extend(self.children());
        for param in self.parameters().iter() {
            for item in param.held_values() {
                if let Value::Operator(id) = *item.read() {
                    refs.push(id);
                }
            }
        }
        refs
    }
}

/// Declares a lookup parameter of type `Operator`, used by operators that
/// pick what to run by name at execution time.
pub fn operator_parameter(name: &str) -> Parameter {
    Parameter::lookup(name, ItemType::Operator)
}
