//! Arena of operators addressed by [`OperatorId`].

use super::types::{Operator, OperatorId};
use crate::cloner::{Cloner, DeepClone};
use crate::error::{EngineError, Result};
use crate::parameter::ParameterCollection;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// An algorithm's operator graph.
///
/// Operators live in an arena and refer to each other by [`OperatorId`], so
/// shared nodes and successor cycles need no shared pointers. The graph also
/// carries the algorithm's own parameters, visible to every operator through
/// the root execution context.
///
/// # Examples
///
/// ```
/// use u_opgraph::operator::{EmptyOperator, OperatorGraph};
///
/// let mut graph = OperatorGraph::new("demo");
/// let a = graph.add(EmptyOperator::new("A"));
/// let b = graph.add(EmptyOperator::new("B"));
/// graph.set_successor(a, Some(b)).unwrap();
/// graph.set_initial(a).unwrap();
///
/// assert_eq!(graph.reachable(a).unwrap(), vec![a, b]);
/// assert!(graph.validate().is_ok());
/// ```
#[derive(Debug)]
pub struct OperatorGraph {
    name: String,
    parameters: ParameterCollection,
    operators: Vec<Box<dyn Operator>>,
    initial: Option<OperatorId>,
}

impl OperatorGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: ParameterCollection::new(),
            operators: Vec::new(),
            initial: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterCollection {
        &mut self.parameters
    }

    /// Adds an operator and returns its id.
    pub fn add<O: Operator + 'static>(&mut self, operator: O) -> OperatorId {
        self.add_boxed(Box::new(operator))
    }

    pub fn add_boxed(&mut self, operator: Box<dyn Operator>) -> OperatorId {
        self.operators.push(operator);
        OperatorId(self.operators.len() - 1)
    }

    pub fn get(&self, id: OperatorId) -> Result<&dyn Operator> {
        self.operators
            .get(id.0)
            .map(|op| op.as_ref())
            .ok_or(EngineError::UnknownOperator(id))
    }

    pub fn get_mut(&mut self, id: OperatorId) -> Result<&mut dyn Operator> {
        match self.operators.get_mut(id.0) {
            Some(op) => Ok(op.as_mut()),
            None => Err(EngineError::UnknownOperator(id)),
        }
    }

    /// Finds the first operator with the given name.
    pub fn find(&self, name: &str) -> Option<OperatorId> {
        self.operators
            .iter()
            .position(|op| op.name() == name)
            .map(OperatorId)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = OperatorId> {
        (0..self.operators.len()).map(OperatorId)
    }

    pub fn initial(&self) -> Option<OperatorId> {
        self.initial
    }

    pub fn set_initial(&mut self, id: OperatorId) -> Result<()> {
        self.get(id)?;
        self.initial = Some(id);
        Ok(())
    }

    pub fn set_successor(&mut self, id: OperatorId, successor: Option<OperatorId>) -> Result<()> {
        if let Some(next) = successor {
            self.get(next)?;
        }
        self.get_mut(id)?.base_mut().successor = successor;
        Ok(())
    }

    /// Rewires the actual name of one operator parameter.
    pub fn set_actual_name(&mut self, id: OperatorId, parameter: &str, actual_name: &str) -> Result<()> {
        let operator = self.get_mut(id)?;
        let op_name = operator.name().to_string();
        let param = operator
            .base_mut()
            .parameters
            .get_mut(parameter)
            .ok_or_else(|| EngineError::UnknownParameter {
                operator: op_name,
                parameter: parameter.to_string(),
            })?;
        param.set_actual_name(actual_name);
        Ok(())
    }

    /// Operators reachable from `from`, breadth-first, each listed once.
    pub fn reachable(&self, from: OperatorId) -> Result<Vec<OperatorId>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(self.get(id)?.references());
        }
        Ok(order)
    }

    /// Checks that every operator reference addresses a node of this graph.
    pub fn validate(&self) -> Result<()> {
        if let Some(initial) = self.initial {
            self.get(initial)?;
        }
        for op in &self.operators {
            for id in op.references() {
                self.get(id)?;
            }
        }
        for param in self.parameters.iter() {
            for item in param.held_values() {
                if let Some(id) = item.read().as_operator() {
                    self.get(id)?;
                }
            }
        }
        Ok(())
    }

    /// Copies every operator reachable from `root` into fresh ids and returns
    /// the id of the copied root.
    ///
    /// All ids are mapped before any operator is copied, so references
    /// between copied nodes, cycles included, point at the copies.
    pub fn duplicate_subgraph(&mut self, root: OperatorId, cloner: &mut Cloner) -> Result<OperatorId> {
        let originals = self.reachable(root)?;
        let base = self.operators.len();
        for (offset, &id) in originals.iter().enumerate() {
            cloner.map_operator(id, OperatorId(base + offset));
        }
        let copies: Vec<Box<dyn Operator>> = originals
            .iter()
            .map(|&id| self.operators[id.0].clone_operator(cloner))
            .collect();
        self.operators.extend(copies);
        Ok(cloner.operator(root))
    }
}

impl DeepClone for OperatorGraph {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.deep_clone(cloner),
            operators: self
                .operators
                .iter()
                .map(|op| op.clone_operator(cloner))
                .collect(),
            initial: self.initial.map(|id| cloner.operator(id)),
        }
    }
}

impl DeepClone for Arc<OperatorGraph> {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        if let Some(existing) = cloner.lookup_graph(self) {
            return existing;
        }
        let copy = Arc::new(self.as_ref().deep_clone(cloner));
        cloner.register_graph(self, copy.clone());
        copy
    }
}
