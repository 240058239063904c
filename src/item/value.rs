//! Value variants, type tags and shared item handles.

use super::random::RandomSource;
use crate::cloner::{Cloner, DeepClone};
use crate::operator::OperatorId;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// Type tag of a [`Value`], used by parameters to declare what they expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemType {
    /// Accepts every value.
    Any,
    Bool,
    Int,
    Double,
    Str,
    BoolArray,
    IntArray,
    DoubleArray,
    /// Reference to a node of the operator graph.
    Operator,
    /// A seeded random number source.
    Random,
}

impl ItemType {
    /// Returns `true` if a value tagged `found` satisfies a parameter
    /// declared with this type.
    ///
    /// Tags must match exactly, except that `Any` accepts everything and
    /// `Double` accepts `Int` (widening).
    ///
    /// ```
    /// use u_opgraph::item::ItemType;
    ///
    /// assert!(ItemType::Double.accepts(ItemType::Int));
    /// assert!(!ItemType::Int.accepts(ItemType::Double));
    /// assert!(ItemType::Any.accepts(ItemType::Random));
    /// ```
    pub fn accepts(self, found: ItemType) -> bool {
        self == found || self == ItemType::Any || (self == ItemType::Double && found == ItemType::Int)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemType::Any => "any",
            ItemType::Bool => "bool",
            ItemType::Int => "int",
            ItemType::Double => "double",
            ItemType::Str => "string",
            ItemType::BoolArray => "bool[]",
            ItemType::IntArray => "int[]",
            ItemType::DoubleArray => "double[]",
            ItemType::Operator => "operator",
            ItemType::Random => "random",
        };
        f.write_str(name)
    }
}

/// A runtime-typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    Operator(OperatorId),
    Random(RandomSource),
}

impl Value {
    /// Returns the type tag of this value.
    pub fn item_type(&self) -> ItemType {
        match self {
            Value::Bool(_) => ItemType::Bool,
            Value::Int(_) => ItemType::Int,
            Value::Double(_) => ItemType::Double,
            Value::Str(_) => ItemType::Str,
            Value::BoolArray(_) => ItemType::BoolArray,
            Value::IntArray(_) => ItemType::IntArray,
            Value::DoubleArray(_) => ItemType::DoubleArray,
            Value::Operator(_) => ItemType::Operator,
            Value::Random(_) => ItemType::Random,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as `f64`, widening integers.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_operator(&self) -> Option<OperatorId> {
        match self {
            Value::Operator(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<OperatorId> for Value {
    fn from(v: OperatorId) -> Self {
        Value::Operator(v)
    }
}

impl From<RandomSource> for Value {
    fn from(v: RandomSource) -> Self {
        Value::Random(v)
    }
}

impl DeepClone for Value {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        match self {
            Value::Operator(id) => Value::Operator(cloner.operator(*id)),
            other => other.clone(),
        }
    }
}

/// Shared handle to a [`Value`].
///
/// Cloning the handle (`Clone`) shares the item; [`DeepClone`] copies it.
/// Equality compares contents, use [`ItemRef::ptr_eq`] for identity.
#[derive(Clone)]
pub struct ItemRef(Arc<RwLock<Value>>);

impl ItemRef {
    pub fn new(value: impl Into<Value>) -> Self {
        ItemRef(Arc::new(RwLock::new(value.into())))
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    /// Replaces the value in place; every holder of this item observes it.
    pub fn set(&self, value: impl Into<Value>) {
        *self.0.write() = value.into();
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    pub fn item_type(&self) -> ItemType {
        self.0.read().item_type()
    }

    /// Returns `true` if both handles point to the same item.
    pub fn ptr_eq(&self, other: &ItemRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key used by the cloner.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ItemRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.read() == *other.0.read()
    }
}

impl fmt::Debug for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemRef({:?})", *self.0.read())
    }
}

impl DeepClone for ItemRef {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        if let Some(existing) = cloner.lookup_item(self) {
            return existing;
        }
        let copy = ItemRef::new(Value::Bool(false));
        cloner.register_item(self, copy.clone());
        let value = self.0.read().deep_clone(cloner);
        copy.set(value);
        copy
    }
}
