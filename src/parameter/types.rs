//! Parameter declarations.

use crate::cloner::{Cloner, DeepClone};
use crate::item::{ItemRef, ItemType, Value};

/// An operator's declared input/output slot.
///
/// # Examples
///
/// ```
/// use u_opgraph::item::ItemType;
/// use u_opgraph::parameter::Parameter;
///
/// // Reads the variable "PopulationSize" through the logical name "Size".
/// let p = Parameter::lookup("Size", ItemType::Int)
///     .with_actual_name("PopulationSize")
///     .with_default(100i64);
/// assert_eq!(p.actual_name(), "PopulationSize");
///
/// // Always yields 0.9, whatever the scope tree holds.
/// let rate = Parameter::fixed("CrossoverRate", 0.9);
/// assert!(rate.fixed_value().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    description: String,
    data_type: ItemType,
    actual_name: String,
    default: Option<ItemRef>,
    fixed: Option<ItemRef>,
}

impl Parameter {
    /// A parameter resolved through its actual name, which starts out equal
    /// to its logical name.
    pub fn lookup(name: impl Into<String>, data_type: ItemType) -> Self {
        let name = name.into();
        Self {
            actual_name: name.clone(),
            name,
            description: String::new(),
            data_type,
            default: None,
            fixed: None,
        }
    }

    /// A parameter that always yields `value`.
    pub fn fixed(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let mut p = Self::lookup(name, value.item_type());
        p.fixed = Some(ItemRef::new(value));
        p
    }

    pub fn with_actual_name(mut self, actual_name: impl Into<String>) -> Self {
        self.actual_name = actual_name.into();
        self
    }

    /// Sets the value used when resolution finds no variable.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ItemRef::new(value));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data_type(&self) -> ItemType {
        self.data_type
    }

    pub fn actual_name(&self) -> &str {
        &self.actual_name
    }

    pub fn set_actual_name(&mut self, actual_name: impl Into<String>) {
        self.actual_name = actual_name.into();
    }

    pub fn default_value(&self) -> Option<&ItemRef> {
        self.default.as_ref()
    }

    pub fn set_default(&mut self, value: Option<Value>) {
        self.default = value.map(ItemRef::new);
    }

    pub fn fixed_value(&self) -> Option<&ItemRef> {
        self.fixed.as_ref()
    }

    pub fn set_fixed(&mut self, value: Option<Value>) {
        self.fixed = value.map(ItemRef::new);
    }

    /// Values held by the declaration itself.
    pub(crate) fn held_values(&self) -> impl Iterator<Item = &ItemRef> {
        self.default.iter().chain(self.fixed.iter())
    }
}

impl DeepClone for Parameter {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            data_type: self.data_type,
            actual_name: self.actual_name.clone(),
            default: self.default.deep_clone(cloner),
            fixed: self.fixed.deep_clone(cloner),
        }
    }
}

/// Ordered set of parameters with unique logical names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    params: Vec<Parameter>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `param`, replacing a parameter of the same name.
    pub fn with(mut self, param: Parameter) -> Self {
        self.insert(param);
        self
    }

    /// Adds `param`; returns the replaced parameter of the same name, if any.
    pub fn insert(&mut self, param: Parameter) -> Option<Parameter> {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(slot) => Some(std::mem::replace(slot, param)),
            None => {
                self.params.push(param);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let index = self.params.iter().position(|p| p.name == name)?;
        Some(self.params.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl DeepClone for ParameterCollection {
    fn deep_clone(&self, cloner: &mut Cloner) -> Self {
        Self {
            params: self.params.deep_clone(cloner),
        }
    }
}
