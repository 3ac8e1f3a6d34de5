//! In-memory representation of a decoded gridded dataset.

use std::collections::BTreeMap;

use crate::error::{NetCdfError, NetCdfResult};

/// A global or variable attribute, reduced to the shapes the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the attribute.
    ///
    /// Single-element arrays count as scalars and text is accepted when it
    /// parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Numbers(values) if values.len() == 1 => Some(values[0]),
            AttributeValue::Numbers(_) => None,
            AttributeValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

impl Dimension {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

/// A numeric variable with its values flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<Dimension>,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub values: Vec<f64>,
}

impl Variable {
    /// Create a variable, checking that `values` fills the declared shape.
    pub fn new(
        name: impl Into<String>,
        dimensions: Vec<Dimension>,
        values: Vec<f64>,
    ) -> NetCdfResult<Self> {
        let name = name.into();
        let expected: usize = dimensions.iter().map(|d| d.len).product();
        if expected != values.len() {
            return Err(NetCdfError::ShapeMismatch {
                variable: name,
                expected,
                actual: values.len(),
            });
        }

        Ok(Self {
            name,
            dimensions,
            attributes: BTreeMap::new(),
            values,
        })
    }

    /// One-dimensional coordinate variable whose dimension shares its name.
    pub fn axis(name: impl Into<String>, values: Vec<f64>) -> Self {
        let name = name.into();
        Self {
            dimensions: vec![Dimension::new(name.clone(), values.len())],
            name,
            attributes: BTreeMap::new(),
            values,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Value at a multi-dimensional index given in this variable's own
    /// dimension order. Returns `None` when the index is out of bounds.
    pub fn value_at(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.dimensions.len() {
            return None;
        }
        let mut offset = 0usize;
        for (i, dim) in index.iter().zip(&self.dimensions) {
            if *i >= dim.len {
                return None;
            }
            offset = offset * dim.len + i;
        }
        self.values.get(offset).copied()
    }
}

/// A decoded dataset: global attributes plus named variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GriddedDataset {
    pub attributes: BTreeMap<String, AttributeValue>,
    pub variables: BTreeMap<String, Variable>,
}

impl GriddedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.insert_variable(variable);
        self
    }

    pub fn insert_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// First of `names` that is present.
    pub fn first_variable(&self, names: &[&str]) -> Option<&Variable> {
        names.iter().find_map(|n| self.variables.get(*n))
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Rename a variable. Returns `false` when `from` is absent; an existing
    /// variable called `to` is replaced.
    pub fn rename_variable(&mut self, from: &str, to: &str) -> bool {
        match self.variables.remove(from) {
            Some(mut variable) => {
                variable.name = to.to_string();
                self.variables.insert(to.to_string(), variable);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_numeric_views() {
        assert_eq!(AttributeValue::Number(85.0).as_f64(), Some(85.0));
        assert_eq!(AttributeValue::Numbers(vec![-85.5]).as_f64(), Some(-85.5));
        assert_eq!(AttributeValue::Numbers(vec![1.0, 2.0]).as_f64(), None);
        assert_eq!(AttributeValue::from(" 89.9 ").as_f64(), Some(89.9));
        assert_eq!(AttributeValue::from("n/a").as_f64(), None);
    }

    #[test]
    fn test_variable_shape_is_checked() {
        let dims = vec![Dimension::new("yc", 2), Dimension::new("xc", 3)];
        assert!(Variable::new("sic_mean", dims.clone(), vec![0.0; 6]).is_ok());
        let err = Variable::new("sic_mean", dims, vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, NetCdfError::ShapeMismatch { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn test_value_at_row_major() {
        let dims = vec![Dimension::new("yc", 2), Dimension::new("xc", 3)];
        let var = Variable::new("v", dims, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(var.value_at(&[0, 2]), Some(2.0));
        assert_eq!(var.value_at(&[1, 0]), Some(3.0));
        assert_eq!(var.value_at(&[2, 0]), None);
        assert_eq!(var.value_at(&[0]), None);
    }

    #[test]
    fn test_rename_variable() {
        let mut ds = GriddedDataset::new().with_variable(Variable::axis("mean", vec![1.0]));
        assert!(ds.rename_variable("mean", "sic_mean"));
        assert!(ds.has_variable("sic_mean"));
        assert!(!ds.has_variable("mean"));
        assert_eq!(ds.variable("sic_mean").unwrap().name, "sic_mean");
        assert!(!ds.rename_variable("stddev", "sic_stddev"));
    }

    #[test]
    fn test_first_variable() {
        let ds = GriddedDataset::new().with_variable(Variable::axis("x", vec![0.0, 1.0]));
        assert_eq!(ds.first_variable(&["xc", "x"]).unwrap().name, "x");
        assert!(ds.first_variable(&["yc", "y"]).is_none());
    }
}
