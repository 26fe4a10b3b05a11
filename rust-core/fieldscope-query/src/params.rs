// SPDX-License-Identifier: PMPL-1.0-or-later
//! Parameter values and named-predicate parameter bags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// A typed value bound to a predicate or a named-predicate parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A vector of 32-bit floats (e.g. an embedding).
    Vector(Vec<f32>),
    Null,
}

impl ParamValue {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "string",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
            ParamValue::Vector(_) => "vector",
            ParamValue::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            ParamValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => write!(f, "{}", s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Vector(v) => write!(f, "{:?}", v),
            ParamValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<f32>> for ParamValue {
    fn from(value: Vec<f32>) -> Self {
        ParamValue::Vector(value)
    }
}

/// Parameters of one named-predicate invocation. Each name is bound at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamBag(BTreeMap<String, ParamValue>);

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`; fails if it was already bound.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<(), QueryError> {
        let name = name.into();
        if self.0.contains_key(&name) {
            return Err(QueryError::DuplicateNamedParameter(name));
        }
        self.0.insert(name, value.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_is_write_once() {
        let mut bag = ParamBag::new();
        bag.insert("limit", 10).unwrap();
        let err = bag.insert("limit", 20).unwrap_err();
        assert!(matches!(err, QueryError::DuplicateNamedParameter(ref n) if n == "limit"));
        assert_eq!(bag.get("limit"), Some(&ParamValue::Int(10)));
    }

    #[test]
    fn test_typed_views() {
        assert_eq!(ParamValue::from(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::from("x").as_i64(), None);
        assert_eq!(ParamValue::from(vec![1.0f32]).as_vector(), Some(&[1.0f32][..]));
        assert_eq!(ParamValue::Null.type_name(), "null");
    }

    #[test]
    fn test_bag_json_shape() {
        let mut bag = ParamBag::new();
        bag.insert("q", "rust").unwrap();
        bag.insert("strict", true).unwrap();
        let json = serde_json::to_string(&bag).unwrap();
        assert_eq!(json, r#"{"q":{"string":"rust"},"strict":{"bool":true}}"#);
        let parsed: ParamBag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bag);
    }
}
