//! Scalar literals shared by student facts and rule conditions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Student facts: fact name → value.
///
/// A `BTreeMap` keeps iteration (and therefore logs and prompts) deterministic.
pub type Facts = BTreeMap<String, Scalar>;

/// A literal value: boolean, number or text.
///
/// Serialized untagged, so `true`, `75` and `"science"` are all valid JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Convert a JSON value into a scalar. `null`, arrays and objects are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Parse the canonical JSON text produced by [`Scalar::canonical_json`].
    pub fn parse_canonical(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        Self::from_json(&value)
    }

    /// Parse a command-line style value: JSON scalars (`80`, `true`, `"x"`) are taken
    /// as-is, anything else is treated as bare text.
    pub fn parse_loose(text: &str) -> Self {
        let trimmed = text.trim();
        Self::parse_canonical(trimmed).unwrap_or_else(|| Self::Text(trimmed.to_string()))
    }

    /// Canonical JSON text.
    ///
    /// Integral numbers print without a fractional part, so `75` and `75.0` share one
    /// canonical form (and therefore one node identity).
    pub fn canonical_json(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => canonical_number(*n),
            Self::Text(s) => Value::String(s.clone()).to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

fn canonical_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        // Exact: |n| < 2^53 so the cast is lossless.
        return format!("{}", n as i64);
    }
    match serde_json::Number::from_f64(n) {
        Some(num) => num.to_string(),
        None => format!("{n}"),
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_json())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
