//! Scalar game values — the runtime form of declared variables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The runtime value of one declared variable.
///
/// Serialized untagged so checkpoints carry plain JSON scalars
/// (`3`, `1.5`, `true`, `"stable"`) rather than wrapper objects.
/// `Int` is listed before `Float` so integer literals deserialize as
/// integers; the schema coerces an `Int` where a `float` variable is
/// declared (the only cross-kind coercion).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// One value of a categorical variable.
    Categorical(String),
}

impl ScalarValue {
    /// The kind name used in schema errors (`float`, `int`, `bool`,
    /// `categorical`).
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Categorical(_) => "categorical",
        }
    }

    /// Numeric view of the value. `Int` widens to `f64`; `Bool` and
    /// `Categorical` have no numeric view.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a plain JSON scalar into a value.
    ///
    /// Returns `None` for JSON arrays, objects, nulls, and numbers that
    /// fit neither `i64` nor `f64`. Used when ingesting config-provided
    /// initial state and lifecycle `Add` payloads.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::Categorical(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Categorical(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::Categorical(s.to_owned())
    }
}
