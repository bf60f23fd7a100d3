//! Declared variable schema — definitions, validation, fingerprint.

use crate::error::{ConfigError, SchemaError};
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Reserved name inside agent records: the serialized key of the
/// opaque agent memory blob. A variable with this name would collide
/// with it on disk, so the schema refuses it.
pub const MEMORY_KEY: &str = "memory";

/// The four supported variable kinds. Any other kind fails config
/// load with serde's unknown-variant error naming the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// IEEE double, optionally bounded.
    Float,
    /// Signed 64-bit integer, optionally bounded.
    Int,
    /// Boolean.
    Bool,
    /// One of a declared, ordered list of strings.
    Categorical,
}

impl VarKind {
    /// The kind name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Categorical => "categorical",
        }
    }
}

/// One declared variable: kind, constraints, and default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDefinition {
    /// The variable kind.
    pub kind: VarKind,
    /// Inclusive lower bound for `float`/`int`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for `float`/`int`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Non-empty ordered list of legal values for `categorical`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// The initial value; must satisfy this definition's constraints.
    pub default: ScalarValue,
}

impl VariableDefinition {
    /// Structural validation of the definition itself, run at config
    /// load. `name` is only used in error messages.
    pub fn check_definition(&self, name: &str) -> Result<(), ConfigError> {
        match self.kind {
            VarKind::Float | VarKind::Int => {
                if self.allowed_values.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "variable {name}: allowed_values is only legal for categorical"
                    )));
                }
                if let (Some(min), Some(max)) = (self.min, self.max) {
                    if min > max {
                        return Err(ConfigError::Invalid(format!(
                            "variable {name}: min {min} exceeds max {max}"
                        )));
                    }
                }
            }
            VarKind::Bool | VarKind::Categorical => {
                if self.min.is_some() || self.max.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "variable {name}: min/max are only legal for float and int"
                    )));
                }
                if self.kind == VarKind::Categorical {
                    match &self.allowed_values {
                        Some(values) if !values.is_empty() => {}
                        _ => {
                            return Err(ConfigError::Invalid(format!(
                                "variable {name}: categorical requires non-empty allowed_values"
                            )));
                        }
                    }
                } else if self.allowed_values.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "variable {name}: allowed_values is only legal for categorical"
                    )));
                }
            }
        }

        // The default must pass the definition's own constraints.
        self.check_value(name, &self.default)
            .map_err(|e| ConfigError::Invalid(format!("default rejected: {e}")))?;
        Ok(())
    }

    /// Validate a proposed value against this definition, returning
    /// the (possibly coerced) stored form. Out-of-range numerics are
    /// rejected, not clamped. The single coercion: `Int` is accepted
    /// where `float` is declared.
    pub fn check_value(&self, name: &str, value: &ScalarValue) -> Result<ScalarValue, SchemaError> {
        let mismatch = |got: &ScalarValue| SchemaError::KindMismatch {
            name: name.to_owned(),
            expected: self.kind.name(),
            got: got.kind_name(),
        };

        match self.kind {
            VarKind::Float => {
                let x = match value {
                    ScalarValue::Float(f) => *f,
                    ScalarValue::Int(i) => *i as f64,
                    other => return Err(mismatch(other)),
                };
                self.check_bounds(name, x)?;
                Ok(ScalarValue::Float(x))
            }
            VarKind::Int => {
                let ScalarValue::Int(i) = value else {
                    return Err(mismatch(value));
                };
                self.check_bounds(name, *i as f64)?;
                Ok(ScalarValue::Int(*i))
            }
            VarKind::Bool => {
                let ScalarValue::Bool(b) = value else {
                    return Err(mismatch(value));
                };
                Ok(ScalarValue::Bool(*b))
            }
            VarKind::Categorical => {
                let ScalarValue::Categorical(s) = value else {
                    return Err(mismatch(value));
                };
                let allowed = self.allowed_values.as_deref().unwrap_or(&[]);
                if allowed.iter().any(|v| v == s) {
                    Ok(ScalarValue::Categorical(s.clone()))
                } else {
                    Err(SchemaError::NotAllowed {
                        name: name.to_owned(),
                        value: s.clone(),
                        allowed: allowed.to_vec(),
                    })
                }
            }
        }
    }

    fn check_bounds(&self, name: &str, x: f64) -> Result<(), SchemaError> {
        let min = self.min.unwrap_or(f64::NEG_INFINITY);
        let max = self.max.unwrap_or(f64::INFINITY);
        if x < min || x > max {
            return Err(SchemaError::OutOfBounds {
                name: name.to_owned(),
                value: x,
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Which scope a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    /// Per-agent variables.
    Agent,
    /// Shared global variables.
    Global,
}

impl VarScope {
    fn name(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Global => "global",
        }
    }
}

/// The declared variable schema for a run: agent-scope and
/// global-scope definitions plus the fingerprint over both.
///
/// `BTreeMap` keeps the canonical encoding sorted by name, so the
/// fingerprint is stable under config key reordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSchema {
    /// Per-agent variable definitions.
    pub agent_vars: BTreeMap<String, VariableDefinition>,
    /// Global variable definitions.
    pub global_vars: BTreeMap<String, VariableDefinition>,
}

impl VariableSchema {
    /// Build and structurally validate a schema from config maps.
    pub fn new(
        agent_vars: BTreeMap<String, VariableDefinition>,
        global_vars: BTreeMap<String, VariableDefinition>,
    ) -> Result<Self, ConfigError> {
        if agent_vars.contains_key(MEMORY_KEY) {
            return Err(ConfigError::Invalid(format!(
                "agent variable name \"{MEMORY_KEY}\" is reserved"
            )));
        }
        for (name, def) in agent_vars.iter().chain(global_vars.iter()) {
            def.check_definition(name)?;
        }
        Ok(Self {
            agent_vars,
            global_vars,
        })
    }

    /// SHA-256 over the canonical sorted-key JSON encoding of both
    /// scopes, prefixed `sha256:`. Used to gate checkpoint resume.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical =
            serde_json::to_vec(self).expect("schema serialization is infallible");
        let digest = Sha256::digest(&canonical);
        format!("sha256:{}", hex::encode(digest))
    }

    /// Validate a proposed value for `{scope, name}`, returning the
    /// coerced stored form.
    pub fn validate(
        &self,
        scope: VarScope,
        name: &str,
        value: &ScalarValue,
    ) -> Result<ScalarValue, SchemaError> {
        let defs = match scope {
            VarScope::Agent => &self.agent_vars,
            VarScope::Global => &self.global_vars,
        };
        let def = defs.get(name).ok_or_else(|| SchemaError::UnknownVariable {
            scope: scope.name(),
            name: name.to_owned(),
        })?;
        def.check_value(name, value)
    }

    /// Default values for a fresh agent record.
    #[must_use]
    pub fn agent_defaults(&self) -> BTreeMap<String, ScalarValue> {
        self.agent_vars
            .iter()
            .map(|(name, def)| (name.clone(), def.default.clone()))
            .collect()
    }

    /// Default values for the global record.
    #[must_use]
    pub fn global_defaults(&self) -> BTreeMap<String, ScalarValue> {
        self.global_vars
            .iter()
            .map(|(name, def)| (name.clone(), def.default.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_def(min: Option<f64>, max: Option<f64>, default: f64) -> VariableDefinition {
        VariableDefinition {
            kind: VarKind::Float,
            min,
            max,
            allowed_values: None,
            default: ScalarValue::Float(default),
        }
    }

    fn cat_def(allowed: &[&str], default: &str) -> VariableDefinition {
        VariableDefinition {
            kind: VarKind::Categorical,
            min: None,
            max: None,
            allowed_values: Some(allowed.iter().map(|s| (*s).to_owned()).collect()),
            default: ScalarValue::Categorical(default.to_owned()),
        }
    }

    fn schema_with(defs: &[(&str, VariableDefinition)]) -> VariableSchema {
        let globals = defs
            .iter()
            .map(|(n, d)| ((*n).to_owned(), d.clone()))
            .collect();
        VariableSchema::new(BTreeMap::new(), globals).unwrap()
    }

    #[test]
    fn unknown_kind_fails_load_listing_supported_kinds() {
        let err = serde_yaml::from_str::<VariableDefinition>(
            "kind: quaternion\ndefault: 0.0\n",
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("float"), "kinds missing from: {err}");
        assert!(err.contains("categorical"), "kinds missing from: {err}");
    }

    #[test]
    fn out_of_bounds_is_rejected_not_clamped() {
        let schema = schema_with(&[("gdp", float_def(Some(0.0), Some(100.0), 50.0))]);
        let err = schema
            .validate(VarScope::Global, "gdp", &ScalarValue::Float(100.5))
            .unwrap_err();
        assert!(matches!(err, SchemaError::OutOfBounds { .. }));
    }

    #[test]
    fn bounds_are_inclusive() {
        let schema = schema_with(&[("gdp", float_def(Some(0.0), Some(100.0), 50.0))]);
        assert!(
            schema
                .validate(VarScope::Global, "gdp", &ScalarValue::Float(100.0))
                .is_ok()
        );
        assert!(
            schema
                .validate(VarScope::Global, "gdp", &ScalarValue::Float(0.0))
                .is_ok()
        );
    }

    #[test]
    fn int_coerces_to_declared_float() {
        let schema = schema_with(&[("gdp", float_def(None, None, 0.0))]);
        let stored = schema
            .validate(VarScope::Global, "gdp", &ScalarValue::Int(7))
            .unwrap();
        assert_eq!(stored, ScalarValue::Float(7.0));
    }

    #[test]
    fn float_does_not_coerce_to_declared_int() {
        let def = VariableDefinition {
            kind: VarKind::Int,
            min: None,
            max: None,
            allowed_values: None,
            default: ScalarValue::Int(0),
        };
        let schema = schema_with(&[("count", def)]);
        let err = schema
            .validate(VarScope::Global, "count", &ScalarValue::Float(1.5))
            .unwrap_err();
        assert!(matches!(err, SchemaError::KindMismatch { .. }));
    }

    #[test]
    fn categorical_is_exact_string_equality() {
        let schema = schema_with(&[("mood", cat_def(&["calm", "tense"], "calm"))]);
        assert!(
            schema
                .validate(VarScope::Global, "mood", &ScalarValue::from("tense"))
                .is_ok()
        );
        let err = schema
            .validate(VarScope::Global, "mood", &ScalarValue::from("Tense"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::NotAllowed { .. }));
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let schema = schema_with(&[]);
        let err = schema
            .validate(VarScope::Global, "missing", &ScalarValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownVariable { .. }));
    }

    #[test]
    fn default_must_satisfy_own_constraints() {
        let bad = float_def(Some(0.0), Some(1.0), 2.0);
        let err =
            VariableSchema::new(BTreeMap::new(), BTreeMap::from([("x".to_owned(), bad)]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_allowed_values_rejected() {
        let def = VariableDefinition {
            kind: VarKind::Categorical,
            min: None,
            max: None,
            allowed_values: Some(vec![]),
            default: ScalarValue::from("a"),
        };
        assert!(def.check_definition("mood").is_err());
    }

    #[test]
    fn memory_is_a_reserved_agent_var_name() {
        let agent_vars =
            BTreeMap::from([(MEMORY_KEY.to_owned(), float_def(None, None, 0.0))]);
        assert!(VariableSchema::new(agent_vars, BTreeMap::new()).is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_prefixed() {
        let a = schema_with(&[("gdp", float_def(Some(0.0), None, 1.0))]);
        let b = schema_with(&[("gdp", float_def(Some(0.0), None, 1.0))]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn fingerprint_differs_when_schema_differs() {
        let a = schema_with(&[("gdp", float_def(Some(0.0), None, 1.0))]);
        let b = schema_with(&[("gdp", float_def(Some(1.0), None, 1.0))]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
