//! DeltaEngine — applies numeric deltas named in the action payload.

use crate::action::Action;
use crate::engine::{Applied, Engine};
use crate::error::SimError;
use crate::schema::VariableSchema;
use crate::state::{StateSnapshot, StateUpdates};
use crate::value::ScalarValue;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A deterministic engine for float-variable schemas.
///
/// Reads the payload shape
/// `{"global_deltas": {"var": 1.5}, "agent_deltas": {"var": -2.0}}`
/// and adds each delta to the current value (`agent_deltas` apply to
/// the acting agent). Payloads without those keys leave state
/// untouched, which makes skipped/no-op turns easy to assert.
pub struct DeltaEngine {
    schema: VariableSchema,
}

impl DeltaEngine {
    /// Create an engine validating against the given schema.
    #[must_use]
    pub fn new(schema: VariableSchema) -> Self {
        Self { schema }
    }

    fn deltas(payload: &serde_json::Value, key: &str) -> BTreeMap<String, f64> {
        payload
            .get(key)
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(var, delta)| Some((var.clone(), delta.as_f64()?)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Engine for DeltaEngine {
    async fn apply_action(
        &self,
        action: &Action,
        draft: StateSnapshot,
    ) -> Result<Applied, SimError> {
        let mut updates = StateUpdates::default();

        for (var, delta) in Self::deltas(&action.payload, "global_deltas") {
            let current = draft
                .global_state
                .get(&var)
                .and_then(ScalarValue::as_f64)
                .unwrap_or(0.0);
            updates
                .global
                .insert(var, ScalarValue::Float(current + delta));
        }

        let agent_deltas = Self::deltas(&action.payload, "agent_deltas");
        if !agent_deltas.is_empty() {
            let mut writes = BTreeMap::new();
            for (var, delta) in agent_deltas {
                let current = draft
                    .agents
                    .get(&action.agent_name)
                    .and_then(|record| record.vars.get(&var))
                    .and_then(ScalarValue::as_f64)
                    .unwrap_or(0.0);
                writes.insert(var, ScalarValue::Float(current + delta));
            }
            updates.agent_vars.insert(action.agent_name.clone(), writes);
        }

        if updates.is_empty() {
            return Ok(Applied::silent(draft));
        }
        let next = draft
            .with_updates(updates, &self.schema)
            .map_err(SimError::State)?;
        Ok(Applied::silent(next))
    }
}
