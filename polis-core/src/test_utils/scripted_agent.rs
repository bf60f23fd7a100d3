//! ScriptedAgent — replays a fixed list of action payloads.

use crate::action::{Action, LifecycleRequest};
use crate::agent::{Agent, Decision};
use crate::error::SimError;
use crate::view::AgentView;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

/// An agent that proposes scripted payloads in order, then repeats a
/// fallback payload forever. Lifecycle emissions are scripted the
/// same way (one batch per turn, empty once exhausted).
///
/// Memory is a decision counter, so memory persistence is observable
/// in tests: after N turns the agent's memory is `{"decisions": N}`.
pub struct ScriptedAgent {
    name: String,
    payloads: Mutex<VecDeque<serde_json::Value>>,
    fallback: serde_json::Value,
    lifecycle: Mutex<VecDeque<Vec<LifecycleRequest>>>,
}

impl ScriptedAgent {
    /// An agent that always proposes `fallback`.
    pub fn new(name: impl Into<String>, fallback: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payloads: Mutex::new(VecDeque::new()),
            fallback,
            lifecycle: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue payloads proposed before the fallback kicks in.
    #[must_use]
    pub fn with_payloads(self, payloads: impl IntoIterator<Item = serde_json::Value>) -> Self {
        self.payloads.lock().expect("unpoisoned").extend(payloads);
        self
    }

    /// Queue per-turn lifecycle batches.
    #[must_use]
    pub fn with_lifecycle(
        self,
        batches: impl IntoIterator<Item = Vec<LifecycleRequest>>,
    ) -> Self {
        self.lifecycle.lock().expect("unpoisoned").extend(batches);
        self
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, view: &AgentView) -> Result<Decision, SimError> {
        let payload = self
            .payloads
            .lock()
            .expect("unpoisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let decisions = view.memory().get("decisions").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(Decision {
            action: Action::regular(&self.name, payload),
            memory: json!({ "decisions": decisions + 1 }),
        })
    }

    async fn emit_lifecycle(&self, _view: &AgentView) -> Result<Vec<LifecycleRequest>, SimError> {
        Ok(self
            .lifecycle
            .lock()
            .expect("unpoisoned")
            .pop_front()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentRecord;
    use std::collections::BTreeMap;

    fn view(memory: serde_json::Value) -> AgentView {
        AgentView {
            agent_name: "ada".into(),
            turn: 0,
            seed: 0,
            own: AgentRecord {
                vars: BTreeMap::new(),
                memory,
            },
            global_state: BTreeMap::new(),
            visible_agents: BTreeMap::new(),
            spatial_state: None,
        }
    }

    #[tokio::test]
    async fn replays_then_falls_back() {
        let agent =
            ScriptedAgent::new("ada", json!("idle")).with_payloads([json!("a"), json!("b")]);
        let view = view(serde_json::Value::Null);
        assert_eq!(agent.decide(&view).await.unwrap().action.payload, json!("a"));
        assert_eq!(agent.decide(&view).await.unwrap().action.payload, json!("b"));
        assert_eq!(
            agent.decide(&view).await.unwrap().action.payload,
            json!("idle")
        );
    }

    #[tokio::test]
    async fn memory_counts_decisions() {
        let agent = ScriptedAgent::new("ada", json!("idle"));
        let first = agent.decide(&view(serde_json::Value::Null)).await.unwrap();
        assert_eq!(first.memory, json!({"decisions": 1}));
        let second = agent.decide(&view(first.memory)).await.unwrap();
        assert_eq!(second.memory, json!({"decisions": 2}));
    }

    #[tokio::test]
    async fn lifecycle_batches_drain_to_empty() {
        let agent = ScriptedAgent::new("ada", json!("idle")).with_lifecycle([vec![
            LifecycleRequest::Pause {
                name: "ada".into(),
                auto_resume_turns: None,
            },
        ]]);
        let view = view(serde_json::Value::Null);
        assert_eq!(agent.emit_lifecycle(&view).await.unwrap().len(), 1);
        assert!(agent.emit_lifecycle(&view).await.unwrap().is_empty());
    }
}
