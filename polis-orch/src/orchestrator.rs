//! The turn scheduler and run lifecycle controller.
//!
//! State machine:
//!
//! ```text
//! [Init] → [Ready] → [Running turn N] → [Persisting N] → [Ready] → … → [Done | Aborted]
//! ```
//!
//! Exactly one turn is in flight at a time and only the orchestrator
//! writes the current-snapshot slot; a turn that fails for any
//! non-cancellation reason aborts the run with the previous
//! `last.json` intact, and no partial turn is ever persisted.

use crate::observe::ObservabilityFilter;
use crate::turn::run_turn;
use chrono::Utc;
use polis_checkpoint::{CheckpointStore, Clock};
use polis_core::agent::Agent;
use polis_core::checkpoint::{CheckpointKind, RunMetadata, SimulationResults};
use polis_core::config::SimulationConfig;
use polis_core::engine::Engine;
use polis_core::error::{ConfigError, SimError};
use polis_core::lifecycle::LifecycleOutcome;
use polis_core::schema::VariableSchema;
use polis_core::state::StateSnapshot;
use polis_core::validator::Validator;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Creates implementations for agents added mid-run.
///
/// Lifecycle `Add` requests carry a name and initial state but no
/// strategy; the spawner decides what a dynamically added agent runs.
/// A run whose agents never emit `Add` does not need one.
pub trait AgentSpawner: Send + Sync {
    /// Produce the implementation for a newly added agent.
    fn spawn(&self, name: &str) -> Arc<dyn Agent>;
}

/// Per-invocation options for [`Orchestrator::run`] and
/// [`Orchestrator::resume`].
pub struct RunOptions {
    /// Root directory for run output. Each run gets its own
    /// subdirectory named by run id.
    pub output_root: PathBuf,
    /// External stop signal, honored between steps.
    pub cancel: CancellationToken,
    /// Optional wall-clock budget per turn; tripping it is
    /// unrecoverable.
    pub turn_timeout: Option<Duration>,
    /// Timestamp source for checkpoints (fixed in the determinism
    /// harness).
    pub clock: Clock,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            cancel: CancellationToken::new(),
            turn_timeout: None,
            clock: Clock::System,
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The run completed (termination condition, or graceful
    /// cancellation with partial results).
    Done,
    /// An unrecoverable error stopped the run.
    Aborted,
}

/// What a run produced.
pub struct RunOutcome {
    /// Terminal status.
    pub status: RunStatus,
    /// The allocated run id, when allocation succeeded.
    pub run_id: Option<String>,
    /// The last committed turn.
    pub final_turn: u64,
    /// Results, present exactly when `result.json` was written.
    pub results: Option<SimulationResults>,
    /// The aborting error, present exactly when `status` is
    /// `Aborted`.
    pub error: Option<SimError>,
}

impl RunOutcome {
    /// Process exit code for the embedding CLI: 0 for `Done`, 1 for
    /// `Aborted`. (Invalid config never reaches a `RunOutcome` — the
    /// builder or entry point returns `ConfigError`, which maps
    /// to 2.)
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Done => 0,
            RunStatus::Aborted => 1,
        }
    }
}

/// Builder for [`Orchestrator`]. Concrete strategies are external, so
/// every configured agent needs a registered implementation, plus one
/// validator and one engine.
pub struct OrchestratorBuilder {
    config: SimulationConfig,
    agents: BTreeMap<String, Arc<dyn Agent>>,
    validator: Option<Arc<dyn Validator>>,
    engine: Option<Arc<dyn Engine>>,
    spawner: Option<Arc<dyn AgentSpawner>>,
}

impl OrchestratorBuilder {
    /// Register the implementation for one configured agent.
    #[must_use]
    pub fn agent(mut self, implementation: Arc<dyn Agent>) -> Self {
        self.agents
            .insert(implementation.name().to_owned(), implementation);
        self
    }

    /// Set the validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the engine.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the spawner for dynamically added agents.
    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn AgentSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Validate the config and wiring. Errors here are what the CLI
    /// reports as exit code 2.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let schema = self.config.validate()?;
        for agent in &self.config.agents {
            if !self.agents.contains_key(&agent.name) {
                return Err(ConfigError::Invalid(format!(
                    "no implementation registered for configured agent {}",
                    agent.name
                )));
            }
        }
        let validator = self
            .validator
            .ok_or_else(|| ConfigError::Invalid("no validator registered".into()))?;
        let engine = self
            .engine
            .ok_or_else(|| ConfigError::Invalid("no engine registered".into()))?;
        let filter = ObservabilityFilter::new(
            self.config.observability.as_ref(),
            self.config.simulation.seed,
        );
        Ok(Orchestrator {
            config: self.config,
            schema,
            agents: self.agents,
            validator,
            engine,
            spawner: self.spawner,
            filter,
        })
    }
}

/// Drives the Observe → Decide → Validate → Reduce → Persist pipeline
/// and owns the current snapshot and run metadata.
pub struct Orchestrator {
    config: SimulationConfig,
    schema: VariableSchema,
    agents: BTreeMap<String, Arc<dyn Agent>>,
    validator: Arc<dyn Validator>,
    engine: Arc<dyn Engine>,
    spawner: Option<Arc<dyn AgentSpawner>>,
    filter: ObservabilityFilter,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Start building an orchestrator for a config.
    #[must_use]
    pub fn builder(config: SimulationConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            agents: BTreeMap::new(),
            validator: None,
            engine: None,
            spawner: None,
        }
    }

    /// The validated variable schema.
    #[must_use]
    pub fn schema(&self) -> &VariableSchema {
        &self.schema
    }

    /// Run a fresh simulation from turn 0.
    ///
    /// `Err` means the config could not produce a run at all (exit
    /// code 2); an `Ok` outcome carries exit code 0 or 1.
    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome, ConfigError> {
        let spatial = match &self.config.spatial {
            Some(spatial_config) => Some(polis_spatial::factory::build(spatial_config)?),
            None => None,
        };
        let initial = StateSnapshot::initial(&self.config, &self.schema, spatial)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(self.drive(initial, options).await)
    }

    /// Resume from a checkpoint of an earlier run. A new run id is
    /// allocated; the loaded snapshot must carry this config's schema
    /// fingerprint.
    pub async fn resume(
        &self,
        run_id: &str,
        turn: u64,
        options: RunOptions,
    ) -> Result<RunOutcome, ConfigError> {
        let fingerprint = self.schema.fingerprint();
        let checkpoint = match CheckpointStore::load(
            &options.output_root,
            run_id,
            Some(turn),
            &fingerprint,
        )
        .await
        {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(
                    run_id = %run_id,
                    turn,
                    kind = "checkpoint",
                    error = %e,
                    "resume failed"
                );
                return Ok(RunOutcome {
                    status: RunStatus::Aborted,
                    run_id: None,
                    final_turn: 0,
                    results: None,
                    error: Some(e.into()),
                });
            }
        };
        if let Err(e) = checkpoint.state.check_invariants(&self.schema) {
            return Err(ConfigError::Invalid(format!(
                "checkpoint state violates the schema it claims: {e}"
            )));
        }
        info!(from_run = %run_id, turn, "resuming from checkpoint");
        Ok(self.drive(checkpoint.state, options).await)
    }

    /// The shared run loop: `[Ready] → [Running] → [Persisting]`
    /// until done or aborted.
    async fn drive(&self, initial: StateSnapshot, options: RunOptions) -> RunOutcome {
        let start_time = Utc::now();
        let start_instant = std::time::Instant::now();

        let store = match CheckpointStore::create_with_clock(
            &options.output_root,
            &self.config.simulation.name,
            self.config.agents.len(),
            self.config.simulation.checkpoint_interval,
            self.schema.fingerprint(),
            options.clock,
        ) {
            Ok(store) => store,
            Err(e) => {
                error!(kind = "checkpoint", error = %e, "run directory allocation failed");
                return RunOutcome {
                    status: RunStatus::Aborted,
                    run_id: None,
                    final_turn: initial.turn,
                    results: None,
                    error: Some(e.into()),
                };
            }
        };
        let run_id = store.run_id().to_owned();
        let mut metadata = RunMetadata {
            run_id: run_id.clone(),
            simulation_name: self.config.simulation.name.clone(),
            num_agents: self.config.agents.len(),
            start_time,
            end_time: None,
            checkpoint_interval: self.config.simulation.checkpoint_interval,
            config_snapshot: self.config.snapshot_value(),
            schema_fingerprint: self.schema.fingerprint(),
        };

        let mut registry = self.agents.clone();
        let mut current = initial;
        let max_turns = self.config.simulation.max_turns;

        loop {
            if options.cancel.is_cancelled() {
                info!(run_id = %run_id, turn = current.turn, "cancelled between turns");
                break;
            }
            if self.is_terminal(&current, max_turns) {
                break;
            }

            let turn_result = match options.turn_timeout {
                Some(budget) => {
                    match tokio::time::timeout(
                        budget,
                        run_turn(
                            &current,
                            &registry,
                            self.validator.as_ref(),
                            self.engine.as_ref(),
                            &self.schema,
                            &self.filter,
                            &options.cancel,
                        ),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(SimError::Other(
                            format!("turn wall-clock timeout after {budget:?}").into(),
                        )),
                    }
                }
                None => {
                    run_turn(
                        &current,
                        &registry,
                        self.validator.as_ref(),
                        self.engine.as_ref(),
                        &self.schema,
                        &self.filter,
                        &options.cancel,
                    )
                    .await
                }
            };

            let output = match turn_result {
                Ok(output) => output,
                Err(SimError::Cancelled) => {
                    info!(run_id = %run_id, turn = current.turn, "cancelled mid-turn, nothing committed");
                    break;
                }
                Err(e) => {
                    return self.abort(&run_id, current.turn, e);
                }
            };

            self.sync_registry(&mut registry, &output.lifecycle);

            // Persist before commit: the checkpoint barrier for turn
            // N completes before turn N+1 can begin.
            let is_final = self.is_terminal(&output.snapshot, max_turns);
            if let Err(e) = store.save(&output.snapshot, CheckpointKind::Last).await {
                return self.abort(&run_id, current.turn, e.into());
            }
            if store.should_save(output.snapshot.turn, is_final) {
                let kind = if is_final {
                    CheckpointKind::Final
                } else {
                    CheckpointKind::Interval
                };
                if let Err(e) = store.save(&output.snapshot, kind).await {
                    return self.abort(&run_id, current.turn, e.into());
                }
            }

            current = output.snapshot;
            info!(run_id = %run_id, turn = current.turn, population = current.agents.len(), "turn committed");
            if is_final {
                break;
            }
        }

        metadata.end_time = Some(Utc::now());
        let results = SimulationResults {
            run_metadata: metadata,
            checkpoint_turns: store.checkpoint_turns(),
            summary_stats: summary_stats(&current, start_instant.elapsed()),
            final_state: current.clone(),
        };
        if let Err(e) = store.write_result(&results).await {
            return self.abort(&run_id, current.turn, e.into());
        }
        info!(run_id = %run_id, final_turn = current.turn, "simulation done");

        RunOutcome {
            status: RunStatus::Done,
            run_id: Some(run_id),
            final_turn: current.turn,
            results: Some(results),
            error: None,
        }
    }

    fn is_terminal(&self, snapshot: &StateSnapshot, max_turns: u64) -> bool {
        if snapshot.turn >= max_turns || snapshot.agents.is_empty() {
            return true;
        }
        self.config
            .simulation
            .termination
            .as_ref()
            .is_some_and(|rule| rule.is_met(&snapshot.global_state))
    }

    fn sync_registry(
        &self,
        registry: &mut BTreeMap<String, Arc<dyn Agent>>,
        outcomes: &[LifecycleOutcome],
    ) {
        for outcome in outcomes {
            match outcome {
                LifecycleOutcome::Added { resolved, .. } => {
                    if let Some(spawner) = &self.spawner {
                        registry.insert(resolved.clone(), spawner.spawn(resolved));
                    }
                    // Without a spawner the next turn fails with an
                    // invariant violation naming the agent, which is
                    // the right diagnostic for a mis-wired run.
                }
                LifecycleOutcome::Removed(name) => {
                    registry.remove(name);
                }
                _ => {}
            }
        }
    }

    fn abort(&self, run_id: &str, committed_turn: u64, error: SimError) -> RunOutcome {
        error!(
            run_id = %run_id,
            turn = committed_turn,
            kind = error_kind(&error),
            error = %error,
            "simulation aborted; last.json reflects the last committed turn and result.json was not written"
        );
        RunOutcome {
            status: RunStatus::Aborted,
            run_id: Some(run_id.to_owned()),
            final_turn: committed_turn,
            results: None,
            error: Some(error),
        }
    }
}

fn error_kind(error: &SimError) -> &'static str {
    match error {
        SimError::Config(_) => "config",
        SimError::Schema(_) => "schema",
        SimError::State(_) => "invariant",
        SimError::Spatial(_) => "spatial",
        SimError::Llm(_) => "llm",
        SimError::Checkpoint(_) => "checkpoint",
        SimError::Cancelled => "cancelled",
        _ => "other",
    }
}

/// Aggregates for `result.json`: run length, wall time, population,
/// final global values, and per-numeric-agent-variable mean/min/max.
fn summary_stats(
    snapshot: &StateSnapshot,
    elapsed: std::time::Duration,
) -> BTreeMap<String, serde_json::Value> {
    let mut stats = BTreeMap::new();
    stats.insert("total_turns".to_owned(), snapshot.turn.into());
    stats.insert(
        "final_population".to_owned(),
        (snapshot.agents.len() as u64).into(),
    );
    stats.insert(
        "elapsed_seconds".to_owned(),
        serde_json::json!(elapsed.as_secs_f64()),
    );

    let globals: BTreeMap<&str, serde_json::Value> = snapshot
        .global_state
        .iter()
        .map(|(name, value)| {
            (
                name.as_str(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();
    stats.insert(
        "final_global_state".to_owned(),
        serde_json::json!(globals),
    );

    let mut per_var: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in snapshot.agents.values() {
        for (name, value) in &record.vars {
            if let Some(x) = value.as_f64() {
                per_var.entry(name.clone()).or_default().push(x);
            }
        }
    }
    let agent_stats: BTreeMap<String, serde_json::Value> = per_var
        .into_iter()
        .map(|(name, values)| {
            let count = values.len() as f64;
            let mean = values.iter().sum::<f64>() / count;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (
                name,
                serde_json::json!({"mean": mean, "min": min, "max": max}),
            )
        })
        .collect();
    stats.insert(
        "agent_var_stats".to_owned(),
        serde_json::json!(agent_stats),
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_status() {
        let done = RunOutcome {
            status: RunStatus::Done,
            run_id: Some("r".into()),
            final_turn: 3,
            results: None,
            error: None,
        };
        assert_eq!(done.exit_code(), 0);

        let aborted = RunOutcome {
            status: RunStatus::Aborted,
            run_id: Some("r".into()),
            final_turn: 2,
            results: None,
            error: Some(SimError::Cancelled),
        };
        assert_eq!(aborted.exit_code(), 1);
    }

    #[test]
    fn summary_stats_aggregate_numeric_agent_vars() {
        use polis_core::schema::VariableSchema;
        use polis_core::state::AgentRecord;
        use polis_core::value::ScalarValue;
        use std::collections::BTreeSet;

        let schema = VariableSchema::new(BTreeMap::new(), BTreeMap::new()).unwrap();
        let record = |wealth: f64| AgentRecord {
            vars: BTreeMap::from([("wealth".to_owned(), ScalarValue::Float(wealth))]),
            memory: serde_json::Value::Null,
        };
        let snapshot = StateSnapshot {
            turn: 9,
            global_state: BTreeMap::new(),
            agents: BTreeMap::from([
                ("ada".to_owned(), record(10.0)),
                ("bob".to_owned(), record(30.0)),
            ]),
            paused_agents: BTreeSet::new(),
            auto_resume: BTreeMap::new(),
            spatial_state: None,
            reasoning_trail: Vec::new(),
            schema_fingerprint: schema.fingerprint(),
        };

        let stats = summary_stats(&snapshot, std::time::Duration::from_secs(2));
        assert_eq!(stats["total_turns"], serde_json::json!(9));
        assert_eq!(stats["final_population"], serde_json::json!(2));
        assert_eq!(
            stats["agent_var_stats"]["wealth"],
            serde_json::json!({"mean": 20.0, "min": 10.0, "max": 30.0})
        );
    }
}
