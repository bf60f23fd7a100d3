//! # polis-core — contracts and state model for turn-based multi-agent simulation
//!
//! This crate defines the data model and the protocol boundaries that
//! compose into a simulation: an immutable world snapshot, a declared
//! variable schema, and the three component contracts the turn
//! pipeline drives.
//!
//! ## The pipeline
//!
//! | Stage | Contract | What it does |
//! |-------|----------|-------------|
//! | Observe | [`AgentView`] | Filtered projection of the snapshot per agent |
//! | Decide | [`Agent`] | One proposal + replacement memory per agent |
//! | Validate | [`Validator`] | Verdict per action, no state writes |
//! | Reduce | [`Engine`] | Sole writer: validated actions → next snapshot |
//! | Persist | [`Checkpoint`] | Atomic per-turn snapshots (store in `polis-checkpoint`) |
//!
//! ## Design principle
//!
//! Snapshots are persistent values: every operation returns a new
//! snapshot and never mutates its input. That is what lets agent
//! decisions run concurrently against a shared read-only view and
//! lets ownership of the draft pass linearly through the reducer
//! without a lock anywhere in the pipeline.
//!
//! Orchestration lives in `polis-orch`; spatial behavior in
//! `polis-spatial`; model calls in `polis-llm`. This crate has no
//! runtime dependency beyond serde, hashing, and `tracing`.

#![deny(missing_docs)]

pub mod action;
pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod schema;
pub mod spatial;
pub mod state;
pub mod validator;
pub mod value;
pub mod view;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use action::{Action, ActionKind, LifecycleRequest, ValidationResult};
pub use agent::{Agent, Decision};
pub use checkpoint::{Checkpoint, CheckpointKind, RunMetadata, SimulationResults};
pub use config::{LlmConfig, LoggingConfig, ObservabilityConfig, SimulationConfig, SpatialConfig};
pub use engine::{Applied, Engine};
pub use error::{
    CheckpointError, ConfigError, LlmError, SchemaError, SimError, SpatialError, StateError,
};
pub use lifecycle::LifecycleOutcome;
pub use schema::{VarKind, VarScope, VariableDefinition, VariableSchema};
pub use spatial::{
    Connection, DEFAULT_NETWORK, Location, Network, SpatialState, TopologyKind,
};
pub use state::{
    AgentRecord, POPULATION_CAP, ReasoningRecord, StateSnapshot, StateUpdates,
};
pub use validator::Validator;
pub use value::ScalarValue;
pub use view::AgentView;
