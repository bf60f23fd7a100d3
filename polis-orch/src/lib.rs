#![deny(missing_docs)]
//! Orchestration for polis: the turn scheduler, the per-agent
//! observability filter, and the run lifecycle controller.
//!
//! The orchestrator is single-threaded with respect to state
//! transitions — it owns the current snapshot and is the only writer
//! of that slot. Inside a turn, agent decisions fan out across tokio
//! tasks (results are re-ordered lexicographically by agent name, the
//! canonical ordering everywhere downstream); validation and
//! reduction are sequential; the checkpoint write for turn N
//! completes before turn N+1 begins.

pub mod observe;
pub mod orchestrator;
pub mod turn;

pub use observe::ObservabilityFilter;
pub use orchestrator::{
    AgentSpawner, Orchestrator, OrchestratorBuilder, RunOptions, RunOutcome, RunStatus,
};
pub use turn::{TurnOutput, run_turn};
