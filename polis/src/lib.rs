#![deny(missing_docs)]
//! # polis — umbrella crate
//!
//! Single import surface for the polis simulation framework: the
//! contracts and state model (`polis-core`), spatial subsystem
//! (`polis-spatial`), checkpoint store (`polis-checkpoint`), LLM
//! adapter (`polis-llm`), and orchestrator (`polis-orch`), plus a
//! `prelude` for the happy path and the logging bootstrap.
//!
//! A minimal embedding wires config, strategies, and the
//! orchestrator:
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use polis::prelude::*;
//! use std::sync::Arc;
//! # let my_agent: Arc<dyn Agent> = unimplemented!();
//! # let my_validator: Arc<dyn Validator> = unimplemented!();
//! # let my_engine: Arc<dyn Engine> = unimplemented!();
//!
//! let config = SimulationConfig::from_path("simulation.yaml".as_ref())?;
//! polis::logging::init(config.logging.as_ref());
//!
//! let orchestrator = Orchestrator::builder(config)
//!     .agent(my_agent)
//!     .validator(my_validator)
//!     .engine(my_engine)
//!     .build()?;
//! let outcome = orchestrator.run(RunOptions::default()).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub use polis_checkpoint;
pub use polis_core;
pub use polis_llm;
pub use polis_orch;
pub use polis_spatial;

pub mod logging;

/// Happy-path imports for composing polis simulations.
pub mod prelude {
    pub use polis_checkpoint::{CheckpointStore, Clock};
    pub use polis_core::{
        Action, ActionKind, Agent, AgentView, Applied, Decision, Engine, LifecycleRequest,
        ScalarValue, SimError, SimulationConfig, StateSnapshot, StateUpdates, ValidationResult,
        Validator, VariableSchema,
    };
    pub use polis_llm::{LlmAdapter, OllamaSource, ResponseSource};
    pub use polis_orch::{AgentSpawner, Orchestrator, RunOptions, RunOutcome, RunStatus};
    pub use polis_spatial::{SpatialQuery, SpatialRead};
}
