//! Deterministic doubles for testing simulations without domain
//! engines or a live model server.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that prove the contract APIs are usable and give
//! the determinism harness something reproducible to drive.

mod delta_engine;
mod scripted_agent;
mod static_validator;

pub use delta_engine::DeltaEngine;
pub use scripted_agent::ScriptedAgent;
pub use static_validator::StaticValidator;
