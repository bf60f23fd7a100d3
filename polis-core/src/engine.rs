//! The Engine contract — the sole writer of game values and spatial
//! state.

use crate::action::Action;
use crate::error::SimError;
use crate::state::{ReasoningRecord, StateSnapshot};
use async_trait::async_trait;

/// The result of applying one action: the successor snapshot plus any
/// reasoning produced while deciding the update.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The draft snapshot after this action's writes.
    pub snapshot: StateSnapshot,
    /// Reasoning records to append to the turn's trail.
    pub reasoning: Vec<ReasoningRecord>,
}

impl Applied {
    /// An application with no reasoning attached.
    #[must_use]
    pub fn silent(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot,
            reasoning: Vec::new(),
        }
    }
}

/// The domain reduction hook.
///
/// The turn driver invokes `apply_action` once per validated action,
/// sequentially, in the validator-returned (lexicographic) order;
/// unvalidated actions never reach it. Everything around the hook —
/// the skip rule, lifecycle application, the turn increment, the
/// reasoning trail — is the driver's job, so a concrete engine only
/// translates one action into state writes.
///
/// Engines are the *only* component allowed to change game values or
/// spatial state, and they do it exclusively through
/// `StateSnapshot::with_updates` and the spatial mutation functions,
/// both of which return new values. An engine that needs the LLM
/// prepares its prompt from the draft, suspends to the adapter, then
/// applies the decided update synchronously — no state write ever
/// straddles a suspension point. An `LlmError` aborts the turn.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Reduce one validated action into the draft snapshot.
    async fn apply_action(
        &self,
        action: &Action,
        draft: StateSnapshot,
    ) -> Result<Applied, SimError>;
}
