//! The Validator contract — marks actions valid or invalid.

use crate::action::Action;
use crate::error::SimError;
use crate::state::StateSnapshot;
use async_trait::async_trait;

/// A domain policy that marks each proposed action.
///
/// `validate` returns the same actions with `validated` set and
/// `validation_result` populated; it never mutates the snapshot and
/// never drops or reorders items. Verdicts are independent per
/// action — no item's verdict may depend on another's.
///
/// Concrete validators are external. The documented default policy is
/// permissive: accept when the action shows any legitimate effect
/// within the declared domain. LLM-backed validators call the adapter;
/// an `LlmError` here aborts the turn.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Attach a verdict to every action, preserving order.
    async fn validate(
        &self,
        actions: Vec<Action>,
        snapshot: &StateSnapshot,
    ) -> Result<Vec<Action>, SimError>;
}
