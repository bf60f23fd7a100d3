//! StaticValidator — rule-driven verdicts without a model call.

use crate::action::{Action, ValidationResult};
use crate::error::SimError;
use crate::state::StateSnapshot;
use crate::validator::Validator;
use async_trait::async_trait;

/// A validator with a fixed policy: approve everything, or reject
/// actions whose payload mentions a configured keyword (standing in
/// for a domain boundary, e.g. an economic validator rejecting
/// military deployments).
pub struct StaticValidator {
    reject_keyword: Option<String>,
}

impl StaticValidator {
    /// Approve every action.
    #[must_use]
    pub fn approve_all() -> Self {
        Self {
            reject_keyword: None,
        }
    }

    /// Reject actions whose payload text contains `keyword`.
    pub fn rejecting(keyword: impl Into<String>) -> Self {
        Self {
            reject_keyword: Some(keyword.into()),
        }
    }
}

#[async_trait]
impl Validator for StaticValidator {
    async fn validate(
        &self,
        actions: Vec<Action>,
        _snapshot: &StateSnapshot,
    ) -> Result<Vec<Action>, SimError> {
        Ok(actions
            .into_iter()
            .map(|action| {
                let rejected = self
                    .reject_keyword
                    .as_deref()
                    .is_some_and(|keyword| action.payload.to_string().contains(keyword));
                let verdict = if rejected {
                    ValidationResult::reject("no legitimate effect within the declared domain", 0.95)
                } else {
                    ValidationResult::accept("legitimate effect within the declared domain", 0.95)
                };
                action.with_verdict(verdict)
            })
            .collect())
    }
}
