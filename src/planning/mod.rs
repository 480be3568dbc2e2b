mod intent;
mod provider;
mod templates;

pub use intent::{parse_intent_reply, route_by_keywords};
pub use provider::ResponseProvider;
pub use templates::{fix_error_steps, steps_for_request};

use std::sync::Arc;

use thiserror::Error;

use crate::models::{ActionPlan, DetectedIssue, Intent, PlanOrigin};

const CLASSIFY_CONTEXT: &str = "You route desktop automation requests. Reply with exactly one of: \
fix_error, debug, setup_software, write_code, general.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("request is empty")]
    EmptyRequest,
    #[error("no steps could be planned for intent {}", .intent.as_str())]
    EmptyPlan { intent: Intent },
}

/// Turns detected issues and user requests into templated plans.
#[derive(Clone, Default)]
pub struct PlanGenerator {
    provider: Option<Arc<dyn ResponseProvider>>,
}

impl PlanGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn ResponseProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Keyword routing first; the provider is only asked about requests that
    /// would otherwise land in `general`.
    pub async fn classify(&self, request: &str) -> Intent {
        let routed = route_by_keywords(request);
        if routed != Intent::General {
            return routed;
        }
        let Some(provider) = &self.provider else {
            return routed;
        };

        match provider.generate_response(request, CLASSIFY_CONTEXT).await {
            Ok(reply) => parse_intent_reply(&reply).unwrap_or_else(|| {
                log::debug!("classifier reply {reply:?} names no intent; using general");
                Intent::General
            }),
            Err(err) => {
                log::warn!("intent classification failed, using general: {err:#}");
                Intent::General
            }
        }
    }

    pub async fn plan_for_request(&self, request: &str) -> Result<ActionPlan, PlanError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(PlanError::EmptyRequest);
        }
        let intent = self.classify(request).await;
        let steps = steps_for_request(intent, request);
        if steps.is_empty() {
            return Err(PlanError::EmptyPlan { intent });
        }
        Ok(ActionPlan::new(
            PlanOrigin::UserRequest(request.to_string()),
            intent,
            steps,
        ))
    }

    pub fn plan_for_issue(&self, issue: &DetectedIssue) -> Result<ActionPlan, PlanError> {
        let steps = fix_error_steps(&issue.keyword);
        if steps.is_empty() {
            return Err(PlanError::EmptyPlan {
                intent: Intent::FixError,
            });
        }
        Ok(ActionPlan::new(
            PlanOrigin::Issue(issue.clone()),
            Intent::FixError,
            steps,
        ))
    }
}
