//! Reflection node — the convergence decision.
//!
//! After a generation of retrieval tasks joins, this node asks the
//! Completion Service whether the accumulated evidence answers the topic
//! and, if not, which follow-up queries to run. Any failure resolves to
//! the fail-safe verdict (sufficient, no follow-ups) so a broken reflection
//! model can never keep the run looping.

use crate::completion::{complete_typed, CompletionRequest, CompletionService};
use crate::prompts;
use crate::types::Reflection;
use tracing::{debug, warn};

/// Separator between per-query narratives in the reflection context.
const NARRATIVE_SEPARATOR: &str = "\n\n---\n\n";

/// The outcome of one reflection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionOutcome {
    pub is_sufficient: bool,
    pub knowledge_gap: String,
    pub follow_up_queries: Vec<String>,
}

impl From<Reflection> for ReflectionOutcome {
    fn from(r: Reflection) -> Self {
        Self {
            is_sufficient: r.is_sufficient,
            knowledge_gap: r.knowledge_gap,
            follow_up_queries: r.follow_up_queries,
        }
    }
}

/// Judge whether the gathered evidence suffices for the topic.
pub async fn reflect(
    completion: &dyn CompletionService,
    model: &str,
    topic: &str,
    narratives: &[String],
) -> ReflectionOutcome {
    let summaries = narratives.join(NARRATIVE_SEPARATOR);
    let request = CompletionRequest::new(prompts::reflection_prompt(topic, &summaries))
        .with_model(model)
        .with_temperature(1.0);

    match complete_typed::<Reflection>(completion, request).await {
        Ok(reflection) => {
            debug!(
                is_sufficient = reflection.is_sufficient,
                follow_ups = reflection.follow_up_queries.len(),
                "Reflection verdict"
            );
            reflection.into()
        }
        Err(e) => {
            warn!(error = %e, "Reflection failed; applying fail-safe verdict");
            Reflection::fail_safe().into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;

    fn fail_safe() -> ReflectionOutcome {
        ReflectionOutcome {
            is_sufficient: true,
            knowledge_gap: String::new(),
            follow_up_queries: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_parses_typed_verdict() {
        let service = MockCompletionService::with_response(
            r#"{"is_sufficient": false, "knowledge_gap": "missing US data",
                "follow_up_queries": ["US battery rules"]}"#,
        );
        let outcome = reflect(&service, "mock-model", "topic", &["n1".to_string()]).await;
        assert!(!outcome.is_sufficient);
        assert_eq!(outcome.knowledge_gap, "missing US data");
        assert_eq!(outcome.follow_up_queries, vec!["US battery rules"]);
    }

    #[tokio::test]
    async fn test_service_error_yields_fail_safe() {
        let service = MockCompletionService::new();
        service.queue_error(MockCompletionService::transport_error());
        let outcome = reflect(&service, "mock-model", "topic", &["n".to_string()]).await;
        assert_eq!(outcome, fail_safe());
    }

    #[tokio::test]
    async fn test_untyped_response_yields_fail_safe() {
        let service = MockCompletionService::with_response("I think the evidence looks fine.");
        let outcome = reflect(&service, "mock-model", "topic", &["n".to_string()]).await;
        assert_eq!(outcome, fail_safe());
    }

    #[tokio::test]
    async fn test_missing_optional_fields_default() {
        let service = MockCompletionService::with_response(r#"{"is_sufficient": true}"#);
        let outcome = reflect(&service, "mock-model", "topic", &[]).await;
        assert!(outcome.is_sufficient);
        assert!(outcome.knowledge_gap.is_empty());
        assert!(outcome.follow_up_queries.is_empty());
    }

    #[tokio::test]
    async fn test_narratives_joined_with_separator() {
        let service = MockCompletionService::with_response(r#"{"is_sufficient": true}"#);
        reflect(
            &service,
            "mock-model",
            "topic",
            &["first".to_string(), "second".to_string()],
        )
        .await;
        let prompts = service.prompts();
        assert!(prompts[0].contains("first\n\n---\n\nsecond"));
    }
}
