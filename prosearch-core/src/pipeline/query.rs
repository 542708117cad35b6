//! Query generation node.
//!
//! Turns the research topic into a bounded list of search queries via a
//! typed completion call. This node never fails: any service error,
//! malformed response, or empty query list falls back to a single query
//! containing the raw topic, so the pipeline always has work to dispatch.

use crate::completion::{complete_typed, CompletionRequest, CompletionService};
use crate::prompts;
use crate::types::GeneratedQueries;
use tracing::{debug, warn};

/// Generate up to `count` search queries for `topic`.
///
/// Queries are not deduplicated or validated for distinctness; duplicates
/// simply cause duplicate retrieval work.
pub async fn generate_queries(
    completion: &dyn CompletionService,
    model: &str,
    topic: &str,
    count: usize,
) -> Vec<String> {
    let request = CompletionRequest::new(prompts::query_writer_prompt(topic, count))
        .with_model(model)
        .with_temperature(1.0);

    match complete_typed::<GeneratedQueries>(completion, request).await {
        Ok(generated) if !generated.queries.is_empty() => {
            debug!(
                count = generated.queries.len(),
                rationale = %generated.rationale,
                "Generated search queries"
            );
            generated.queries
        }
        Ok(_) => {
            warn!("Query generator returned an empty list; falling back to the raw topic");
            vec![topic.to_string()]
        }
        Err(e) => {
            warn!(error = %e, "Query generation failed; falling back to the raw topic");
            vec![topic.to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;

    #[tokio::test]
    async fn test_generates_queries_from_typed_output() {
        let service = MockCompletionService::with_response(
            r#"{"queries": ["battery recycling EU", "battery recycling US"], "rationale": "two regions"}"#,
        );
        let queries = generate_queries(&service, "mock-model", "battery recycling", 3).await;
        assert_eq!(queries, vec!["battery recycling EU", "battery recycling US"]);
    }

    #[tokio::test]
    async fn test_accepts_query_field_alias() {
        let service =
            MockCompletionService::with_response(r#"{"query": ["one"], "rationale": ""}"#);
        let queries = generate_queries(&service, "mock-model", "topic", 3).await;
        assert_eq!(queries, vec!["one"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_service_error() {
        let service = MockCompletionService::new();
        service.queue_error(MockCompletionService::transport_error());
        let queries = generate_queries(&service, "mock-model", "raw topic", 3).await;
        assert_eq!(queries, vec!["raw topic"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_untyped_response() {
        let service = MockCompletionService::with_response("Sure! Here are some ideas.");
        let queries = generate_queries(&service, "mock-model", "raw topic", 3).await;
        assert_eq!(queries, vec!["raw topic"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_empty_list() {
        let service =
            MockCompletionService::with_response(r#"{"queries": [], "rationale": "none"}"#);
        let queries = generate_queries(&service, "mock-model", "raw topic", 3).await;
        assert_eq!(queries, vec!["raw topic"]);
    }

    #[tokio::test]
    async fn test_duplicates_are_permitted() {
        let service =
            MockCompletionService::with_response(r#"{"queries": ["same", "same"], "rationale": ""}"#);
        let queries = generate_queries(&service, "mock-model", "topic", 2).await;
        assert_eq!(queries, vec!["same", "same"]);
    }
}
