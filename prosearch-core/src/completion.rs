//! Completion Service abstraction.
//!
//! Defines the `CompletionService` trait the pipeline nodes call for every
//! model interaction, a structured-output helper that extracts a typed JSON
//! object from free-form completion text, and a queue-based mock for tests.

use crate::error::{ResearchError, SchemaError, ServiceError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use tracing::debug;

/// One completion request. Prompts are fully rendered before they get here;
/// the service adds no conversation state of its own.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Model override; the provider's default is used when absent.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for the external Completion Service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Perform a completion and return the response text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError>;

    /// Return the provider's default model name.
    fn model_name(&self) -> &str;
}

/// Extract the first JSON object embedded in completion text and parse it
/// into `T`.
///
/// Models frequently wrap JSON in prose or code fences; slicing from the
/// first `{` to the last `}` recovers the object in those cases. Anything
/// that still fails to parse is a `SchemaError`, which callers convert to
/// their documented fallback.
pub fn extract_typed<T: DeserializeOwned>(text: &str) -> Result<T, SchemaError> {
    let start = text.find('{').ok_or(SchemaError::NoJsonObject)?;
    let end = text.rfind('}').ok_or(SchemaError::NoJsonObject)?;
    if end < start {
        return Err(SchemaError::NoJsonObject);
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| SchemaError::Mismatch {
        message: e.to_string(),
    })
}

/// Perform a completion and parse the response as a typed JSON object.
pub async fn complete_typed<T: DeserializeOwned>(
    service: &dyn CompletionService,
    request: CompletionRequest,
) -> Result<T, ResearchError> {
    let text = service.complete(request).await?;
    debug!(response_len = text.len(), "Parsing typed completion output");
    Ok(extract_typed(&text)?)
}

/// A mock Completion Service for testing and development.
///
/// Responses are queued and returned in order; queueing an error simulates
/// a service failure for that call. With an empty queue it returns a fixed
/// placeholder text.
pub struct MockCompletionService {
    model: String,
    responses: Mutex<Vec<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns the given text for every call.
    pub fn with_response(text: &str) -> Self {
        let service = Self::new();
        for _ in 0..20 {
            service.queue_text(text);
        }
        service
    }

    /// Queue a text response for the next `complete` call.
    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push(Ok(text.to_string()));
    }

    /// Queue a failure for the next `complete` call.
    pub fn queue_error(&self, error: ServiceError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of `complete` calls received.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// A transport error suitable for queueing in tests.
    pub fn transport_error() -> ServiceError {
        ServiceError::Transport {
            service: "completion".to_string(),
            message: "mock transport failure".to_string(),
        }
    }
}

impl Default for MockCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(request.prompt);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("Mock completion. No queued responses available.".to_string())
        } else {
            responses.remove(0)
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reflection;

    #[tokio::test]
    async fn test_mock_returns_queued_responses_in_order() {
        let service = MockCompletionService::new();
        service.queue_text("first");
        service.queue_text("second");

        let a = service
            .complete(CompletionRequest::new("p1"))
            .await
            .unwrap();
        let b = service
            .complete(CompletionRequest::new("p2"))
            .await
            .unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_queued_error_surfaces() {
        let service = MockCompletionService::new();
        service.queue_error(MockCompletionService::transport_error());
        let result = service.complete(CompletionRequest::new("p")).await;
        assert!(matches!(result, Err(ServiceError::Transport { .. })));
    }

    #[test]
    fn test_extract_typed_from_fenced_json() {
        let text = "Here you go:\n```json\n{\"is_sufficient\": true, \
                    \"knowledge_gap\": \"\", \"follow_up_queries\": []}\n```";
        let parsed: Reflection = extract_typed(text).unwrap();
        assert!(parsed.is_sufficient);
    }

    #[test]
    fn test_extract_typed_no_object() {
        let result = extract_typed::<Reflection>("no json here");
        assert!(matches!(result, Err(SchemaError::NoJsonObject)));
    }

    #[test]
    fn test_extract_typed_schema_mismatch() {
        let result = extract_typed::<Reflection>("{\"unexpected\": 1}");
        assert!(matches!(result, Err(SchemaError::Mismatch { .. })));
    }

    #[tokio::test]
    async fn test_complete_typed_roundtrip() {
        let service = MockCompletionService::with_response(
            "{\"is_sufficient\": false, \"knowledge_gap\": \"dates\", \
             \"follow_up_queries\": [\"when?\"]}",
        );
        let parsed: Reflection = complete_typed(&service, CompletionRequest::new("p"))
            .await
            .unwrap();
        assert!(!parsed.is_sufficient);
        assert_eq!(parsed.follow_up_queries, vec!["when?"]);
    }
}
