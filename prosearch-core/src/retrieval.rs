//! Retrieval Service abstraction.
//!
//! Defines the `RetrievalService` trait for ranked evidence lookup and a
//! queue-based mock for tests. An empty hit list is a first-class outcome,
//! not an error; services fail only on connectivity or auth problems.

use crate::error::ServiceError;
use crate::types::SourceKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One raw ranked hit as returned by the Retrieval Service, before score
/// canonicalization.
#[derive(Debug, Clone)]
pub struct RetrievedHit {
    pub title: String,
    pub url: String,
    pub text: String,
    /// Raw service score; direction is defined by `scores_are_distances`.
    pub score: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RetrievedHit {
    pub fn new(title: &str, url: &str, text: &str, score: f64) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            text: text.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }
}

/// Trait for the external Retrieval Service.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Return up to `top_k` ranked hits for the query. An empty list means
    /// no evidence was found and is not an error.
    async fn retrieve(&self, query: &str, top_k: usize)
        -> Result<Vec<RetrievedHit>, ServiceError>;

    /// Whether `RetrievedHit::score` is a distance (lower = more relevant)
    /// rather than a similarity.
    fn scores_are_distances(&self) -> bool {
        false
    }

    /// The kind of source this service searches.
    fn source_kind(&self) -> SourceKind {
        SourceKind::KnowledgeBase
    }
}

/// A mock Retrieval Service for testing.
///
/// Responses are queued per call; with an empty queue every call returns
/// the configured default hits (empty unless set).
pub struct MockRetrievalService {
    responses: Mutex<Vec<Result<Vec<RetrievedHit>, ServiceError>>>,
    default_hits: Vec<RetrievedHit>,
    distances: bool,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockRetrievalService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_hits: Vec::new(),
            distances: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns the given hits for every call.
    pub fn with_hits(hits: Vec<RetrievedHit>) -> Self {
        Self {
            default_hits: hits,
            ..Self::new()
        }
    }

    /// Mark this mock as reporting distances instead of similarities.
    pub fn reporting_distances(mut self) -> Self {
        self.distances = true;
        self
    }

    /// Queue a hit list for the next `retrieve` call.
    pub fn queue_hits(&self, hits: Vec<RetrievedHit>) {
        self.responses.lock().unwrap().push(Ok(hits));
    }

    /// Queue a failure for the next `retrieve` call.
    pub fn queue_error(&self, error: ServiceError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Queries received so far, in call order, with their `top_k`.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }

    /// Number of `retrieve` calls received.
    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    /// A transport error suitable for queueing in tests.
    pub fn transport_error() -> ServiceError {
        ServiceError::Transport {
            service: "retrieval".to_string(),
            message: "mock transport failure".to_string(),
        }
    }
}

impl Default for MockRetrievalService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetrievalService for MockRetrievalService {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedHit>, ServiceError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), top_k));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_hits.clone())
        } else {
            responses.remove(0)
        }
    }

    fn scores_are_distances(&self) -> bool {
        self.distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_default_hits() {
        let service = MockRetrievalService::with_hits(vec![RetrievedHit::new(
            "Doc", "u://1", "text", 0.9,
        )]);
        let hits = service.retrieve("q", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Doc");
        assert_eq!(service.queries(), vec![("q".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_mock_queue_precedes_default() {
        let service = MockRetrievalService::with_hits(vec![RetrievedHit::new(
            "Default", "u://d", "t", 0.5,
        )]);
        service.queue_hits(vec![]);
        assert!(service.retrieve("q", 5).await.unwrap().is_empty());
        // Queue exhausted, falls back to defaults.
        assert_eq!(service.retrieve("q", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let service = MockRetrievalService::new();
        service.queue_error(MockRetrievalService::transport_error());
        assert!(service.retrieve("q", 3).await.is_err());
    }
}
