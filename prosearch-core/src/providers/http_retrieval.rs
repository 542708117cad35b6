//! HTTP-backed Retrieval Service provider.
//!
//! Talks to a vector-search gateway over a small JSON API: POST `/search`
//! with the query, collection, and hit limit, receiving ranked hits back.

use crate::config::RetrievalConfig;
use crate::error::{ConfigError, ServiceError};
use crate::retrieval::{RetrievalService, RetrievedHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const SERVICE_NAME: &str = "retrieval";

/// One hit as returned by the search gateway.
#[derive(Debug, Deserialize)]
struct WireHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<WireHit>,
}

/// Retrieval Service over a vector-search HTTP gateway.
pub struct HttpRetrievalProvider {
    client: Client,
    base_url: String,
    collection: String,
    distances: bool,
    timeout_secs: u64,
}

impl HttpRetrievalProvider {
    pub fn new(config: &RetrievalConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| ConfigError::MissingField {
                field: "retrieval.base_url".to_string(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            distances: config.scores_are_distances,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout {
                service: SERVICE_NAME.to_string(),
                timeout_secs: self.timeout_secs,
            }
        } else {
            ServiceError::Transport {
                service: SERVICE_NAME.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl RetrievalService for HttpRetrievalProvider {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedHit>, ServiceError> {
        let url = format!("{}/search", self.base_url);
        let body = json!({
            "query": query,
            "collection": self.collection,
            "top_k": top_k,
        });

        debug!(url = %url, collection = %self.collection, top_k, "Sending retrieval request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ServiceError::AuthFailed {
                service: SERVICE_NAME.to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Transport {
                service: SERVICE_NAME.to_string(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        let parsed: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| ServiceError::ResponseRead {
                    service: SERVICE_NAME.to_string(),
                    message: e.to_string(),
                })?;

        Ok(parsed
            .hits
            .into_iter()
            .map(|hit| RetrievedHit {
                title: hit.title,
                url: hit.url,
                text: hit.text,
                score: hit.score,
                metadata: hit.metadata,
            })
            .collect())
    }

    fn scores_are_distances(&self) -> bool {
        self.distances
    }
}
