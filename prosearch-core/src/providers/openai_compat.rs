//! OpenAI-compatible Completion Service provider.
//!
//! Works against any endpoint that follows the OpenAI chat completions API
//! format, including DashScope's compatible mode, vLLM, and Ollama.

use crate::completion::{CompletionRequest, CompletionService};
use crate::config::CompletionConfig;
use crate::error::{ConfigError, ServiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const SERVICE_NAME: &str = "completion";

/// OpenAI-compatible Completion Service over HTTP.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from configuration. The API key comes from
    /// `config.api_key` or, failing that, the configured environment
    /// variable.
    pub fn new(config: &CompletionConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: config.api_key_env.clone(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: config.query_model.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Pull the first choice's message content out of a chat completions
    /// response body.
    fn parse_response(body: &Value) -> Result<String, ServiceError> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ServiceError::ResponseRead {
                service: SERVICE_NAME.to_string(),
                message: "no message content in first choice".to_string(),
            })
    }

    /// Map an HTTP error status to the matching `ServiceError`.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ServiceError {
        match status.as_u16() {
            401 | 403 => ServiceError::AuthFailed {
                service: SERVICE_NAME.to_string(),
            },
            429 => {
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                ServiceError::RateLimited {
                    service: SERVICE_NAME.to_string(),
                    retry_after_secs: retry_secs,
                }
            }
            _ => ServiceError::Transport {
                service: SERVICE_NAME.to_string(),
                message: format!("HTTP {status}: {body}"),
            },
        }
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
impl CompletionService for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let mut body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        debug!(url = %url, model = %model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let response_body =
            response
                .text()
                .await
                .map_err(|e| ServiceError::ResponseRead {
                    service: SERVICE_NAME.to_string(),
                    message: e.to_string(),
                })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let parsed: Value =
            serde_json::from_str(&response_body).map_err(|e| ServiceError::ResponseRead {
                service: SERVICE_NAME.to_string(),
                message: format!("invalid JSON: {e}"),
            })?;

        Self::parse_response(&parsed)
    }

    fn model_name(&self) -> &str {
        &self.default_model
    }
}
