//! Configuration system for prosearch.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment -> explicit overrides. Configuration is
//! loaded from `~/.config/prosearch/config.toml` and/or
//! `.prosearch/config.toml` in the workspace directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Top-level configuration for a research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub completion: CompletionConfig,
    pub retrieval: RetrievalConfig,
    pub run: RunConfig,
}

/// Configuration for the Completion Service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over the environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used for query generation.
    pub query_model: String,
    /// Model used for reflection.
    pub reflection_model: String,
    /// Model used for answer finalization.
    pub answer_model: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            api_key: None,
            query_model: "qwen-turbo".to_string(),
            reflection_model: "qwen-max".to_string(),
            answer_model: "qwen-max".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Configuration for the Retrieval Service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the vector-search HTTP endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Collection to search.
    pub collection: String,
    /// Maximum ranked hits requested per query.
    pub top_k: usize,
    /// Whether the service reports distances instead of similarities.
    pub scores_are_distances: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            collection: "demo".to_string(),
            top_k: 10,
            scores_are_distances: false,
            request_timeout_secs: 30,
        }
    }
}

/// How retrieved hits are adapted into an evidence narrative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// Deterministic: keep hits above the relevance floor, no LLM call
    /// required. The safe default.
    #[default]
    Threshold,
    /// LLM-driven: synthesize a narrative from all hits, falling back to
    /// threshold mode on any failure.
    Synthesis,
}

impl FromStr for EvidenceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(Self::Threshold),
            "synthesis" => Ok(Self::Synthesis),
            other => Err(ConfigError::Invalid {
                message: format!("unknown evidence mode '{other}' (threshold|synthesis)"),
            }),
        }
    }
}

/// Run-scoped knobs, immutable after run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of initial search queries to generate.
    pub initial_query_count: usize,
    /// Hard ceiling on reflection passes.
    pub max_research_loops: usize,
    /// Canonical-score floor for threshold-mode filtering.
    pub relevance_floor: f64,
    /// Evidence adaptation mode.
    pub evidence_mode: EvidenceMode,
    /// Whether threshold mode asks the Completion Service to compress each
    /// kept snippet. Off by default, keeping threshold mode deterministic.
    pub compress_snippets: bool,
    /// Maximum characters of concatenated narrative fed to the answer prompt.
    pub max_narrative_chars: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_query_count: 3,
            max_research_loops: 2,
            relevance_floor: 0.5,
            evidence_mode: EvidenceMode::Threshold,
            compress_snippets: false,
            max_narrative_chars: 25_000,
        }
    }
}

impl ResearchConfig {
    /// Validate the parts of the configuration a run cannot proceed without.
    ///
    /// This is the only fatal check in the pipeline: it runs before any
    /// component executes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.base_url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "completion.base_url".to_string(),
            });
        }
        if self.completion.api_key.is_none() && std::env::var(&self.completion.api_key_env).is_err()
        {
            return Err(ConfigError::EnvVarMissing {
                var: self.completion.api_key_env.clone(),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "retrieval.top_k must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the Completion Service API key.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(ref key) = self.completion.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.completion.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
            var: self.completion.api_key_env.clone(),
        })
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PROSEARCH_`)
/// 3. Workspace-local config (`.prosearch/config.toml`)
/// 4. User config (`~/.config/prosearch/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ResearchConfig>,
) -> Result<ResearchConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "prosearch", "prosearch") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".prosearch").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (PROSEARCH_RUN__MAX_RESEARCH_LOOPS, etc.)
    figment = figment.merge(Env::prefixed("PROSEARCH_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_config() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.initial_query_count, 3);
        assert_eq!(cfg.max_research_loops, 2);
        assert!((cfg.relevance_floor - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.evidence_mode, EvidenceMode::Threshold);
        assert!(!cfg.compress_snippets);
        assert_eq!(cfg.max_narrative_chars, 25_000);
    }

    #[test]
    fn test_evidence_mode_from_str() {
        assert_eq!(
            "synthesis".parse::<EvidenceMode>().unwrap(),
            EvidenceMode::Synthesis
        );
        assert!("llm".parse::<EvidenceMode>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut cfg = ResearchConfig {
            completion: CompletionConfig {
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.retrieval.top_k = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_explicit_key() {
        let cfg = ResearchConfig {
            completion: CompletionConfig {
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.resolve_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_workspace_config_layering() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".prosearch");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[run]\nmax_research_loops = 5\n",
        )
        .unwrap();

        let cfg = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(cfg.run.max_research_loops, 5);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.run.initial_query_count, 3);
    }
}
