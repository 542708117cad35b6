//! Core data model for a research run.
//!
//! All inter-component payloads are explicit tagged records, validated at
//! the component boundary. Evidence and source records are immutable after
//! creation; mutation of shared run state happens only through the reducers
//! in [`crate::state`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An internal knowledge base (vector store).
    KnowledgeBase,
    /// The open web.
    Web,
}

/// A single normalized piece of evidence returned by the Retrieval Service.
///
/// `relevance_score` is always canonical: higher means more relevant.
/// Services that report distances are converted via [`canonical_score`]
/// before an `EvidenceItem` is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub source_kind: SourceKind,
    pub title: String,
    pub url: String,
    /// Short excerpt suitable for inline display.
    pub snippet: String,
    /// Full retrieved text.
    pub full_text: String,
    /// Canonical relevance score (higher = more relevant).
    pub relevance_score: f64,
    /// Service-specific metadata, carried through untouched.
    #[serde(default)]
    pub origin_metadata: HashMap<String, serde_json::Value>,
}

/// Convert a raw service score to canonical "higher = more relevant" form.
///
/// Similarity scores pass through unchanged. Distances are mapped with
/// `1 / (1 + d)`, which reverses the ordering and keeps the result in
/// `(0, 1]` so it stays comparable against the relevance floor.
pub fn canonical_score(raw: f64, is_distance: bool) -> f64 {
    if is_distance {
        1.0 / (1.0 + raw.max(0.0))
    } else {
        raw
    }
}

/// A citable source surfaced to the answer stage.
///
/// `short_token` is the citation placeholder the generated answer may embed;
/// `canonical_value` is what that placeholder is replaced with during
/// finalization. Exactly one record exists per evidence item surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    pub title: String,
    pub short_token: String,
    pub canonical_value: String,
    pub score: f64,
}

/// A search query dispatched to one retrieval task.
///
/// `sequence_id` is unique within a run and monotonically assigned: initial
/// queries get `0..N-1`, follow-up batches continue from the number of
/// queries run so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub sequence_id: usize,
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn in the run's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

// --- Typed completion outputs ---------------------------------------------
//
// These mirror the JSON objects the prompts ask the Completion Service to
// emit. Optional fields default so a partially conforming response still
// parses; a response that misses required fields is a SchemaError and the
// calling node falls back.

/// Output of the query-writer prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQueries {
    /// The search queries to dispatch.
    #[serde(alias = "query")]
    pub queries: Vec<String>,
    /// Model-provided rationale; ignored by downstream logic.
    #[serde(default)]
    pub rationale: String,
}

/// Output of the reflection prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub is_sufficient: bool,
    #[serde(default)]
    pub knowledge_gap: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

impl Reflection {
    /// The fail-safe reflection: sufficient, no gap, no follow-ups.
    ///
    /// Returned whenever the reflection call fails, so a broken reasoning
    /// service ends the loop instead of stalling it.
    pub fn fail_safe() -> Self {
        Self {
            is_sufficient: true,
            knowledge_gap: String::new(),
            follow_up_queries: Vec::new(),
        }
    }
}

/// A source descriptor as emitted by the synthesis prompt. The model may
/// omit or alter fields; reconciliation against the original hits recovers
/// the authoritative values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub summary: String,
}

/// Output of the evidence-synthesis prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedEvidence {
    /// The synthesized narrative covering all relevant hits.
    #[serde(alias = "search_content")]
    pub narrative: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

/// Output of the answer prompt, when the model chooses to answer in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer: String,
    #[serde(default)]
    pub summary_points: Vec<String>,
    /// Confidence score in [1, 10].
    #[serde(default = "default_confidence")]
    pub confidence: u8,
}

fn default_confidence() -> u8 {
    8
}
