//! Evidence normalization node — retrieval plus adaptation.
//!
//! One invocation handles one dispatched search query: it asks the
//! Retrieval Service for ranked hits, canonicalizes their scores, and
//! adapts them into a narrative plus candidate source records. Two
//! adaptation modes exist: deterministic threshold filtering, and
//! LLM-driven synthesis that falls back to threshold on any failure.
//! The node itself never errors; a hard retrieval outage degrades to a
//! descriptive narrative so sibling tasks are unaffected.

use super::citation_token;
use crate::completion::{complete_typed, CompletionRequest, CompletionService};
use crate::config::EvidenceMode;
use crate::prompts;
use crate::retrieval::{RetrievalService, RetrievedHit};
use crate::types::{
    canonical_score, EvidenceItem, SearchQuery, SourceKind, SourceRecord, SynthesizedEvidence,
};
use tracing::{debug, info, warn};

/// Maximum snippet length carried on an evidence item.
const SNIPPET_CHARS: usize = 200;

/// Knobs for one normalization pass, extracted from the run configuration.
#[derive(Debug, Clone)]
pub struct EvidenceParams {
    pub top_k: usize,
    pub relevance_floor: f64,
    pub mode: EvidenceMode,
    /// Whether threshold mode compresses kept snippets via the Completion
    /// Service. When off, threshold mode makes no LLM calls at all.
    pub compress_snippets: bool,
    /// Model used for synthesis and compression calls.
    pub model: String,
}

/// The result of normalizing one query's evidence.
#[derive(Debug, Clone)]
pub struct EvidenceOutcome {
    pub narrative: String,
    pub sources: Vec<SourceRecord>,
    pub key_findings: Vec<String>,
}

/// Retrieve and adapt evidence for one search query.
pub async fn normalize_evidence(
    retrieval: &dyn RetrievalService,
    completion: &dyn CompletionService,
    params: &EvidenceParams,
    query: &SearchQuery,
) -> EvidenceOutcome {
    let hits = match retrieval.retrieve(&query.text, params.top_k).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query = %query.text, error = %e, "Retrieval failed; degrading to narrative");
            return EvidenceOutcome {
                narrative: format!("Evidence lookup for \"{}\" failed: {e}.", query.text),
                sources: Vec::new(),
                key_findings: vec!["retrieval unavailable".to_string()],
            };
        }
    };

    if hits.is_empty() {
        // A first-class outcome, not an error.
        debug!(query = %query.text, "No hits returned");
        return EvidenceOutcome {
            narrative: format!(
                "No relevant evidence was found for \"{}\".",
                query.text
            ),
            sources: Vec::new(),
            key_findings: vec!["knowledge base returned no matches".to_string()],
        };
    }

    let items = to_evidence_items(
        hits,
        retrieval.scores_are_distances(),
        retrieval.source_kind(),
    );
    info!(query = %query.text, hits = items.len(), mode = ?params.mode, "Adapting evidence");

    match params.mode {
        EvidenceMode::Threshold => {
            threshold_adapt(completion, params, query, &items).await
        }
        EvidenceMode::Synthesis => match synthesis_adapt(completion, params, query, &items).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(query = %query.text, error = %e, "Synthesis failed; falling back to threshold mode");
                threshold_adapt(completion, params, query, &items).await
            }
        },
    }
}

/// Convert raw hits into evidence items with canonical scores.
fn to_evidence_items(
    hits: Vec<RetrievedHit>,
    distances: bool,
    kind: SourceKind,
) -> Vec<EvidenceItem> {
    hits.into_iter()
        .map(|hit| {
            let snippet = if hit.text.chars().count() > SNIPPET_CHARS {
                let cut: String = hit.text.chars().take(SNIPPET_CHARS).collect();
                format!("{cut}...")
            } else {
                hit.text.clone()
            };
            EvidenceItem {
                source_kind: kind,
                title: hit.title,
                url: hit.url,
                snippet,
                full_text: hit.text,
                relevance_score: canonical_score(hit.score, distances),
                origin_metadata: hit.metadata,
            }
        })
        .collect()
}

/// Build the source record for item `idx` of `query`.
fn source_record(query: &SearchQuery, idx: usize, item: &EvidenceItem) -> SourceRecord {
    SourceRecord {
        url: item.url.clone(),
        title: item.title.clone(),
        short_token: citation_token(query.sequence_id, idx),
        canonical_value: canonical_value(&item.title, &item.url),
        score: item.relevance_score,
    }
}

/// The markdown form a citation placeholder is replaced with.
fn canonical_value(title: &str, url: &str) -> String {
    if url.is_empty() {
        format!("[{title}]")
    } else {
        format!("[{title}]({url})")
    }
}

/// Threshold-mode adaptation: keep items at or above the relevance floor
/// and concatenate them into an annotated narrative. Deterministic unless
/// snippet compression is enabled.
async fn threshold_adapt(
    completion: &dyn CompletionService,
    params: &EvidenceParams,
    query: &SearchQuery,
    items: &[EvidenceItem],
) -> EvidenceOutcome {
    let kept: Vec<(usize, &EvidenceItem)> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.relevance_score >= params.relevance_floor)
        .collect();

    if kept.is_empty() {
        return EvidenceOutcome {
            narrative: format!(
                "No sufficiently relevant evidence for \"{}\" (relevance floor {}).",
                query.text, params.relevance_floor
            ),
            sources: Vec::new(),
            key_findings: vec!["no passages met the relevance floor".to_string()],
        };
    }

    let mut parts = vec![format!(
        "Evidence for \"{}\" (passages at or above relevance {}):",
        query.text, params.relevance_floor
    )];

    for (position, (idx, item)) in kept.iter().enumerate() {
        let body = if params.compress_snippets {
            compress_snippet(completion, params, &query.text, item).await
        } else {
            item.snippet.clone()
        };
        parts.push(format!(
            "**{}. {}** (relevance: {:.2}, cite as {})\n{}",
            position + 1,
            item.title,
            item.relevance_score,
            citation_token(query.sequence_id, *idx),
            body,
        ));
    }
    parts.push(format!("{} passages met the relevance floor.", kept.len()));

    let mean_score: f64 =
        kept.iter().map(|(_, item)| item.relevance_score).sum::<f64>() / kept.len() as f64;

    EvidenceOutcome {
        narrative: parts.join("\n\n"),
        sources: kept
            .iter()
            .map(|(idx, item)| source_record(query, *idx, item))
            .collect(),
        key_findings: vec![
            format!("{} passages met the relevance floor", kept.len()),
            format!("relevance floor: {}", params.relevance_floor),
            format!("mean relevance: {mean_score:.2}"),
        ],
    }
}

/// Ask the Completion Service to reduce one passage to query-relevant
/// content. Any failure or blank reply keeps the original snippet.
async fn compress_snippet(
    completion: &dyn CompletionService,
    params: &EvidenceParams,
    query_text: &str,
    item: &EvidenceItem,
) -> String {
    let request =
        CompletionRequest::new(prompts::snippet_compression_prompt(query_text, &item.full_text))
            .with_model(&params.model);
    match completion.complete(request).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => item.snippet.clone(),
        Err(e) => {
            warn!(error = %e, "Snippet compression failed; keeping original snippet");
            item.snippet.clone()
        }
    }
}

/// Synthesis-mode adaptation: one typed completion over all hits.
async fn synthesis_adapt(
    completion: &dyn CompletionService,
    params: &EvidenceParams,
    query: &SearchQuery,
    items: &[EvidenceItem],
) -> Result<EvidenceOutcome, crate::error::ResearchError> {
    let context = format_context(query, items);
    let request =
        CompletionRequest::new(prompts::evidence_synthesis_prompt(&query.text, &context))
            .with_model(&params.model);
    let synthesized: SynthesizedEvidence = complete_typed(completion, request).await?;

    let sources = reconcile_sources(query, items, &synthesized);
    Ok(EvidenceOutcome {
        narrative: synthesized.narrative,
        sources,
        key_findings: synthesized.key_findings,
    })
}

/// Format all hits into the context block for the synthesis prompt, with
/// each passage's citation token so the model can cite inline.
fn format_context(query: &SearchQuery, items: &[EvidenceItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            format!(
                "### Passage {}: {} (relevance: {:.2}, cite as {})\n{}",
                idx + 1,
                item.title,
                item.relevance_score,
                citation_token(query.sequence_id, idx),
                item.full_text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reconcile the model's source descriptors against the original hits by
/// best-effort title matching, recovering the score and URL fields the
/// model may have omitted or altered. An empty descriptor list yields one
/// record per original hit.
fn reconcile_sources(
    query: &SearchQuery,
    items: &[EvidenceItem],
    synthesized: &SynthesizedEvidence,
) -> Vec<SourceRecord> {
    if synthesized.sources.is_empty() {
        return items
            .iter()
            .enumerate()
            .map(|(idx, item)| source_record(query, idx, item))
            .collect();
    }

    synthesized
        .sources
        .iter()
        .enumerate()
        .map(|(desc_idx, desc)| {
            let matched = items.iter().enumerate().find(|(_, item)| {
                let a = item.title.to_lowercase();
                let b = desc.title.to_lowercase();
                !b.is_empty() && (a.contains(&b) || b.contains(&a))
            });
            match matched {
                Some((idx, item)) => {
                    let title = if desc.title.is_empty() {
                        item.title.clone()
                    } else {
                        desc.title.clone()
                    };
                    let url = if desc.url.is_empty() {
                        item.url.clone()
                    } else {
                        desc.url.clone()
                    };
                    SourceRecord {
                        canonical_value: canonical_value(&title, &url),
                        url,
                        title,
                        short_token: citation_token(query.sequence_id, idx),
                        score: item.relevance_score,
                    }
                }
                None => SourceRecord {
                    canonical_value: canonical_value(&desc.title, &desc.url),
                    url: desc.url.clone(),
                    title: desc.title.clone(),
                    // Tokens past the item range never occur in narratives,
                    // so unmatched descriptors are pruned at finalization.
                    short_token: citation_token(query.sequence_id, items.len() + desc_idx),
                    score: 0.0,
                },
            }
        })
        .collect()
}
