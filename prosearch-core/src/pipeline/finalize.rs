//! Answer finalization node.
//!
//! Composes the final answer from the accumulated narratives, substitutes
//! every citation token the model used with its canonical markdown value,
//! and prunes the gathered sources down to the ones actually cited. If the
//! answer model is unreachable, produces a degraded answer that tells the
//! user what evidence was gathered instead of failing the run.

use crate::completion::{extract_typed, CompletionRequest, CompletionService};
use crate::prompts;
use crate::types::{FinalAnswer, SourceRecord};
use tracing::{debug, warn};

/// Marker appended when the narrative history had to be truncated to fit
/// the answer prompt.
const TRUNCATION_MARKER: &str = "\n\n[... earlier evidence truncated ...]";

/// The finished product of a research run.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// The answer text with citation tokens already substituted.
    pub answer: String,
    /// Only the sources the answer actually cited, deduplicated by URL,
    /// in first-citation order.
    pub cited_sources: Vec<SourceRecord>,
    /// Bullet summary, present only when the model answered in JSON.
    pub summary_points: Vec<String>,
    /// Whether the answer model was unreachable and the answer is a
    /// degraded evidence report.
    pub degraded: bool,
}

/// Produce the final answer for `topic` from the gathered narratives and
/// candidate sources.
pub async fn finalize_answer(
    completion: &dyn CompletionService,
    model: &str,
    topic: &str,
    narratives: &[String],
    sources: &[SourceRecord],
    max_narrative_chars: usize,
) -> FinalizeOutcome {
    let summaries = truncate_at_boundary(&narratives.join("\n\n---\n\n"), max_narrative_chars);
    let request = CompletionRequest::new(prompts::answer_prompt(topic, &summaries))
        .with_model(model);

    let (raw_answer, summary_points, degraded) = match completion.complete(request).await {
        Ok(text) => match extract_typed::<FinalAnswer>(&text) {
            Ok(parsed) => {
                debug!(confidence = parsed.confidence, "Answer model replied in JSON");
                (parsed.answer, parsed.summary_points, false)
            }
            // Plain prose answers are fine; JSON is opportunistic here.
            Err(_) => (text, Vec::new(), false),
        },
        Err(e) => {
            warn!(error = %e, "Answer model unreachable; emitting degraded answer");
            (degraded_answer(topic, narratives, sources), Vec::new(), true)
        }
    };

    let (answer, cited_sources) = substitute_citations(&raw_answer, sources);
    FinalizeOutcome {
        answer,
        cited_sources,
        summary_points,
        degraded,
    }
}

/// Replace every citation token appearing in `answer` with its canonical
/// value, returning the substituted text and the cited sources in
/// first-citation order, deduplicated by URL.
pub fn substitute_citations(
    answer: &str,
    sources: &[SourceRecord],
) -> (String, Vec<SourceRecord>) {
    // First-citation order: sort candidates by where their token appears.
    let mut cited: Vec<(usize, &SourceRecord)> = sources
        .iter()
        .filter_map(|record| answer.find(&record.short_token).map(|pos| (pos, record)))
        .collect();
    cited.sort_by_key(|(pos, _)| *pos);

    let mut text = answer.to_string();
    let mut kept: Vec<SourceRecord> = Vec::new();
    for (_, record) in cited {
        text = text.replace(&record.short_token, &record.canonical_value);
        if !kept.iter().any(|k| k.url == record.url) {
            kept.push(record.clone());
        }
    }
    (text, kept)
}

/// Cut `text` to at most `max_chars` characters on a char boundary and
/// append the truncation marker. Under the limit, returns it unchanged.
fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}{TRUNCATION_MARKER}")
}

/// The degraded answer emitted when the answer model is unreachable: an
/// apology plus a count of what the run did gather, so the user still
/// learns something.
fn degraded_answer(topic: &str, narratives: &[String], sources: &[SourceRecord]) -> String {
    format!(
        "The answer service is currently unavailable, so a final answer for \
         \"{topic}\" could not be composed. Research did complete: {} evidence \
         narrative(s) were gathered across {} candidate source(s). Please retry \
         shortly.",
        narratives.len(),
        sources.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;

    fn record(token: &str, url: &str, title: &str) -> SourceRecord {
        SourceRecord {
            url: url.to_string(),
            title: title.to_string(),
            short_token: token.to_string(),
            canonical_value: format!("[{title}]({url})"),
            score: 0.9,
        }
    }

    #[test]
    fn test_substitution_replaces_tokens_and_prunes() {
        let sources = vec![
            record("[src-0-0]", "u://a", "A"),
            record("[src-0-1]", "u://b", "B"),
            record("[src-1-0]", "u://c", "C"),
        ];
        let (text, cited) =
            substitute_citations("Per [src-0-1] and [src-0-0], it holds.", &sources);
        assert_eq!(text, "Per [B](u://b) and [A](u://a), it holds.");
        // First-citation order, uncited C pruned.
        assert_eq!(cited.len(), 2);
        assert_eq!(cited[0].url, "u://b");
        assert_eq!(cited[1].url, "u://a");
    }

    #[test]
    fn test_substitution_dedupes_by_url() {
        let sources = vec![
            record("[src-0-0]", "u://a", "A"),
            record("[src-1-0]", "u://a", "A again"),
        ];
        let (text, cited) = substitute_citations("[src-0-0] then [src-1-0].", &sources);
        assert!(text.contains("[A](u://a)"));
        assert!(text.contains("[A again](u://a)"));
        assert_eq!(cited.len(), 1);
    }

    #[test]
    fn test_no_citations_yields_empty_source_list() {
        let sources = vec![record("[src-0-0]", "u://a", "A")];
        let (text, cited) = substitute_citations("No citations here.", &sources);
        assert_eq!(text, "No citations here.");
        assert!(cited.is_empty());
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let text = "héllo wörld, this is multibyte text".to_string();
        let truncated = truncate_at_boundary(&text, 10);
        assert!(truncated.starts_with("héllo wör"));
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        // Short input passes through untouched.
        assert_eq!(truncate_at_boundary("short", 10), "short");
    }

    #[tokio::test]
    async fn test_plain_text_answer_accepted() {
        let service = MockCompletionService::with_response("The answer cites [src-0-0].");
        let sources = vec![record("[src-0-0]", "u://a", "A")];
        let outcome =
            finalize_answer(&service, "mock-model", "q", &["n".to_string()], &sources, 1000)
                .await;
        assert_eq!(outcome.answer, "The answer cites [A](u://a).");
        assert_eq!(outcome.cited_sources.len(), 1);
        assert!(!outcome.degraded);
        assert!(outcome.summary_points.is_empty());
    }

    #[tokio::test]
    async fn test_json_answer_parsed_opportunistically() {
        let service = MockCompletionService::with_response(
            r#"{"answer": "Cited [src-0-0].", "summary_points": ["point"], "confidence": 7}"#,
        );
        let sources = vec![record("[src-0-0]", "u://a", "A")];
        let outcome =
            finalize_answer(&service, "mock-model", "q", &["n".to_string()], &sources, 1000)
                .await;
        assert_eq!(outcome.answer, "Cited [A](u://a).");
        assert_eq!(outcome.summary_points, vec!["point"]);
    }

    #[tokio::test]
    async fn test_service_error_degrades_with_counts() {
        let service = MockCompletionService::new();
        service.queue_error(MockCompletionService::transport_error());
        let sources = vec![record("[src-0-0]", "u://a", "A")];
        let outcome = finalize_answer(
            &service,
            "mock-model",
            "q",
            &["n1".to_string(), "n2".to_string()],
            &sources,
            1000,
        )
        .await;
        assert!(outcome.degraded);
        assert!(outcome.answer.contains("2 evidence narrative(s)"));
        assert!(outcome.answer.contains("1 candidate source(s)"));
        assert!(outcome.cited_sources.is_empty());
    }

    #[tokio::test]
    async fn test_long_narratives_truncated_in_prompt() {
        let service = MockCompletionService::with_response("answer");
        let long = "x".repeat(500);
        finalize_answer(&service, "mock-model", "q", &[long], &[], 100).await;
        let prompt = service.prompts().remove(0);
        assert!(prompt.contains(TRUNCATION_MARKER));
        assert!(!prompt.contains(&"x".repeat(200)));
    }
}
