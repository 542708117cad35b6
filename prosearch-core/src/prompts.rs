//! Prompt builders for the research pipeline.
//!
//! Each builder produces the full prompt text for one Completion Service
//! call. Prompts that expect a typed response spell out the JSON shape so
//! the structured-output parser in [`crate::completion`] can extract it.

use chrono::Utc;

/// Current date in a readable format, stamped into every prompt so the
/// model favors up-to-date information.
pub fn current_date() -> String {
    Utc::now().format("%B %d, %Y").to_string()
}

/// Prompt for the query generator.
pub fn query_writer_prompt(topic: &str, number_queries: usize) -> String {
    format!(
        "Your goal is to generate precise and diverse search queries for an \
         automated research tool that analyzes results and synthesizes information.\n\n\
         Instructions:\n\
         - Prefer a single query; only add more when the question covers multiple \
           aspects that one query cannot span.\n\
         - Each query should focus on one specific aspect of the question.\n\
         - Do not generate more than {number_queries} queries.\n\
         - Do not generate multiple similar queries; one is enough.\n\
         - Queries should surface the most recent information. The current date is {date}.\n\n\
         Respond with a JSON object:\n\
         {{\"queries\": [\"...\"], \"rationale\": \"...\"}}\n\n\
         Context: {topic}",
        number_queries = number_queries,
        date = current_date(),
        topic = topic,
    )
}

/// Prompt for the reflection engine. `summaries` is the accumulated
/// narrative history joined with separators.
pub fn reflection_prompt(topic: &str, summaries: &str) -> String {
    format!(
        "You are an expert research assistant analyzing summaries about \"{topic}\".\n\n\
         Instructions:\n\
         - Identify knowledge gaps or areas that need deeper exploration.\n\
         - If the summaries are sufficient to answer the question, generate no follow-up queries.\n\
         - If a gap exists, generate follow-up queries that would help close it.\n\
         - Follow-up queries must be self-contained, with the context a search needs.\n\n\
         Respond with a JSON object:\n\
         {{\"is_sufficient\": true/false, \"knowledge_gap\": \"...\", \"follow_up_queries\": [\"...\"]}}\n\n\
         Summaries:\n{summaries}",
        topic = topic,
        summaries = summaries,
    )
}

/// Prompt for the answer finalizer. `summaries` is the (truncated)
/// concatenated narrative history.
pub fn answer_prompt(topic: &str, summaries: &str) -> String {
    format!(
        "Generate a high-quality answer to the user's question based on the \
         provided summaries.\n\n\
         Instructions:\n\
         - The current date is {date}.\n\
         - You are the final step of a multi-step research process; do not mention that.\n\
         - Base the answer only on the provided summaries and the user's question.\n\
         - Cite the sources you used by including their citation tokens (for example \
           [src-0-1]) exactly as they appear in the summaries. This is required.\n\n\
         User question:\n{topic}\n\n\
         Summaries:\n{summaries}",
        date = current_date(),
        topic = topic,
        summaries = summaries,
    )
}

/// Prompt for synthesis-mode evidence adaptation. `context` is the formatted
/// block of retrieved hits, including each hit's citation token.
pub fn evidence_synthesis_prompt(query: &str, context: &str) -> String {
    format!(
        "You are given knowledge-base passages retrieved for the query \"{query}\".\n\n\
         Retrieved passages:\n{context}\n\n\
         Your task:\n\
         - Read all passages and keep every point relevant to the query; omit nothing relevant.\n\
         - Integrate the relevant content into a structured, well-organized report.\n\
         - Leave out passages that are not relevant.\n\
         - Stay objective and neutral; use only the retrieved content, no outside knowledge.\n\
         - If the content cannot fully answer the query, state which aspects are missing.\n\n\
         Respond with a JSON object:\n\
         {{\"narrative\": \"...\", \"key_findings\": [\"...\"], \
         \"sources\": [{{\"title\": \"...\", \"url\": \"...\", \"summary\": \"...\"}}]}}\n\n\
         The current date is {date}.",
        query = query,
        context = context,
        date = current_date(),
    )
}

/// Prompt for compressing one snippet down to query-relevant content.
pub fn snippet_compression_prompt(query: &str, snippet: &str) -> String {
    format!(
        "You are given a passage retrieved for the query \"{query}\". Keep only \
         the content highly relevant to that query, remove everything redundant \
         or unrelated, and restate it concisely. Output the refined passage \
         directly, with no extra commentary.\n\n\
         Passage:\n{snippet}",
        query = query,
        snippet = snippet,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_writer_prompt_carries_bound_and_topic() {
        let p = query_writer_prompt("battery recycling regulations", 3);
        assert!(p.contains("more than 3 queries"));
        assert!(p.contains("battery recycling regulations"));
        assert!(p.contains("\"queries\""));
    }

    #[test]
    fn test_reflection_prompt_embeds_summaries() {
        let p = reflection_prompt("topic", "summary one\n---\nsummary two");
        assert!(p.contains("summary one"));
        assert!(p.contains("\"is_sufficient\""));
    }

    #[test]
    fn test_answer_prompt_mentions_citation_tokens() {
        let p = answer_prompt("q", "s");
        assert!(p.contains("[src-0-1]"));
    }
}
