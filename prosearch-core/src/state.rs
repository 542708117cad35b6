//! Shared run state and reducer merge semantics.
//!
//! `RunState` is the single accumulating state of a research run. Fan-out
//! tasks never touch it directly: each task produces a `StateUpdate`, and
//! updates are merged at the generation's join point through declared
//! reducers — append for list fields, replace for reflection outputs. The
//! append reducers are associative and commutative, so sibling results may
//! merge in any order without lost updates.

use crate::types::{Message, SearchQuery, SourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The accumulating state of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID.
    pub run_id: Uuid,
    /// The research topic, extracted once from the initiating question and
    /// never mutated.
    pub topic: String,
    /// Conversation turns; append-only.
    pub messages: Vec<Message>,
    /// Every query dispatched so far; append-only across branches.
    pub search_queries_issued: Vec<SearchQuery>,
    /// Per-query evidence narratives; append-only. Physical order need not
    /// match dispatch order — treat as an unordered multiset.
    pub evidence_narratives: Vec<String>,
    /// Candidate sources; append-only, may contain duplicates until
    /// finalization deduplicates.
    pub sources_gathered: Vec<SourceRecord>,
    /// Reflection passes completed. Incremented exactly once per pass.
    pub research_loop_count: usize,
    /// Set only by the reflection engine.
    pub is_sufficient: bool,
    /// Replaced (not appended) on each reflection pass.
    pub follow_up_queries: Vec<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunState {
    /// Create a fresh run state for a question. The question becomes the
    /// research topic and the first message.
    pub fn new(question: impl Into<String>) -> Self {
        let topic = question.into();
        Self {
            run_id: Uuid::new_v4(),
            messages: vec![Message::user(topic.clone())],
            topic,
            search_queries_issued: Vec::new(),
            evidence_narratives: Vec::new(),
            sources_gathered: Vec::new(),
            research_loop_count: 0,
            is_sufficient: false,
            follow_up_queries: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Merge one update through the declared reducers.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        self.search_queries_issued
            .extend(update.search_queries_issued);
        self.evidence_narratives.extend(update.evidence_narratives);
        self.sources_gathered.extend(update.sources_gathered);
        self.research_loop_count += update.loop_increment;
        if let Some(sufficient) = update.is_sufficient {
            self.is_sufficient = sufficient;
        }
        if let Some(follow_ups) = update.follow_up_queries {
            self.follow_up_queries = follow_ups;
        }
    }

    /// Number of queries run so far; the dispatch offset for the next
    /// fan-out generation.
    pub fn queries_run_so_far(&self) -> usize {
        self.search_queries_issued.len()
    }
}

/// One component's contribution to the run state.
///
/// List fields use the append reducer (concatenate); `is_sufficient` and
/// `follow_up_queries` use the replace reducer (last writer per generation);
/// `loop_increment` accumulates and is set to 1 only by a reflection pass.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub search_queries_issued: Vec<SearchQuery>,
    pub evidence_narratives: Vec<String>,
    pub sources_gathered: Vec<SourceRecord>,
    pub loop_increment: usize,
    pub is_sufficient: Option<bool>,
    pub follow_up_queries: Option<Vec<String>>,
}

impl StateUpdate {
    /// The contribution of one completed retrieval task: its executed query
    /// plus the narrative and candidate sources it produced.
    pub fn from_retrieval(
        query: SearchQuery,
        narrative: String,
        sources: Vec<SourceRecord>,
    ) -> Self {
        Self {
            search_queries_issued: vec![query],
            evidence_narratives: vec![narrative],
            sources_gathered: sources,
            ..Self::default()
        }
    }

    /// The contribution of one reflection pass.
    pub fn from_reflection(is_sufficient: bool, follow_up_queries: Vec<String>) -> Self {
        Self {
            loop_increment: 1,
            is_sufficient: Some(is_sufficient),
            follow_up_queries: Some(follow_up_queries),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(url: &str) -> SourceRecord {
        SourceRecord {
            url: url.to_string(),
            title: "t".to_string(),
            short_token: format!("[{url}]"),
            canonical_value: url.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn test_new_state_seeds_topic_and_message() {
        let state = RunState::new("what is x?");
        assert_eq!(state.topic, "what is x?");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.research_loop_count, 0);
        assert!(!state.is_sufficient);
    }

    #[test]
    fn test_append_reducers_concatenate() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate::from_retrieval(
            SearchQuery {
                text: "a".into(),
                sequence_id: 0,
            },
            "narrative a".into(),
            vec![record("u://a")],
        ));
        state.apply(StateUpdate::from_retrieval(
            SearchQuery {
                text: "b".into(),
                sequence_id: 1,
            },
            "narrative b".into(),
            vec![record("u://b")],
        ));

        assert_eq!(state.search_queries_issued.len(), 2);
        assert_eq!(state.evidence_narratives.len(), 2);
        assert_eq!(state.sources_gathered.len(), 2);
        assert_eq!(state.queries_run_so_far(), 2);
    }

    #[test]
    fn test_append_reducer_is_order_insensitive_as_multiset() {
        let updates = vec![
            StateUpdate::from_retrieval(
                SearchQuery {
                    text: "a".into(),
                    sequence_id: 0,
                },
                "na".into(),
                vec![],
            ),
            StateUpdate::from_retrieval(
                SearchQuery {
                    text: "b".into(),
                    sequence_id: 1,
                },
                "nb".into(),
                vec![],
            ),
        ];

        let mut forward = RunState::new("q");
        for u in updates.clone() {
            forward.apply(u);
        }
        let mut reverse = RunState::new("q");
        for u in updates.into_iter().rev() {
            reverse.apply(u);
        }

        let mut f: Vec<_> = forward.evidence_narratives.clone();
        let mut r: Vec<_> = reverse.evidence_narratives.clone();
        f.sort();
        r.sort();
        assert_eq!(f, r);
        assert_eq!(forward.queries_run_so_far(), reverse.queries_run_so_far());
    }

    #[test]
    fn test_replace_reducer_overwrites_follow_ups() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate::from_reflection(
            false,
            vec!["f1".into(), "f2".into()],
        ));
        assert_eq!(state.research_loop_count, 1);
        assert_eq!(state.follow_up_queries.len(), 2);

        state.apply(StateUpdate::from_reflection(true, vec!["f3".into()]));
        assert_eq!(state.research_loop_count, 2);
        assert!(state.is_sufficient);
        // Replaced, not appended.
        assert_eq!(state.follow_up_queries, vec!["f3".to_string()]);
    }

    #[test]
    fn test_loop_count_untouched_by_retrieval_updates() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate::from_retrieval(
            SearchQuery {
                text: "a".into(),
                sequence_id: 0,
            },
            "n".into(),
            vec![],
        ));
        assert_eq!(state.research_loop_count, 0);
    }
}
