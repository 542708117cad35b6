//! Research engine — drives the query/retrieve/reflect/finalize loop.
//!
//! The engine owns the run lifecycle: it seeds the run state from the
//! question, fans retrieval tasks out concurrently per generation, merges
//! their updates at the join barrier, consults the pure routing function
//! after each reflection, and finalizes the answer. Termination is
//! guaranteed by the hard loop ceiling plus the rule that an empty fan-out
//! forces sufficiency.

use crate::completion::CompletionService;
use crate::config::{EvidenceMode, ResearchConfig};
use crate::error::{ConfigError, Result};
use crate::pipeline::{
    finalize_answer, generate_queries, normalize_evidence, reflect, EvidenceParams,
};
use crate::retrieval::RetrievalService;
use crate::state::{RunState, StateUpdate};
use crate::types::{Message, SearchQuery, SourceRecord};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the run goes next. Computed purely from the current state and the
/// loop ceiling; evaluating it has no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Dispatch one retrieval task per query; `offset` is the sequence ID
    /// of the first.
    FanOut { queries: Vec<String>, offset: usize },
    /// Stop researching and compose the answer.
    Finalize,
}

/// Decide the next step for `state` under the loop ceiling `max_loops`.
///
/// Finalizes when the evidence was judged sufficient or the ceiling is
/// reached, whichever comes first. Total: defined for every state.
pub fn route(state: &RunState, max_loops: usize) -> Route {
    if state.is_sufficient || state.research_loop_count >= max_loops {
        Route::Finalize
    } else {
        Route::FanOut {
            queries: state.follow_up_queries.clone(),
            offset: state.queries_run_so_far(),
        }
    }
}

/// Per-run request, with optional overrides on top of the engine config.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub question: String,
    pub initial_query_count: Option<usize>,
    pub max_research_loops: Option<usize>,
    /// Overrides the reflection and answer models for this run.
    pub reasoning_model: Option<String>,
    pub evidence_mode: Option<EvidenceMode>,
}

impl RunRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// Summary counters for a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub queries_dispatched: usize,
    pub reflection_passes: usize,
    pub sources_gathered: usize,
    pub degraded_answer: bool,
}

/// The result handed back to the caller.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub answer: String,
    /// Sources the answer cited, deduplicated, in first-citation order.
    pub sources: Vec<SourceRecord>,
    pub summary_points: Vec<String>,
    pub stats: RunStats,
    /// Full final state, for callers that persist or inspect runs.
    pub state: RunState,
}

/// Callback trait for progressive run updates. All methods default to
/// no-ops so observers implement only what they care about.
pub trait RunObserver: Send + Sync {
    /// Called once the initial queries are generated.
    fn on_queries_generated(&self, _queries: &[String]) {}
    /// Called when one retrieval task completes.
    fn on_evidence_gathered(&self, _query: &str, _sources_found: usize) {}
    /// Called after each reflection pass.
    fn on_reflection(&self, _pass: usize, _is_sufficient: bool, _follow_ups: usize) {}
    /// Called just before answer finalization.
    fn on_finalizing(&self) {}
}

/// No-op observer for callers that do not track progress.
pub struct NoOpObserver;

impl RunObserver for NoOpObserver {}

/// The main research engine.
pub struct ResearchEngine {
    completion: Arc<dyn CompletionService>,
    retrieval: Arc<dyn RetrievalService>,
    config: ResearchConfig,
}

impl ResearchEngine {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        retrieval: Arc<dyn RetrievalService>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            completion,
            retrieval,
            config,
        }
    }

    /// Run one research request to completion.
    pub async fn run(&self, request: RunRequest) -> Result<ResearchOutcome> {
        self.run_with_observer(request, &NoOpObserver).await
    }

    /// Run one research request, reporting progress to `observer`.
    pub async fn run_with_observer(
        &self,
        request: RunRequest,
        observer: &dyn RunObserver,
    ) -> Result<ResearchOutcome> {
        if request.question.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "research question must not be empty".to_string(),
            }
            .into());
        }

        let max_loops = request
            .max_research_loops
            .unwrap_or(self.config.run.max_research_loops);
        let query_count = request
            .initial_query_count
            .unwrap_or(self.config.run.initial_query_count);
        let reasoning_model = request
            .reasoning_model
            .clone()
            .unwrap_or_else(|| self.config.completion.reflection_model.clone());
        let params = EvidenceParams {
            top_k: self.config.retrieval.top_k,
            relevance_floor: self.config.run.relevance_floor,
            mode: request.evidence_mode.unwrap_or(self.config.run.evidence_mode),
            compress_snippets: self.config.run.compress_snippets,
            model: self.config.completion.query_model.clone(),
        };

        let mut state = RunState::new(request.question.clone());
        info!(run_id = %state.run_id, max_loops, "Starting research run");

        // Initial queries land in the same slot follow-ups use, so the loop
        // below is uniform across generations. With max_loops of zero the
        // router finalizes before anything is dispatched.
        let initial = generate_queries(
            self.completion.as_ref(),
            &self.config.completion.query_model,
            &state.topic,
            query_count,
        )
        .await;
        observer.on_queries_generated(&initial);
        state.apply(StateUpdate {
            follow_up_queries: Some(initial),
            ..StateUpdate::default()
        });

        loop {
            let (queries, offset) = match route(&state, max_loops) {
                Route::Finalize => break,
                Route::FanOut { queries, offset } => (queries, offset),
            };

            if queries.is_empty() {
                // Nothing left to research; a pass with no queries would
                // spin the loop without adding evidence.
                debug!("Empty fan-out; forcing sufficiency");
                state.apply(StateUpdate {
                    is_sufficient: Some(true),
                    ..StateUpdate::default()
                });
                continue;
            }

            let updates = self.fan_out(&queries, offset, &params, observer).await;
            for update in updates {
                state.apply(update);
            }

            let verdict = reflect(
                self.completion.as_ref(),
                &reasoning_model,
                &state.topic,
                &state.evidence_narratives,
            )
            .await;
            observer.on_reflection(
                state.research_loop_count + 1,
                verdict.is_sufficient,
                verdict.follow_up_queries.len(),
            );
            state.apply(StateUpdate::from_reflection(
                verdict.is_sufficient,
                verdict.follow_up_queries,
            ));
        }

        observer.on_finalizing();
        let answer_model = request
            .reasoning_model
            .as_deref()
            .unwrap_or(&self.config.completion.answer_model);
        let finalized = finalize_answer(
            self.completion.as_ref(),
            answer_model,
            &state.topic,
            &state.evidence_narratives,
            &state.sources_gathered,
            self.config.run.max_narrative_chars,
        )
        .await;

        state.apply(StateUpdate {
            messages: vec![Message::assistant(finalized.answer.clone())],
            ..StateUpdate::default()
        });

        let stats = RunStats {
            queries_dispatched: state.queries_run_so_far(),
            reflection_passes: state.research_loop_count,
            sources_gathered: state.sources_gathered.len(),
            degraded_answer: finalized.degraded,
        };
        info!(
            run_id = %state.run_id,
            queries = stats.queries_dispatched,
            passes = stats.reflection_passes,
            "Research run complete"
        );

        Ok(ResearchOutcome {
            answer: finalized.answer,
            sources: finalized.cited_sources,
            summary_points: finalized.summary_points,
            stats,
            state,
        })
    }

    /// Dispatch one generation of retrieval tasks concurrently and collect
    /// their state updates. Order of the returned updates is the dispatch
    /// order, but merge semantics do not depend on it.
    async fn fan_out(
        &self,
        queries: &[String],
        offset: usize,
        params: &EvidenceParams,
        observer: &dyn RunObserver,
    ) -> Vec<StateUpdate> {
        let tasks = queries.iter().enumerate().map(|(i, text)| {
            let query = SearchQuery {
                text: text.clone(),
                sequence_id: offset + i,
            };
            async move {
                let outcome = normalize_evidence(
                    self.retrieval.as_ref(),
                    self.completion.as_ref(),
                    params,
                    &query,
                )
                .await;
                observer.on_evidence_gathered(&query.text, outcome.sources.len());
                StateUpdate::from_retrieval(query, outcome.narrative, outcome.sources)
            }
        });
        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_after_reflection(loops: usize, sufficient: bool, follow_ups: Vec<String>) -> RunState {
        let mut state = RunState::new("q");
        for _ in 0..loops.saturating_sub(1) {
            state.apply(StateUpdate::from_reflection(false, vec!["f".into()]));
        }
        if loops > 0 {
            state.apply(StateUpdate::from_reflection(sufficient, follow_ups));
        }
        state
    }

    #[test]
    fn test_route_finalizes_when_sufficient() {
        let state = state_after_reflection(1, true, vec!["leftover".into()]);
        assert_eq!(route(&state, 5), Route::Finalize);
    }

    #[test]
    fn test_route_finalizes_at_loop_ceiling() {
        let state = state_after_reflection(2, false, vec!["more".into()]);
        assert_eq!(route(&state, 2), Route::Finalize);
    }

    #[test]
    fn test_route_fans_out_below_ceiling() {
        let state = state_after_reflection(1, false, vec!["follow-up".into()]);
        match route(&state, 3) {
            Route::FanOut { queries, offset } => {
                assert_eq!(queries, vec!["follow-up"]);
                assert_eq!(offset, 0);
            }
            other => panic!("expected fan-out, got {other:?}"),
        }
    }

    #[test]
    fn test_route_zero_ceiling_always_finalizes() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate {
            follow_up_queries: Some(vec!["initial".into()]),
            ..StateUpdate::default()
        });
        assert_eq!(route(&state, 0), Route::Finalize);
    }

    #[test]
    fn test_route_offset_tracks_dispatched_queries() {
        let mut state = state_after_reflection(1, false, vec!["next".into()]);
        state.apply(StateUpdate::from_retrieval(
            SearchQuery {
                text: "done".into(),
                sequence_id: 0,
            },
            "n".into(),
            vec![],
        ));
        match route(&state, 3) {
            Route::FanOut { offset, .. } => assert_eq!(offset, 1),
            other => panic!("expected fan-out, got {other:?}"),
        }
    }
}
