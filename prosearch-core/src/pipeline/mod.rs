//! Pipeline nodes — the four stages the orchestrator cycles between.
//!
//! Each node is a boundary: it catches every service or schema failure and
//! converts it to its documented fallback value, so no error crosses a node
//! and aborts the run. Nodes communicate only through [`crate::state`]
//! reducer updates.

pub mod evidence;
pub mod finalize;
pub mod query;
pub mod reflection;

pub use evidence::{normalize_evidence, EvidenceOutcome, EvidenceParams};
pub use finalize::{finalize_answer, FinalizeOutcome};
pub use query::generate_queries;
pub use reflection::{reflect, ReflectionOutcome};

/// The citation placeholder for evidence item `item_index` of the query
/// with `sequence_id`. Stable across both adaptation modes, embedded in
/// narratives so the answer model can cite, and substituted with the
/// canonical source value at finalization.
pub fn citation_token(sequence_id: usize, item_index: usize) -> String {
    format!("[src-{sequence_id}-{item_index}]")
}
