//! # Prosearch Core
//!
//! Core library for the prosearch iterative research agent.
//! Provides the research engine, the Completion and Retrieval service
//! abstractions with HTTP providers, the pipeline nodes (query generation,
//! evidence normalization, reflection, answer finalization), reducer-based
//! run state, configuration, and fundamental types.

pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retrieval;
pub mod state;
pub mod types;

// Re-export commonly used types at the crate root.
pub use completion::{CompletionRequest, CompletionService, MockCompletionService};
pub use config::{load_config, EvidenceMode, ResearchConfig};
pub use engine::{
    route, NoOpObserver, ResearchEngine, ResearchOutcome, Route, RunObserver, RunRequest,
    RunStats,
};
pub use error::{ResearchError, Result};
pub use providers::{HttpRetrievalProvider, OpenAiCompatibleProvider};
pub use retrieval::{MockRetrievalService, RetrievalService, RetrievedHit};
pub use state::{RunState, StateUpdate};
pub use types::{
    EvidenceItem, Message, Role, SearchQuery, SourceKind, SourceRecord,
};
