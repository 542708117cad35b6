//! Concrete service implementations backed by HTTP endpoints.

pub mod http_retrieval;
pub mod openai_compat;

pub use http_retrieval::HttpRetrievalProvider;
pub use openai_compat::OpenAiCompatibleProvider;
