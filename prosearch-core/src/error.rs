//! Error types for the prosearch core.
//!
//! Uses `thiserror` for public API error types. The taxonomy follows the
//! recovery policy of the pipeline: service and schema failures are always
//! recoverable at a component boundary (each node has a documented fallback
//! value); only configuration errors at run start are fatal.

/// Top-level error type for the prosearch core library.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the external Completion and Retrieval services.
///
/// All variants are transient from the pipeline's point of view: a node that
/// sees one converts it to its documented fallback rather than propagating.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Request to {service} failed: {message}")]
    Transport { service: String, message: String },

    #[error("Authentication failed for {service}")]
    AuthFailed { service: String },

    #[error("Request to {service} timed out after {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },

    #[error("Rate limited by {service}, retry after {retry_after_secs}s")]
    RateLimited {
        service: String,
        retry_after_secs: u64,
    },

    #[error("Response from {service} could not be read: {message}")]
    ResponseRead { service: String, message: String },
}

/// Errors from parsing a typed (structured) completion output.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Completion text contains no JSON object")]
    NoJsonObject,

    #[error("JSON object did not match the requested schema: {message}")]
    Mismatch { message: String },
}

/// Errors from the configuration system. The only fatal error class: a run
/// must fail before any component executes if the services are unreachable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },
}

/// A type alias for results using the top-level `ResearchError`.
pub type Result<T> = std::result::Result<T, ResearchError>;
