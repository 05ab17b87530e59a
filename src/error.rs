//! Error types for modwatch.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Classifier backend errors. These never escape the classifier adapter —
/// they route the call to the fallback strategy instead.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Provider {provider} request failed: {reason}")]
    Backend { provider: String, reason: String },

    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
}

/// Errors inside asynchronous pipeline stages. Logged by the consuming
/// worker, never propagated past the stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ingestion failed: {0}")]
    Ingest(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unexpected message on topic {topic}")]
    UnexpectedMessage { topic: String },
}

/// Errors surfaced by the ingestion entrypoint.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid submission: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// News feed ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(String),

    #[error("Malformed feed payload: {0}")]
    Malformed(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
