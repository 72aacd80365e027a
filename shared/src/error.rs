use thiserror::Error;

/// Error taxonomy of the import pipeline.
///
/// `Network`/`ExchangeUnavailable` are transient and retried inside the
/// connector; everything else is terminal for the chunk or the run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import parameters: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("wrong response shape: {0}")]
    WrongResponseShape(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
