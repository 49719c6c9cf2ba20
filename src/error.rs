//! Memoria error types

use thiserror::Error;

/// Memoria error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error (empty or malformed user id / namespace)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Access denied. Deliberately carries no reason.
    #[error("Access denied")]
    AccessDenied,

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Graph store error
    #[error("Graph error: {0}")]
    Graph(String),

    /// Lock/cache store error
    #[error("Lock store error: {0}")]
    LockStore(String),

    /// Insight evaluation or summarization service error
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A dependency call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, Error>;

/// Run `fut` with a deadline, mapping elapsed deadlines to [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(
    what: &str,
    limit: std::time::Duration,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} after {:?}", what, limit))),
    }
}
