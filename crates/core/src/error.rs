//! Unified error types for haven.

use tokio_rusqlite::rusqlite;

/// Unified error types shared across the haven crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty manifest path).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("cache error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("cache error: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Install aborted because a manifest asset could not be seeded.
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// Lifecycle state machine rejected a transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Network retrieval failed (offline, DNS failure, transport error).
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The offline fallback document is not present in the static partition.
    #[error("offline fallback missing: {0}")]
    FallbackMissing(String),

    /// A push payload could not be parsed as structured data.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
