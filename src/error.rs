//! Crate-wide error taxonomy for the AuthZ cache coordinator.
//!
//! Mirrors the kinds enumerated for the public API: a local validation
//! failure never reaches the network or the cache, a cache contention
//! failure is distinguished from a server-reported conflict so callers can
//! retry one and not the other, and transport failures carry the
//! underlying `reqwest` error for diagnostics.

use uuid::Uuid;

/// Errors surfaced by cache operations, the request client, and the AuthZ
/// client's public operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Server returned 404, or a cache-only lookup (e.g. by alias) found
    /// nothing and the operation does not fall through to the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// Server reported a duplicate on create. `existing_id` is populated
    /// when the server (or a cache hit under `if_not_exists`) identifies
    /// the entity that already exists.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        existing_id: Option<Uuid>,
    },

    /// A local precondition failed before any cache or network action was
    /// taken (empty name, nil required id, invalid region, attribute flags
    /// not exactly-one-of, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The sentinel protocol could not acquire or commit a lock after
    /// retries. Retriable; distinguished from `Conflict` so callers know a
    /// retry of the *same* request is sensible.
    #[error("cache contention: {0}")]
    CacheContention(String),

    /// Unrecoverable network or decoding failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Bearer token missing or expired and no token source configured to
    /// refresh it.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// Cache backend failure that could not be absorbed (e.g. the
    /// underlying store is unreachable and the operation cannot fall back
    /// to a forced delete).
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for AuthzError {
    fn from(err: reqwest::Error) -> Self {
        AuthzError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::Transport(format!("decode failure: {err}"))
    }
}

impl AuthzError {
    /// True for errors where the caller should retry the identical
    /// operation (as opposed to fixing input and retrying).
    pub fn is_retriable(&self) -> bool {
        matches!(self, AuthzError::CacheContention(_))
    }
}

/// Result alias used throughout the crate.
pub type AuthzResult<T> = Result<T, AuthzError>;
