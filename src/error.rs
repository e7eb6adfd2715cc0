//! Error types for the sync engine.
//!
//! Nothing here is fatal: the worst outcome anywhere in the engine is a
//! temporarily stale or rolled-back view. Staleness itself is not an error
//! (see `progress::Freshness`), and client-side bounds rejections are plain
//! no-op outcomes rather than errors.

use thiserror::Error;

/// Sync engine error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Server returned 401. The credential has already been discarded and the
    /// unauthorized signal fired by the time callers see this.
    #[error("unauthorized: credential rejected by server")]
    Unauthorized,

    /// Network failure with nothing cached to fall back on.
    #[error("progress unavailable: {0}")]
    Unavailable(String),

    /// Server returned a non-success status outside the mutation paths.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// A mutation request was rejected by the server; the optimistic value
    /// has been rolled back.
    #[error("mutation failed with status {status}")]
    MutationFailed { status: u16 },

    /// The bundled graph document is malformed (e.g. a relation references a
    /// concept id that does not exist).
    #[error("bad graph document: {0}")]
    BadDocument(String),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error (settings, bundled assets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True when a refresh hitting this error may fall back to cached data.
    /// 401 must never degrade silently — it has to surface.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, SyncError::Unauthorized)
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
