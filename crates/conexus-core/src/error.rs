//! Error types for conexus-core.
//!
//! `ConexusError` is a closed ten-kind taxonomy. Each variant carries a
//! human message and, where relevant, a chained `source` so callers can
//! both pattern-match on the kind and inspect the underlying cause.
//! JSON-RPC handlers in `conexus-mcp` map each kind to one of the
//! protocol's application error codes; the kind itself is never lost at
//! that boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all conexus-core operations.
#[derive(Debug, Error)]
pub enum ConexusError {
    /// Missing or ill-typed tool/operation arguments. Recoverable: fix and retry.
    #[error("invalid parameters: {message}")]
    InvalidParams {
        /// Human-readable description of what was wrong.
        message: String,
    },

    /// Empty, non-UTF-8, or otherwise malformed path. Recoverable.
    #[error("invalid path {path}: {message}")]
    InvalidPath {
        /// The offending path, as given by the caller.
        path: String,
        /// Human-readable description of what was wrong.
        message: String,
    },

    /// Path resolves outside its base directory. Not recoverable -- the
    /// request itself must change, not just be retried.
    #[error("path traversal rejected: {path}")]
    PathTraversal {
        /// The offending path, as given by the caller.
        path: String,
    },

    /// Requested file, chunk, or connector id does not exist. Recoverable.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// The Merkle state file failed its schema check on load. Recoverable
    /// by resetting to an empty index and rebuilding.
    #[error("corrupt merkle state at {path}: {message}")]
    CorruptState {
        /// Path to the Merkle state file.
        path: PathBuf,
        /// Human-readable description of the failure.
        message: String,
    },

    /// A stored row failed an invariant at read time (e.g. wrong vector
    /// dimension). Partially recoverable: the row is excluded, the rest of
    /// the query proceeds.
    #[error("corrupt data for {id}: {message}")]
    CorruptData {
        /// Identifier of the offending row.
        id: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// Embedding (or connector) provider is unreachable or failed auth.
    /// Recoverable: caller may retry or fall back.
    #[error("provider unavailable ({provider}): {message}")]
    ProviderUnavailable {
        /// Registry key of the provider that failed.
        provider: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// Embedding or connector provider throttled the request. Recoverable
    /// after backoff.
    #[error("rate limited by {provider}")]
    RateLimited {
        /// Registry key of the provider that throttled the request.
        provider: String,
    },

    /// A cancellation token was observed during a long-running operation.
    /// Recoverable: the caller may re-issue the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// All other unexpected conditions, including wrapped external errors
    /// (SQLite, I/O, serialization) that don't map onto a more specific
    /// kind above.
    #[error("internal error: {message}")]
    InternalError {
        /// Human-readable description.
        message: String,
        /// Chained cause, if the error originated from a lower layer.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConexusError {
    /// Short, stable kind name matching the error taxonomy. Used by
    /// JSON-RPC handlers to populate `error.data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => "InvalidParams",
            Self::InvalidPath { .. } => "InvalidPath",
            Self::PathTraversal { .. } => "PathTraversal",
            Self::NotFound { .. } => "NotFound",
            Self::CorruptState { .. } => "CorruptState",
            Self::CorruptData { .. } => "CorruptData",
            Self::ProviderUnavailable { .. } => "ProviderUnavailable",
            Self::RateLimited { .. } => "RateLimited",
            Self::Cancelled => "Cancelled",
            Self::InternalError { .. } => "InternalError",
        }
    }

    /// The JSON-RPC error code a handler should use when surfacing this
    /// error: `InvalidParams`/`InvalidPath`/`PathTraversal` map to
    /// `-32602`, everything else to `-32603` with the kind embedded in
    /// `data`.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidParams { .. }
            | Self::InvalidPath { .. }
            | Self::PathTraversal { .. } => -32602,
            _ => -32603,
        }
    }

    /// Build an `InternalError` with no chained cause.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            source: None,
        }
    }
}

impl From<rusqlite::Error> for ConexusError {
    fn from(e: rusqlite::Error) -> Self {
        Self::InternalError {
            message: format!("database error: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

impl From<std::io::Error> for ConexusError {
    fn from(e: std::io::Error) -> Self {
        Self::InternalError {
            message: format!("I/O error: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for ConexusError {
    fn from(e: serde_json::Error) -> Self {
        Self::CorruptData {
            id: "<serialized-state>".into(),
            message: format!("serialization error: {e}"),
        }
    }
}

/// Convenience type alias for Results in conexus-core.
pub type ConexusResult<T> = Result<T, ConexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_code_maps_invalid_params_family() {
        assert_eq!(ConexusError::InvalidParams { message: "x".into() }.rpc_code(), -32602);
        assert_eq!(ConexusError::PathTraversal { path: "../x".into() }.rpc_code(), -32602);
        assert_eq!(ConexusError::Cancelled.rpc_code(), -32603);
    }

    #[test]
    fn kind_names_match_taxonomy() {
        assert_eq!(ConexusError::NotFound { entity: "x".into() }.kind(), "NotFound");
        assert_eq!(ConexusError::RateLimited { provider: "mock".into() }.kind(), "RateLimited");
    }
}
