//! Error types for Vitrine
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Vitrine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Vitrine error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session mailbox full: {session_id}, depth: {depth}, max: {max}")]
    SessionMailboxFull {
        session_id: String,
        depth: usize,
        max: usize,
    },

    #[error("Session closed: {session_id}")]
    SessionClosed { session_id: String },

    #[error("Session operation failed: {session_id}, operation: {operation}, reason: {reason}")]
    SessionOperationFailed {
        session_id: String,
        operation: String,
        reason: String,
    },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid session ID: {session_id}, reason: {reason}")]
    InvalidSessionId { session_id: String, reason: String },

    #[error("Message content too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageContentTooLarge { size: usize, limit: usize },

    #[error("Image payload too large: {size} bytes exceeds limit of {limit} bytes")]
    ImagePayloadTooLarge { size: usize, limit: usize },

    #[error("Image payload invalid: {reason}")]
    ImagePayloadInvalid { reason: String },

    #[error("Empty turn: a query or an image payload is required")]
    EmptyTurn,

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Inference call failed: {operation}, reason: {reason}")]
    InferenceFailed { operation: String, reason: String },

    #[error("Vector search failed: {reason}")]
    VectorSearchFailed { reason: String },

    #[error("Knowledge proxy unavailable: {reason}")]
    KnowledgeUnavailable { reason: String },

    #[error("Analytics lookup failed: {reason}")]
    AnalyticsFailed { reason: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Storage read failed: {key}, reason: {reason}")]
    StorageReadFailed { key: String, reason: String },

    #[error("Storage write failed: {key}, reason: {reason}")]
    StorageWriteFailed { key: String, reason: String },

    #[error("Archive write failed: {session_id}, reason: {reason}")]
    ArchiveWriteFailed { session_id: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create a session operation failed error
    pub fn session_operation_failed(
        session_id: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SessionOperationFailed {
            session_id: session_id.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an inference failed error
    pub fn inference_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InferenceFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage read failed error
    pub fn storage_read_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageReadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage write failed error
    pub fn storage_write_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageWriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an archive write failed error
    pub fn archive_write_failed(
        session_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ArchiveWriteFailed {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retriable
    ///
    /// Collaborator and archive failures are transient by contract; validation
    /// and configuration failures are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ArchiveWriteFailed { .. }
                | Self::InferenceFailed { .. }
                | Self::VectorSearchFailed { .. }
                | Self::KnowledgeUnavailable { .. }
                | Self::AnalyticsFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::session_not_found("visitor-42");
        assert!(err.to_string().contains("visitor-42"));
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::archive_write_failed("s1", "disk full").is_retriable());
        assert!(!Error::EmptyTurn.is_retriable());
        assert!(!Error::InvalidSessionId {
            session_id: "".into(),
            reason: "empty".into()
        }
        .is_retriable());
    }
}
