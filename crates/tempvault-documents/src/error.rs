//! Document-level errors.

use tempvault_s3_client::StorageError;

/// Failures surfaced by the document manager.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Absent, lapsed, or unreadable; callers cannot tell which.
    #[error("File not found or expired.")]
    NotFoundOrExpired {
        /// Requested document identifier.
        id: String,
    },

    /// The extension length is outside the accepted range.
    #[error("minutes must be between 1 and 720")]
    InvalidExtension {
        /// Requested extension.
        minutes: f64,
    },

    /// Permanent documents have no expiry to extend.
    #[error("Permanent document does not need extension.")]
    PermanentDocument {
        /// Requested document identifier.
        id: String,
    },

    /// Stored metadata could not be decoded.
    #[error("document {id} has invalid metadata: {reason}")]
    InvalidMetadata {
        /// Object key.
        id: String,
        /// What was wrong.
        reason: String,
    },

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DocumentError {
    /// Whether this error is caused by the caller's input rather than the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFoundOrExpired { .. }
                | Self::InvalidExtension { .. }
                | Self::PermanentDocument { .. }
        )
    }
}

/// Convenience result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
