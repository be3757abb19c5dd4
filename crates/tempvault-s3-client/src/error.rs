//! Storage error types.
//!
//! [`StorageError`] separates failures that happen before any I/O
//! (configuration, header encoding) from failures reported by the backend or
//! the network, and classifies the latter as retriable or fatal.

use http::StatusCode;
use tempvault_core::ConfigError;
use tempvault_sigv4::SigningError;

use crate::transport::TransportError;

/// Errors returned by the signed client and the object-store facade.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The connection configuration is unusable (missing credentials).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signing inputs were rejected.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The backend answered with a non-2xx status.
    #[error("S3 request failed with status {status}: {reason}")]
    Request {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Response body text, or the canonical reason phrase when empty.
        reason: String,
    },

    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// Object key that was looked up.
        key: String,
    },

    /// The key cannot be addressed as a path segment.
    #[error("invalid object key: {key:?}")]
    InvalidKey {
        /// Rejected key.
        key: String,
    },

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A header name or value could not be put on the wire.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The listing response body was not readable XML.
    #[error("malformed listing response: {0}")]
    Xml(String),
}

impl From<quick_xml::Error> for StorageError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl StorageError {
    /// HTTP status of a backend failure, if the backend answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            _ => None,
        }
    }

    /// Whether the failure means "the thing does not exist".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Whether repeating the same request could succeed.
    ///
    /// Transport failures, 5xx, 408 and 429 are retriable. Configuration,
    /// header, XML, and other 4xx failures are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Request { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
