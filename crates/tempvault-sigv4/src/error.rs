//! Error types for SigV4 signing and verification.

/// Errors raised while preparing or checking a SigV4 signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// The access key ID is empty.
    #[error("access key is required for request signing")]
    MissingAccessKey,

    /// The secret access key is empty.
    #[error("secret key is required for request signing")]
    MissingSecretKey,

    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// A header referenced in `SignedHeaders` is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The credential scope names an unknown access key.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The recomputed signature does not match the provided one.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,
}
