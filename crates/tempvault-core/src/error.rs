//! Error types for Tempvault configuration.

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The access key or the secret key is empty.
    #[error("MINIO_ACCESS_KEY and MINIO_SECRET_KEY are required")]
    MissingCredentials,

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;
