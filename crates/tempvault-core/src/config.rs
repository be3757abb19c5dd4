//! Object-storage connection configuration.
//!
//! Provides [`StorageConfig`], the immutable description of the backend
//! endpoint, credentials, and bucket. Values are loaded from environment
//! variables via [`StorageConfig::from_env`] or assembled with the builder.

use std::fmt;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{ConfigError, ConfigResult};

/// Connection settings for the S3-compatible backend.
///
/// # Examples
///
/// ```
/// use tempvault_core::StorageConfig;
///
/// let config = StorageConfig::builder()
///     .endpoint("minio.internal".into())
///     .port(443)
///     .use_ssl(true)
///     .build();
/// assert_eq!(config.origin(), "https://minio.internal");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Backend host name, without scheme or port.
    #[builder(default = String::from("localhost"))]
    pub endpoint: String,

    /// Backend port.
    #[builder(default = 9000)]
    pub port: u16,

    /// Whether to talk to the backend over TLS.
    #[builder(default = false)]
    pub use_ssl: bool,

    /// Access key ID used in the credential scope.
    #[builder(default)]
    pub access_key: String,

    /// Secret access key used to derive signing keys.
    #[builder(default)]
    pub secret_key: String,

    /// Bucket holding every document.
    #[builder(default = String::from("drive-documents"))]
    pub bucket: String,

    /// Region baked into the credential scope.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("localhost"),
            port: 9000,
            use_ssl: false,
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::from("drive-documents"),
            region: String::from("us-east-1"),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MINIO_ENDPOINT` | `localhost` |
    /// | `MINIO_PORT` | `9000` |
    /// | `MINIO_USE_SSL` | `false` |
    /// | `MINIO_ACCESS_KEY` | *(empty)* |
    /// | `MINIO_SECRET_KEY` | *(empty)* |
    /// | `MINIO_BUCKET` | `drive-documents` |
    /// | `MINIO_REGION` | `us-east-1` |
    ///
    /// A non-numeric `MINIO_PORT` falls back to the default port.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MINIO_ENDPOINT") {
            config.endpoint = v;
        }
        if let Ok(v) = std::env::var("MINIO_PORT") {
            if let Ok(port) = v.trim().parse::<u16>() {
                config.port = port;
            }
        }
        if let Ok(v) = std::env::var("MINIO_USE_SSL") {
            config.use_ssl = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("MINIO_ACCESS_KEY") {
            config.access_key = v;
        }
        if let Ok(v) = std::env::var("MINIO_SECRET_KEY") {
            config.secret_key = v;
        }
        if let Ok(v) = std::env::var("MINIO_BUCKET") {
            config.bucket = v;
        }
        if let Ok(v) = std::env::var("MINIO_REGION") {
            config.region = v;
        }

        config
    }

    /// URL scheme derived from the TLS flag.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl { "https" } else { "http" }
    }

    /// Value of the `host` header.
    ///
    /// The port is omitted when it is the default port for the scheme.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = (self.use_ssl && self.port == 443) || (!self.use_ssl && self.port == 80);
        if default_port {
            self.endpoint.clone()
        } else {
            format!("{}:{}", self.endpoint, self.port)
        }
    }

    /// `scheme://host[:port]` prefix for every request URL.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme(), self.host_header())
    }

    /// Path of the bucket, with a leading slash.
    #[must_use]
    pub fn bucket_path(&self) -> String {
        format!("/{}", self.bucket)
    }

    /// Check that both halves of the credential pair are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] if either key is empty, or
    /// [`ConfigError::Invalid`] if the bucket name is empty.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket name must not be empty".to_owned()));
        }
        Ok(())
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
