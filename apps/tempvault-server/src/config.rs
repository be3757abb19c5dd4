//! Server configuration.

use std::fmt;
use std::time::Duration;

use typed_builder::TypedBuilder;

/// Largest accepted request body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Settings for the HTTP front end.
#[derive(Clone, TypedBuilder)]
pub struct ServerConfig {
    /// Bind address.
    #[builder(default = String::from("0.0.0.0:5000"))]
    pub listen: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Bearer token gating permanent uploads; unset disables them.
    #[builder(default)]
    pub upload_auth_token: Option<String>,

    /// Value of `Access-Control-Allow-Origin`.
    #[builder(default = String::from("*"))]
    pub cors_origin: String,

    /// Largest accepted request body, in bytes.
    #[builder(default = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Period of the background expiry sweep.
    #[builder(default = DEFAULT_SWEEP_INTERVAL)]
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("log_level", &self.log_level)
            .field(
                "upload_auth_token",
                &self.upload_auth_token.as_ref().map(|_| "<redacted>"),
            )
            .field("cors_origin", &self.cors_origin)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LISTEN_ADDR` | `0.0.0.0:5000` |
    /// | `LOG_LEVEL` | `info` |
    /// | `UPLOAD_AUTH_TOKEN` | *(unset)* |
    /// | `CORS_ORIGIN` | `*` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            listen: non_empty("LISTEN_ADDR").unwrap_or(defaults.listen),
            log_level: non_empty("LOG_LEVEL").unwrap_or(defaults.log_level),
            upload_auth_token: non_empty("UPLOAD_AUTH_TOKEN"),
            cors_origin: non_empty("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            ..defaults
        }
    }
}
