//! Lifetime policy for ephemeral documents.

use std::time::Duration;

use typed_builder::TypedBuilder;

/// Lifetime of a freshly uploaded temporary document.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Largest accepted extension, in minutes.
pub const MAX_EXTENSION_MINUTES: f64 = 720.0;

/// Public path under which documents are downloaded.
pub const DOWNLOAD_PREFIX: &str = "/api/documents";

/// Expiry and addressing rules applied by the document manager.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct DocumentPolicy {
    /// How long a temporary upload lives before it expires.
    #[builder(default = DEFAULT_TTL)]
    pub default_ttl: Duration,

    /// Upper bound for a single extension.
    #[builder(default = MAX_EXTENSION_MINUTES)]
    pub max_extension_minutes: f64,

    /// Prefix of the retrieval path handed back to clients.
    #[builder(default = DOWNLOAD_PREFIX.to_owned())]
    pub download_prefix: String,
}

impl Default for DocumentPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DocumentPolicy {
    /// Default lifetime in milliseconds.
    #[must_use]
    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.default_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Whether `minutes` is an acceptable extension.
    #[must_use]
    pub fn accepts_extension(&self, minutes: f64) -> bool {
        minutes.is_finite() && minutes > 0.0 && minutes <= self.max_extension_minutes
    }

    /// Retrieval path for document `id`.
    #[must_use]
    pub fn download_url(&self, id: &str) -> String {
        format!("{}/{id}", self.download_prefix.trim_end_matches('/'))
    }
}
