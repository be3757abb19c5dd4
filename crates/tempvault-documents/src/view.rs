//! Read-time views of stored documents.
//!
//! Nothing here is persisted. Remaining lifetime is recomputed from the
//! stored expiry and the current clock on every read.

use bytes::Bytes;
use serde::Serialize;

use crate::filename::sanitize_filename;
use crate::metadata::DocumentMetadata;
use crate::policy::DocumentPolicy;

/// A document as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    /// Opaque identifier, also the object key.
    pub id: String,
    /// Filename as uploaded.
    pub original_name: String,
    /// Declared content type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the document never expires.
    pub permanent: bool,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Expiry time, epoch milliseconds; `null` when permanent.
    pub expires_at: Option<i64>,
    /// Whole seconds left, rounded up; `null` when permanent.
    pub expires_in_seconds: Option<i64>,
    /// Retrieval path.
    pub download_url: String,
}

impl DocumentView {
    /// Derive the view of `id` at `now`.
    #[must_use]
    pub fn new(id: &str, metadata: &DocumentMetadata, policy: &DocumentPolicy, now: i64) -> Self {
        let expires_at = metadata.lifetime.expires_at();
        Self {
            id: id.to_owned(),
            original_name: metadata.original_name.clone(),
            content_type: metadata.content_type.clone(),
            size: metadata.size,
            permanent: expires_at.is_none(),
            created_at: metadata.created_at,
            expires_at,
            expires_in_seconds: expires_at.map(|at| remaining_seconds(at, now)),
            download_url: policy.download_url(id),
        }
    }
}

/// Result of extending a document's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedDocument {
    /// Document identifier.
    pub id: String,
    /// New expiry, epoch milliseconds.
    pub expires_at: i64,
    /// Whole seconds left, rounded up.
    pub expires_in_seconds: i64,
}

/// A downloaded document ready to be served.
#[derive(Debug, Clone)]
pub struct DownloadedDocument {
    /// Document identifier.
    pub id: String,
    /// Content bytes.
    pub body: Bytes,
    /// Content type to serve with.
    pub content_type: String,
    /// Filename safe for `Content-Disposition`.
    pub filename: String,
}

impl DownloadedDocument {
    pub(crate) fn new(id: &str, body: Bytes, metadata: &DocumentMetadata) -> Self {
        Self {
            id: id.to_owned(),
            body,
            content_type: metadata.content_type.clone(),
            filename: sanitize_filename(&metadata.original_name, id),
        }
    }

    /// Body length in bytes.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// `Content-Disposition` value forcing a download.
    #[must_use]
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// `max(0, ceil((expires_at - now) / 1000))`.
#[must_use]
pub fn remaining_seconds(expires_at: i64, now: i64) -> i64 {
    let remaining = expires_at.saturating_sub(now);
    if remaining <= 0 {
        0
    } else {
        (remaining + 999) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Lifetime;

    fn metadata(lifetime: Lifetime) -> DocumentMetadata {
        DocumentMetadata {
            original_name: "notes:v1.txt".to_owned(),
            content_type: "text/plain".to_owned(),
            created_at: 1_000,
            lifetime,
            size: 3,
        }
    }

    #[test]
    fn test_should_round_remaining_seconds_up() {
        assert_eq!(remaining_seconds(10_000, 0), 10);
        assert_eq!(remaining_seconds(10_001, 0), 11);
        assert_eq!(remaining_seconds(1, 0), 1);
        assert_eq!(remaining_seconds(5_000, 5_000), 0);
        assert_eq!(remaining_seconds(5_000, 9_000), 0);
    }

    #[test]
    fn test_should_null_expiry_fields_for_permanent_documents() {
        let view = DocumentView::new(
            "p",
            &metadata(Lifetime::Permanent),
            &DocumentPolicy::default(),
            0,
        );

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["permanent"], true);
        assert!(json["expiresAt"].is_null());
        assert!(json["expiresInSeconds"].is_null());
        assert_eq!(json["downloadUrl"], "/api/documents/p");
        assert_eq!(json["originalName"], "notes:v1.txt");
    }

    #[test]
    fn test_should_compute_remaining_time_for_temporary_documents() {
        let view = DocumentView::new(
            "t",
            &metadata(Lifetime::Expiring(61_500)),
            &DocumentPolicy::default(),
            1_000,
        );

        assert!(!view.permanent);
        assert_eq!(view.expires_at, Some(61_500));
        assert_eq!(view.expires_in_seconds, Some(61));
    }

    #[test]
    fn test_should_sanitize_download_filename() {
        let meta = metadata(Lifetime::Permanent);
        let download = DownloadedDocument::new("id", Bytes::from_static(b"abc"), &meta);

        assert_eq!(download.content_disposition(), "attachment; filename=\"notes_v1.txt\"");
        assert_eq!(download.content_length(), 3);
    }
}
