//! Object-store facade over [`SignedClient`].
//!
//! Maps the handful of S3 operations the document layer needs onto signed
//! requests: bucket provisioning, put/head/get/delete of single objects, and
//! a single-page key listing. User metadata travels as lower-cased
//! `x-amz-meta-*` headers.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use tracing::{info, warn};

use crate::client::SignedClient;
use crate::error::{StorageError, StorageResult};
use crate::xml::parse_list_keys;

/// Prefix marking user metadata headers.
pub const METADATA_PREFIX: &str = "x-amz-meta-";

/// Headers returned by a HEAD (or GET) on an object.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    headers: HeaderMap,
}

impl ObjectHead {
    /// Wrap a response header map.
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// User metadata with the `x-amz-meta-` prefix stripped.
    ///
    /// Values that are not visible ASCII are skipped.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix(METADATA_PREFIX)?;
                let value = value.to_str().ok()?;
                Some((key.to_owned(), value.to_owned()))
            })
            .collect()
    }

    /// The stored `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// The stored `Content-Length`, if present and numeric.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
    }
}

/// A fetched object: its bytes plus the headers it was served with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object body.
    pub body: Bytes,
    /// Object headers.
    pub head: ObjectHead,
}

/// Bucket-scoped object operations.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: SignedClient,
    bucket: String,
}

impl ObjectStore {
    /// Bind the client to its configured bucket.
    #[must_use]
    pub fn new(client: SignedClient) -> Self {
        let bucket = client.config().bucket.clone();
        Self { client, bucket }
    }

    /// The bucket every operation targets.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The underlying signed client.
    #[must_use]
    pub fn client(&self) -> &SignedClient {
        &self.client
    }

    /// Create the bucket when a HEAD says it is missing.
    ///
    /// Returns `true` when the bucket was created by this call.
    ///
    /// # Errors
    ///
    /// Any failure other than a 404 on the HEAD, or any failure on the PUT.
    pub async fn ensure_bucket(&self) -> StorageResult<bool> {
        let path = self.bucket_path();
        match self.client.request(Method::HEAD, &path, None, &[], &[]).await {
            Ok(_) => Ok(false),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                self.client.request(Method::PUT, &path, None, &[], &[]).await?;
                info!(bucket = %self.bucket, "created bucket");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Store `body` under `key` with the given content type and metadata.
    ///
    /// Metadata keys are lower-cased and prefixed with `x-amz-meta-`.
    ///
    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<()> {
        let fallback = mime::APPLICATION_OCTET_STREAM;
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| fallback.as_ref());

        let mut headers = Vec::with_capacity(metadata.len() + 1);
        headers.push((CONTENT_TYPE.as_str().to_owned(), content_type.to_owned()));
        headers.extend(metadata.iter().map(|(name, value)| {
            (
                format!("{METADATA_PREFIX}{}", name.to_ascii_lowercase()),
                value.clone(),
            )
        }));

        self.client
            .request(Method::PUT, &self.object_path(key)?, Some(body), &[], &headers)
            .await?;
        Ok(())
    }

    /// Fetch only the headers of `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the object is missing; any other
    /// request failure as-is.
    pub async fn head_object(&self, key: &str) -> StorageResult<ObjectHead> {
        let response = self
            .client
            .request(Method::HEAD, &self.object_path(key)?, None, &[], &[])
            .await
            .map_err(|err| not_found_for(key, err))?;
        Ok(ObjectHead::new(response.headers))
    }

    /// Fetch the body and headers of `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the object is missing; any other
    /// request failure as-is.
    pub async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        let response = self
            .client
            .request(Method::GET, &self.object_path(key)?, None, &[], &[])
            .await
            .map_err(|err| not_found_for(key, err))?;
        Ok(StoredObject {
            body: response.body,
            head: ObjectHead::new(response.headers),
        })
    }

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .request(Method::DELETE, &self.object_path(key)?, None, &[], &[])
            .await?;
        Ok(())
    }

    /// Keys of the first listing page, in backend order.
    ///
    /// A truncated listing is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Propagates any request failure or an unreadable listing body.
    pub async fn list_object_keys(&self) -> StorageResult<Vec<String>> {
        let response = self
            .client
            .request(
                Method::GET,
                &self.bucket_path(),
                None,
                &[("list-type", Some("2"))],
                &[],
            )
            .await?;
        let page = parse_list_keys(&response.body)?;
        if page.is_truncated {
            warn!(
                bucket = %self.bucket,
                returned = page.keys.len(),
                "object listing truncated; only the first page is used"
            );
        }
        Ok(page.keys)
    }

    fn bucket_path(&self) -> String {
        self.client.config().bucket_path()
    }

    /// Path of `key` inside the bucket.
    ///
    /// Empty keys and keys with a `.` or `..` segment are refused: URL
    /// parsers normalize dot segments away, so the path sent would differ
    /// from the one signed.
    fn object_path(&self, key: &str) -> StorageResult<String> {
        if key.is_empty() || key.split('/').any(|segment| matches!(segment, "." | "..")) {
            return Err(StorageError::InvalidKey { key: key.to_owned() });
        }
        Ok(format!("{}/{key}", self.bucket_path()))
    }
}

fn not_found_for(key: &str, err: StorageError) -> StorageError {
    if err.is_not_found() {
        StorageError::NotFound {
            key: key.to_owned(),
        }
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempvault_core::StorageConfig;

    use super::*;
    use crate::memory::MemoryTransport;

    fn store_with(transport: Arc<MemoryTransport>) -> ObjectStore {
        let config = StorageConfig::builder()
            .access_key("AKIDTEST".into())
            .secret_key("test-secret".into())
            .bucket("docs".into())
            .build();
        ObjectStore::new(SignedClient::new(config, transport))
    }

    #[tokio::test]
    async fn test_should_create_bucket_only_once() {
        let transport = Arc::new(MemoryTransport::with_credentials("AKIDTEST", "test-secret"));
        let store = store_with(transport.clone());

        assert!(store.ensure_bucket().await.unwrap());
        assert!(!store.ensure_bucket().await.unwrap());
        assert_eq!(transport.request_count(&Method::PUT), 1);
        assert_eq!(transport.request_count(&Method::HEAD), 2);
    }

    #[tokio::test]
    async fn test_should_round_trip_metadata_through_headers() {
        let transport = Arc::new(MemoryTransport::with_credentials("AKIDTEST", "test-secret"));
        let store = store_with(transport);
        store.ensure_bucket().await.unwrap();

        let metadata = BTreeMap::from([
            ("Original-Name".to_owned(), "report%20Q1.pdf".to_owned()),
            ("expires-at".to_owned(), "1700000000000".to_owned()),
        ]);
        store
            .put_object("k1", Bytes::from_static(b"%PDF"), Some("application/pdf"), &metadata)
            .await
            .unwrap();

        let head = store.head_object("k1").await.unwrap();
        let stored = head.metadata();
        assert_eq!(stored.get("original-name").map(String::as_str), Some("report%20Q1.pdf"));
        assert_eq!(stored.get("expires-at").map(String::as_str), Some("1700000000000"));
        assert_eq!(head.content_type(), Some("application/pdf"));
        assert_eq!(head.content_length(), Some(4));

        let object = store.get_object("k1").await.unwrap();
        assert_eq!(object.body.as_ref(), b"%PDF");
    }

    #[tokio::test]
    async fn test_should_default_content_type_to_octet_stream() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_with(transport);
        store.ensure_bucket().await.unwrap();

        store
            .put_object("k", Bytes::from_static(b"x"), None, &BTreeMap::new())
            .await
            .unwrap();

        let head = store.head_object("k").await.unwrap();
        assert_eq!(head.content_type(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_should_map_missing_object_to_not_found() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_with(transport);
        store.ensure_bucket().await.unwrap();

        let err = store.head_object("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { ref key } if key == "nope"));

        let err = store.get_object("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_should_list_and_delete_keys() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_with(transport.clone());
        store.ensure_bucket().await.unwrap();
        for key in ["a", "b", "c"] {
            store
                .put_object(key, Bytes::from_static(b"1"), None, &BTreeMap::new())
                .await
                .unwrap();
        }

        store.delete_object("b").await.unwrap();

        assert_eq!(store.list_object_keys().await.unwrap(), vec!["a", "c"]);
        assert!(!transport.object_exists("docs", "b"));
    }

    #[tokio::test]
    async fn test_should_return_only_first_page_when_truncated() {
        let transport = Arc::new(MemoryTransport::new().with_page_size(2));
        let store = store_with(transport);
        store.ensure_bucket().await.unwrap();
        for key in ["a", "b", "c"] {
            store
                .put_object(key, Bytes::from_static(b"1"), None, &BTreeMap::new())
                .await
                .unwrap();
        }

        assert_eq!(store.list_object_keys().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_should_not_create_bucket_when_head_is_forbidden() {
        let transport = Arc::new(MemoryTransport::with_credentials("AKIDTEST", "another-secret"));
        let store = store_with(transport.clone());

        let err = store.ensure_bucket().await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert!(!err.is_not_found());
        assert_eq!(transport.request_count(&Method::HEAD), 1);
        assert_eq!(transport.request_count(&Method::PUT), 0);
    }

    #[tokio::test]
    async fn test_should_refuse_dot_segment_keys_without_io() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_with(transport.clone());

        for key in ["", ".", "..", "a/../b", "./x"] {
            let err = store.head_object(key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey { .. }), "{key:?}");
        }
        let err = store
            .put_object("..", Bytes::from_static(b"1"), None, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
        assert_eq!(transport.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_should_propagate_server_errors_on_delete() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_with(transport.clone());
        store.ensure_bucket().await.unwrap();
        store
            .put_object("stuck", Bytes::from_static(b"1"), None, &BTreeMap::new())
            .await
            .unwrap();
        transport.fail_deletes_for("stuck");

        let err = store.delete_object("stuck").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.is_retriable());
    }
}
