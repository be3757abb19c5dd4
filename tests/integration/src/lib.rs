//! Integration tests for Tempvault.
//!
//! Storage tests require a MinIO (or other S3-compatible) endpoint configured
//! through the usual `MINIO_*` variables. HTTP tests additionally require a
//! running `tempvault-server` at `TEMPVAULT_URL` (default
//! `http://localhost:5000`). Everything is `#[ignore]`d so a plain
//! `cargo test` stays hermetic.
//!
//! Run them with:
//! ```text
//! cargo test -p tempvault-integration -- --ignored
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use tempvault_core::StorageConfig;
use tempvault_s3_client::{ObjectStore, ReqwestTransport, SignedClient};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Storage settings from the environment, pointed at `bucket`.
#[must_use]
pub fn storage_config(bucket: &str) -> StorageConfig {
    init_tracing();
    let mut config = StorageConfig::from_env();
    if config.access_key.is_empty() {
        config.access_key = "minioadmin".to_owned();
    }
    if config.secret_key.is_empty() {
        config.secret_key = "minioadmin".to_owned();
    }
    config.bucket = bucket.to_owned();
    config
}

/// An object store on a fresh, already provisioned bucket.
pub async fn test_store(prefix: &str) -> ObjectStore {
    let config = storage_config(&test_bucket_name(prefix));
    let client = SignedClient::new(config, Arc::new(ReqwestTransport::new()));
    let store = ObjectStore::new(client);
    store
        .ensure_bucket()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {}: {e}", store.bucket()));
    store
}

/// An official SDK client on the same endpoint, used to cross-check what we write.
#[must_use]
pub fn s3_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    let creds = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "integration-test",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(creds)
        .endpoint_url(config.origin())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(sdk_config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("tempvault-{prefix}-{id}")
}

/// Delete every object in the store's bucket, then the bucket itself.
pub async fn cleanup_store(store: &ObjectStore) {
    if let Ok(keys) = store.list_object_keys().await {
        for key in keys {
            let _ = store.delete_object(&key).await;
        }
    }
    let sdk = s3_client(store.client().config());
    let _ = sdk.delete_bucket().bucket(store.bucket()).send().await;
}

/// Metadata map from string pairs.
#[must_use]
pub fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Base URL of a running server.
#[must_use]
pub fn server_url() -> String {
    init_tracing();
    std::env::var("TEMPVAULT_URL").unwrap_or_else(|_| "http://localhost:5000".to_owned())
}

/// Encode a single `file` field as `multipart/form-data`.
///
/// Returns the content type header value and the body.
#[must_use]
pub fn multipart_file(filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("tempvault-{}", uuid::Uuid::new_v4().simple());
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

mod test_documents;
mod test_http;
mod test_storage;
