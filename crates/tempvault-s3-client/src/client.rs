//! The signed HTTP client.
//!
//! [`SignedClient`] turns a method, path, optional body, query, and extra
//! headers into one signed request against the configured endpoint. It owns
//! no retry logic and no per-request timeout; the transport's defaults apply.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use tempvault_core::StorageConfig;
use tempvault_sigv4::{
    CanonicalRequest, Credentials, SigningParams, SigningTime, hash_payload, normalize_headers,
    sign,
};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::transport::HttpTransport;

/// Service name baked into every credential scope.
const SERVICE: &str = "s3";

/// Header carrying the payload hash.
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// Header carrying the request timestamp.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";

/// A successful (2xx) backend response with its body buffered.
#[derive(Debug, Clone)]
pub struct StorageResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body; empty for HEAD.
    pub body: Bytes,
}

/// Signs and dispatches requests against a single S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct SignedClient {
    config: Arc<StorageConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl SignedClient {
    /// Create a client from an immutable configuration and a transport.
    #[must_use]
    pub fn new(config: StorageConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// The configuration this client signs with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Sign and send one request.
    ///
    /// Synthesizes `host`, `x-amz-content-sha256`, and `x-amz-date`, merges
    /// `extra_headers` over them, signs every resulting header, and dispatches
    /// exactly once. Query pairs with a `None` value are neither signed nor sent.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Config`] when either credential is empty, before any I/O.
    /// - [`StorageError::Request`] for any non-2xx response.
    /// - [`StorageError::Transport`] when no response was received.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        query: &[(&str, Option<&str>)],
        extra_headers: &[(String, String)],
    ) -> StorageResult<StorageResponse> {
        self.config.validate()?;
        let credentials = Credentials::new(&self.config.access_key, &self.config.secret_key)?;

        let payload = body.unwrap_or_default();
        let payload_hash = hash_payload(&payload);
        let time = SigningTime::now();

        let synthesized = [
            ("host".to_owned(), self.config.host_header()),
            (CONTENT_SHA256_HEADER.to_owned(), payload_hash.clone()),
            (AMZ_DATE_HEADER.to_owned(), time.amz_date().to_owned()),
        ];
        let headers = normalize_headers(
            synthesized
                .iter()
                .chain(extra_headers.iter())
                .map(|(k, v)| (k, v)),
        );

        let canonical =
            CanonicalRequest::new(method.as_str(), path, query, &headers, &payload_hash);
        let params = SigningParams::new(&credentials, &self.config.region, SERVICE, &time);
        let authorization = sign(&canonical, &params);

        let url = if canonical.query.is_empty() {
            format!("{}{}", self.config.origin(), canonical.uri)
        } else {
            format!("{}{}?{}", self.config.origin(), canonical.uri, canonical.query)
        };

        let mut builder = http::Request::builder().method(method.clone()).uri(&url);
        if let Some(map) = builder.headers_mut() {
            for (name, value) in &headers {
                map.insert(header_name(name)?, header_value(name, value)?);
            }
            map.insert(AUTHORIZATION, header_value("authorization", &authorization)?);
        }
        let request = builder
            .body(payload)
            .map_err(|e| StorageError::InvalidHeader {
                name: "request".to_owned(),
                reason: e.to_string(),
            })?;

        debug!(%method, %url, "dispatching signed request");

        let response = self.transport.send(request).await?;
        let (parts, body) = response.into_parts();

        if !parts.status.is_success() {
            let reason = failure_reason(parts.status, &body);
            debug!(%method, %url, status = %parts.status, reason, "storage request failed");
            return Err(StorageError::Request {
                status: parts.status,
                reason,
            });
        }

        Ok(StorageResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Body text when present, else the status reason phrase.
fn failure_reason(status: StatusCode, body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_owned();
    }
    status
        .canonical_reason()
        .unwrap_or("S3 request failed")
        .to_owned()
}

fn header_name(name: &str) -> StorageResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| StorageError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> StorageResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| StorageError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}
