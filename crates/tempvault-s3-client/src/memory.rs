//! In-process S3-compatible backend.
//!
//! [`MemoryTransport`] answers the subset of the S3 REST API the object
//! store uses: bucket HEAD/PUT, `list-type=2` listings, and object
//! PUT/HEAD/GET/DELETE with `x-amz-meta-*` metadata. Every request must carry
//! a SigV4 `Authorization` header and a payload hash matching the body; when
//! built with [`MemoryTransport::with_credentials`] the signature itself is
//! recomputed and checked.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue, LAST_MODIFIED};
use http::{Method, Response, StatusCode};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use quick_xml::escape::escape;
use tempvault_sigv4::{Credentials, SigningError, hash_payload, verify_request};

use crate::client::CONTENT_SHA256_HEADER;
use crate::store::METADATA_PREFIX;
use crate::transport::{HttpTransport, TransportError};

/// Listing page size S3 uses when `max-keys` is absent.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Bytes,
    content_type: HeaderValue,
    metadata: Vec<(HeaderName, HeaderValue)>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Backend {
    buckets: BTreeMap<String, BTreeMap<String, MemoryObject>>,
    requests: BTreeMap<String, usize>,
    failing_deletes: BTreeSet<String>,
    vanishing: BTreeSet<String>,
}

/// An S3-compatible object store living entirely in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<Backend>,
    credentials: Option<(String, String)>,
    latency: Option<Duration>,
    page_size: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// A backend that checks the authorization scheme and payload hash only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Backend::default()),
            credentials: None,
            latency: None,
            page_size: DEFAULT_PAGE_SIZE,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// A backend that also recomputes every signature with the given pair.
    #[must_use]
    pub fn with_credentials(access_key: &str, secret_key: &str) -> Self {
        Self {
            credentials: Some((access_key.to_owned(), secret_key.to_owned())),
            ..Self::new()
        }
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Cap listings at `page_size` keys and report the rest as truncated.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of requests received with `method`, accepted or not.
    #[must_use]
    pub fn request_count(&self, method: &Method) -> usize {
        self.state
            .lock()
            .requests
            .get(method.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests received in total.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.state.lock().requests.values().sum()
    }

    /// Most requests seen waiting out the injected latency at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Create `bucket` directly, bypassing the HTTP surface.
    pub fn create_bucket(&self, bucket: &str) {
        self.state.lock().buckets.entry(bucket.to_owned()).or_default();
    }

    /// Store an object directly, bypassing the HTTP surface.
    ///
    /// Metadata names are given without the `x-amz-meta-` prefix. Entries
    /// that are not valid header names or values are dropped.
    pub fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        metadata: &BTreeMap<String, String>,
    ) {
        let metadata = metadata
            .iter()
            .filter_map(|(name, value)| {
                let name = HeaderName::from_bytes(
                    format!("{METADATA_PREFIX}{}", name.to_ascii_lowercase()).as_bytes(),
                )
                .ok()?;
                let value = HeaderValue::from_str(value).ok()?;
                Some((name, value))
            })
            .collect();
        let object = MemoryObject {
            body: body.into(),
            content_type: HeaderValue::from_static("application/octet-stream"),
            metadata,
            last_modified: Utc::now(),
        };
        self.state
            .lock()
            .buckets
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), object);
    }

    /// Whether `key` currently exists in `bucket`.
    #[must_use]
    pub fn object_exists(&self, bucket: &str, key: &str) -> bool {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key))
    }

    /// Stored metadata of `key`, prefix stripped.
    #[must_use]
    pub fn object_metadata(&self, bucket: &str, key: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock();
        let object = state.buckets.get(bucket)?.get(key)?;
        Some(
            object
                .metadata
                .iter()
                .filter_map(|(name, value)| {
                    let name = name.as_str().strip_prefix(METADATA_PREFIX)?;
                    Some((name.to_owned(), value.to_str().ok()?.to_owned()))
                })
                .collect(),
        )
    }

    /// Answer every later DELETE of `key` with a 500.
    pub fn fail_deletes_for(&self, key: &str) {
        self.state.lock().failing_deletes.insert(key.to_owned());
    }

    /// Delete `key` just before its next HEAD is answered, as a concurrent
    /// client would between a listing and a metadata read.
    pub fn vanish_on_next_head(&self, key: &str) {
        self.state.lock().vanishing.insert(key.to_owned());
    }

    fn authenticate(
        &self,
        parts: &http::request::Parts,
        body: &Bytes,
    ) -> Result<(), Response<Bytes>> {
        let authorization = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !authorization.starts_with("AWS4-HMAC-SHA256 ") {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "AccessDenied",
                "Request is not signed with AWS4-HMAC-SHA256",
            ));
        }

        let body_hash = hash_payload(body);
        let declared = parts
            .headers
            .get(CONTENT_SHA256_HEADER)
            .and_then(|value| value.to_str().ok());
        if declared != Some(body_hash.as_str()) {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "XAmzContentSHA256Mismatch",
                "The provided 'x-amz-content-sha256' header does not match what was computed.",
            ));
        }

        let Some((access_key, secret_key)) = &self.credentials else {
            return Ok(());
        };
        let verified = Credentials::new(access_key.as_str(), secret_key.as_str())
            .and_then(|credentials| verify_request(parts, &body_hash, &credentials));
        match verified {
            Ok(()) => Ok(()),
            Err(SigningError::AccessKeyNotFound(_) | SigningError::MissingAccessKey) => {
                Err(error_response(
                    StatusCode::FORBIDDEN,
                    "InvalidAccessKeyId",
                    "The access key ID you provided does not exist in our records.",
                ))
            }
            Err(_) => Err(error_response(
                StatusCode::FORBIDDEN,
                "SignatureDoesNotMatch",
                "The request signature we calculated does not match the signature you provided.",
            )),
        }
    }

    fn handle_bucket(&self, method: &Method, bucket: &str) -> Response<Bytes> {
        let mut state = self.state.lock();
        match *method {
            Method::HEAD => {
                if state.buckets.contains_key(bucket) {
                    empty_response(StatusCode::OK)
                } else {
                    empty_response(StatusCode::NOT_FOUND)
                }
            }
            Method::PUT => {
                state.buckets.entry(bucket.to_owned()).or_default();
                empty_response(StatusCode::OK)
            }
            Method::GET => match state.buckets.get(bucket) {
                Some(objects) => xml_response(list_objects_xml(bucket, objects, self.page_size)),
                None => no_such_bucket(bucket),
            },
            _ => error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "MethodNotAllowed",
                "The specified method is not allowed against this resource.",
            ),
        }
    }

    fn handle_object(
        &self,
        method: &Method,
        bucket: &str,
        key: &str,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Response<Bytes> {
        let mut state = self.state.lock();
        let Backend {
            buckets,
            failing_deletes,
            vanishing,
            ..
        } = &mut *state;
        let Some(objects) = buckets.get_mut(bucket) else {
            return if *method == Method::HEAD {
                empty_response(StatusCode::NOT_FOUND)
            } else {
                no_such_bucket(bucket)
            };
        };

        match *method {
            Method::PUT => {
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static("binary/octet-stream"));
                let metadata = headers
                    .iter()
                    .filter(|(name, _)| name.as_str().starts_with(METADATA_PREFIX))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                objects.insert(
                    key.to_owned(),
                    MemoryObject {
                        body,
                        content_type,
                        metadata,
                        last_modified: Utc::now(),
                    },
                );
                empty_response(StatusCode::OK)
            }
            Method::HEAD if vanishing.remove(key) => {
                objects.remove(key);
                empty_response(StatusCode::NOT_FOUND)
            }
            Method::HEAD => match objects.get(key) {
                Some(object) => object_response(object, false),
                None => empty_response(StatusCode::NOT_FOUND),
            },
            Method::GET => match objects.get(key) {
                Some(object) => object_response(object, true),
                None => error_response(
                    StatusCode::NOT_FOUND,
                    "NoSuchKey",
                    "The specified key does not exist.",
                ),
            },
            Method::DELETE => {
                if failing_deletes.contains(key) {
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "InternalError",
                        "We encountered an internal error. Please try again.",
                    );
                }
                objects.remove(key);
                empty_response(StatusCode::NO_CONTENT)
            }
            _ => error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "MethodNotAllowed",
                "The specified method is not allowed against this resource.",
            ),
        }
    }
}

#[async_trait]
impl HttpTransport for MemoryTransport {
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        if let Some(latency) = self.latency {
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let (parts, body) = request.into_parts();
        *self
            .state
            .lock()
            .requests
            .entry(parts.method.as_str().to_owned())
            .or_default() += 1;

        if let Err(rejection) = self.authenticate(&parts, &body) {
            return Ok(rejection);
        }

        let Some((bucket, key)) = split_path(parts.uri.path()) else {
            return Err(TransportError::InvalidRequest(format!(
                "no bucket in path {}",
                parts.uri.path()
            )));
        };

        Ok(match key {
            None => self.handle_bucket(&parts.method, &bucket),
            Some(key) => self.handle_object(&parts.method, &bucket, &key, &parts.headers, body),
        })
    }
}

/// Split `/bucket[/key]` into its percent-decoded parts.
fn split_path(path: &str) -> Option<(String, Option<String>)> {
    let trimmed = path.trim_start_matches('/');
    let (bucket, key) = match trimmed.split_once('/') {
        Some((bucket, key)) => (bucket, Some(key)),
        None => (trimmed, None),
    };
    if bucket.is_empty() {
        return None;
    }
    let decode = |raw: &str| percent_decode_str(raw).decode_utf8_lossy().into_owned();
    Some((decode(bucket), key.filter(|k| !k.is_empty()).map(decode)))
}

fn list_objects_xml(
    bucket: &str,
    objects: &BTreeMap<String, MemoryObject>,
    page_size: usize,
) -> String {
    let is_truncated = objects.len() > page_size;
    let page: Vec<_> = objects.iter().take(page_size).collect();

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(r#"<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
    let _ = write!(
        xml,
        "<Name>{}</Name><Prefix></Prefix><KeyCount>{}</KeyCount><MaxKeys>{page_size}</MaxKeys><IsTruncated>{is_truncated}</IsTruncated>",
        escape(bucket),
        page.len(),
    );
    for (key, object) in page {
        let _ = write!(
            xml,
            "<Contents><Key>{}</Key><LastModified>{}</LastModified><Size>{}</Size><StorageClass>STANDARD</StorageClass></Contents>",
            escape(key.as_str()),
            object.last_modified.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            object.body.len(),
        );
    }
    xml.push_str("</ListBucketResult>");
    xml
}

fn object_response(object: &MemoryObject, with_body: bool) -> Response<Bytes> {
    let body = if with_body {
        object.body.clone()
    } else {
        Bytes::new()
    };
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, object.content_type.clone());
    headers.insert(CONTENT_LENGTH, HeaderValue::from(object.body.len()));
    if let Ok(value) = HeaderValue::from_str(
        &object
            .last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    ) {
        headers.insert(LAST_MODIFIED, value);
    }
    for (name, value) in &object.metadata {
        headers.insert(name.clone(), value.clone());
    }
    response
}

fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn xml_response(xml: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(xml));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    response
}

fn no_such_bucket(bucket: &str) -> Response<Bytes> {
    error_response(
        StatusCode::NOT_FOUND,
        "NoSuchBucket",
        &format!("The specified bucket does not exist: {bucket}"),
    )
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Bytes> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{code}</Code><Message>{}</Message></Error>"#,
        escape(message)
    );
    let mut response = xml_response(xml);
    *response.status_mut() = status;
    response
}
