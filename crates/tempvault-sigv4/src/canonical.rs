//! Canonical request construction for AWS Signature Version 4.
//!
//! The canonical request is the exact byte string both the client and the
//! storage server hash before signing:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! where every canonical header line already ends in `\n`, so a blank line
//! separates the header block from the signed header list. Nothing here is
//! checked locally: a deviation of a single byte only shows up as a
//! `SignatureDoesNotMatch` response from the server.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::{Digest, Sha256};

/// Characters that must be percent-encoded in paths and query components.
///
/// Everything except the RFC 3986 unreserved set (`A-Z a-z 0-9 - _ . ~`) is
/// escaped, including `! ' ( ) *`, which generic URL encoders leave alone.
/// `percent-encoding` always emits uppercase hex digits.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The header block and signed header list of a canonical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHeaders {
    /// `name:value\n` lines sorted by name.
    pub block: String,
    /// Sorted, semicolon-joined header names.
    pub signed_headers: String,
}

/// A fully canonicalized request, ready to be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// HTTP method in uppercase.
    pub method: String,
    /// Percent-encoded path.
    pub uri: String,
    /// Sorted, percent-encoded query string (without `?`).
    pub query: String,
    /// Canonical header block and signed header names.
    pub headers: CanonicalHeaders,
    /// Hex SHA-256 of the payload.
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Canonicalize a request from its raw components.
    ///
    /// `headers` must already be normalized (see [`normalize_headers`]); every
    /// entry becomes a signed header.
    #[must_use]
    pub fn new(
        method: &str,
        path: &str,
        query: &[(&str, Option<&str>)],
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
    ) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            uri: canonical_uri(path),
            query: canonical_query_string(query),
            headers: canonical_headers(headers),
            payload_hash: payload_hash.to_owned(),
        }
    }

    /// Render the newline-joined canonical request string.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.uri,
            self.query,
            self.headers.block,
            self.headers.signed_headers,
            self.payload_hash
        )
    }

    /// Hex SHA-256 of the rendered canonical request.
    #[must_use]
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build the canonical URI by percent-encoding each path segment.
///
/// A leading slash is added when missing; slashes between segments are kept.
///
/// # Examples
///
/// ```
/// use tempvault_sigv4::canonical::canonical_uri;
///
/// assert_eq!(canonical_uri("bucket/key"), "/bucket/key");
/// assert_eq!(canonical_uri("/test$file.text"), "/test%24file.text");
/// assert_eq!(canonical_uri(""), "/");
/// ```
#[must_use]
pub fn canonical_uri(path: &str) -> String {
    let with_leading_slash = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };

    with_leading_slash
        .split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string from key/value pairs.
///
/// Pairs whose value is `None` are dropped entirely. Keys and values are
/// percent-encoded, then sorted by encoded key and encoded value.
///
/// # Examples
///
/// ```
/// use tempvault_sigv4::canonical::canonical_query_string;
///
/// let query = canonical_query_string(&[
///     ("prefix", Some("J")),
///     ("max-keys", Some("2")),
///     ("marker", None),
/// ]);
/// assert_eq!(query, "max-keys=2&prefix=J");
/// ```
#[must_use]
pub fn canonical_query_string(params: &[(&str, Option<&str>)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .filter_map(|(key, value)| value.map(|v| (uri_encode(key), uri_encode(v))))
        .collect();

    encoded.sort_unstable();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonicalize a query string as it arrived on the wire.
///
/// Values are taken as already encoded; parameters are only sorted. Used when
/// recomputing a signature on the receiving side.
#[must_use]
pub fn canonical_query_from_raw(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical URI for a path that may already be percent-encoded.
///
/// Each segment is decoded before re-encoding so the result does not depend on
/// how the sender escaped it.
#[must_use]
pub fn canonical_uri_from_raw(path: &str) -> String {
    let decoded: Vec<String> = path
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();
    canonical_uri(&decoded.join("/"))
}

/// Lower-case header names and collapse whitespace in values.
///
/// Later entries replace earlier ones with the same lower-cased name, so
/// caller-supplied headers can override synthesized ones.
pub fn normalize_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .into_iter()
        .map(|(name, value)| {
            (
                name.as_ref().to_ascii_lowercase(),
                collapse_whitespace(value.as_ref().trim()),
            )
        })
        .collect()
}

/// Build the canonical header block and the signed header list.
///
/// # Examples
///
/// ```
/// use tempvault_sigv4::canonical::canonical_headers;
///
/// let headers =
///     canonical_headers([("X-Amz-Date", "20130524T000000Z"), ("Host", " example.com ")]);
/// assert_eq!(headers.block, "host:example.com\nx-amz-date:20130524T000000Z\n");
/// assert_eq!(headers.signed_headers, "host;x-amz-date");
/// ```
pub fn canonical_headers<I, K, V>(headers: I) -> CanonicalHeaders
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let normalized = normalize_headers(headers);

    let block: String = normalized
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = normalized
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");

    CanonicalHeaders {
        block,
        signed_headers,
    }
}

/// Percent-encode a single path segment or query component.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

/// Collapse consecutive whitespace characters in a string to a single space.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_should_force_hex_escapes_for_sub_delims() {
        assert_eq!(uri_encode("a!b'c(d)e*f"), "a%21b%27c%28d%29e%2Af");
        assert_eq!(uri_encode("A-z_0.9~"), "A-z_0.9~");
        assert_eq!(uri_encode("hello world"), "hello%20world");
        assert_eq!(uri_encode("ü"), "%C3%BC");
    }

    #[test]
    fn test_should_encode_each_path_segment() {
        assert_eq!(canonical_uri("/bucket/my key(1).txt"), "/bucket/my%20key%281%29.txt");
        assert_eq!(canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_sort_query_and_drop_absent_values() {
        let query = canonical_query_string(&[
            ("list-type", Some("2")),
            ("continuation-token", None),
            ("delimiter", Some("/")),
        ]);
        assert_eq!(query, "delimiter=%2F&list-type=2");
    }

    #[test]
    fn test_should_keep_empty_values() {
        assert_eq!(canonical_query_string(&[("lifecycle", Some(""))]), "lifecycle=");
    }

    #[test]
    fn test_should_return_empty_query_for_no_params() {
        assert_eq!(canonical_query_string(&[]), "");
        assert_eq!(canonical_query_string(&[("a", None)]), "");
    }

    #[test]
    fn test_should_sort_raw_query_without_reencoding() {
        assert_eq!(canonical_query_from_raw("b=2&a=%2F"), "a=%2F&b=2");
        assert_eq!(canonical_query_from_raw(""), "");
    }

    #[test]
    fn test_should_not_double_encode_raw_path() {
        assert_eq!(canonical_uri_from_raw("/hello%20world"), "/hello%20world");
        assert_eq!(canonical_uri_from_raw("/test%24file.text"), "/test%24file.text");
    }

    #[test]
    fn test_should_let_later_headers_override_earlier_ones() {
        let headers =
            normalize_headers([("Content-Type", "text/plain"), ("content-type", "image/png")]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "image/png");
    }

    #[test]
    fn test_should_collapse_whitespace_in_header_values() {
        let headers = canonical_headers([("Host", "  example.com  "), ("X-Custom", "a   b \t c")]);
        assert_eq!(headers.block, "host:example.com\nx-custom:a b c\n");
        assert_eq!(headers.signed_headers, "host;x-custom");
    }

    #[test]
    fn test_should_build_canonical_request_matching_aws_example() {
        let headers = normalize_headers([
            ("host", "examplebucket.s3.amazonaws.com"),
            ("range", "bytes=0-9"),
            ("x-amz-content-sha256", EMPTY_HASH),
            ("x-amz-date", "20130524T000000Z"),
        ]);

        let canonical = CanonicalRequest::new("GET", "/test.txt", &[], &headers, EMPTY_HASH);

        let expected = "GET\n\
                        /test.txt\n\
                        \n\
                        host:examplebucket.s3.amazonaws.com\n\
                        range:bytes=0-9\n\
                        x-amz-content-sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
                        x-amz-date:20130524T000000Z\n\
                        \n\
                        host;range;x-amz-content-sha256;x-amz-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical.render(), expected);
        assert_eq!(
            canonical.hash(),
            "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972"
        );
    }
}
