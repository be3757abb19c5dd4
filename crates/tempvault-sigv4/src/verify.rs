//! Server-side recomputation of SigV4 signatures.
//!
//! The storage client never needs this to talk to a real backend; it exists so
//! the in-memory backend can reject a badly signed request the same way S3
//! would, which keeps signing regressions visible in unit tests.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::{
    CanonicalRequest, canonical_headers, canonical_query_from_raw, canonical_uri_from_raw,
};
use crate::credentials::Credentials;
use crate::error::SigningError;
use crate::signer::{
    ALGORITHM, SCOPE_TERMINATOR, build_string_to_sign, compute_signature, credential_scope,
    derive_signing_key,
};

/// Parsed components of a SigV4 `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuth {
    /// The access key ID.
    pub access_key_id: String,
    /// Date component of the credential scope (`YYYYMMDD`).
    pub date: String,
    /// Region component of the credential scope.
    pub region: String,
    /// Service component of the credential scope.
    pub service: String,
    /// Signed header names, in the order given.
    pub signed_headers: Vec<String>,
    /// Hex-encoded signature.
    pub signature: String,
}

/// Parse an `Authorization` header value.
///
/// # Errors
///
/// Returns [`SigningError::InvalidAuthHeader`] if the value is not a
/// well-formed `AWS4-HMAC-SHA256` header.
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuth, SigningError> {
    let (algorithm, rest) = header
        .split_once(' ')
        .ok_or(SigningError::InvalidAuthHeader)?;
    if algorithm != ALGORITHM {
        return Err(SigningError::InvalidAuthHeader);
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let credential = credential.ok_or(SigningError::InvalidAuthHeader)?;
    let signed_headers = signed_headers.ok_or(SigningError::InvalidAuthHeader)?;
    let signature = signature.ok_or(SigningError::InvalidAuthHeader)?;

    let cred_parts: Vec<&str> = credential.splitn(5, '/').collect();
    if cred_parts.len() != 5 || cred_parts[4] != SCOPE_TERMINATOR {
        return Err(SigningError::InvalidAuthHeader);
    }

    Ok(ParsedAuth {
        access_key_id: cred_parts[0].to_owned(),
        date: cred_parts[1].to_owned(),
        region: cred_parts[2].to_owned(),
        service: cred_parts[3].to_owned(),
        signed_headers: signed_headers.split(';').map(ToOwned::to_owned).collect(),
        signature: signature.to_owned(),
    })
}

/// Recompute the signature of a received request and compare it.
///
/// `body_hash` is the hex SHA-256 of the body actually received.
///
/// # Errors
///
/// Returns a [`SigningError`] when the header is missing or malformed, the
/// access key is unknown, a signed header is absent, or the signature differs.
pub fn verify_request(
    parts: &http::request::Parts,
    body_hash: &str,
    credentials: &Credentials,
) -> Result<(), SigningError> {
    let auth_header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .ok_or(SigningError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| SigningError::InvalidAuthHeader)?;

    let parsed = parse_authorization_header(auth_header)?;
    if parsed.access_key_id != credentials.access_key_id() {
        return Err(SigningError::AccessKeyNotFound(parsed.access_key_id));
    }

    let timestamp = header_str(parts, "x-amz-date")?;

    let mut signed = Vec::with_capacity(parsed.signed_headers.len());
    for name in &parsed.signed_headers {
        signed.push((name.as_str(), header_str(parts, name)?));
    }

    let canonical = CanonicalRequest {
        method: parts.method.as_str().to_owned(),
        uri: canonical_uri_from_raw(parts.uri.path()),
        query: canonical_query_from_raw(parts.uri.query().unwrap_or("")),
        headers: canonical_headers(signed),
        payload_hash: body_hash.to_owned(),
    };

    let scope = credential_scope(&parsed.date, &parsed.region, &parsed.service);
    let string_to_sign = build_string_to_sign(timestamp, &scope, &canonical.hash());
    let signing_key = derive_signing_key(
        credentials.secret_access_key(),
        &parsed.date,
        &parsed.region,
        &parsed.service,
    );
    let expected = compute_signature(&signing_key, &string_to_sign);

    if parsed.signature.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        debug!(
            expected = %expected,
            provided = %parsed.signature,
            canonical_request = %canonical,
            "signature mismatch"
        );
        Err(SigningError::SignatureDoesNotMatch)
    }
}

fn header_str<'a>(parts: &'a http::request::Parts, name: &str) -> Result<&'a str, SigningError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| SigningError::MissingHeader(name.to_owned()))?
        .to_str()
        .map_err(|_| SigningError::MissingHeader(name.to_owned()))
}
