//! AWS Signature Version 4 request signing for Tempvault.
//!
//! The storage backend speaks the S3 HTTP API and rejects any request whose
//! `Authorization` header does not match the signature it recomputes. This
//! crate produces that header from first principles: no SDK is involved.
//!
//! # Overview
//!
//! Signing a request takes four steps:
//!
//! 1. Canonicalize the method, path, query, headers, and payload hash into a
//!    [`CanonicalRequest`].
//! 2. Build the string to sign from the timestamp, credential scope, and the
//!    SHA-256 of the canonical request.
//! 3. Derive the signing key through the fixed HMAC chain
//!    (`date -> region -> service -> aws4_request`).
//! 4. HMAC the string to sign with that key and embed the hex signature in
//!    the `Authorization` header value.
//!
//! # Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use chrono::{TimeZone, Utc};
//! use tempvault_sigv4::{
//!     CanonicalRequest, Credentials, SigningParams, SigningTime, hash_payload, sign,
//! };
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "secret").unwrap();
//! let time = SigningTime::from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
//! let payload_hash = hash_payload(b"");
//!
//! let mut headers = BTreeMap::new();
//! headers.insert("host".to_owned(), "localhost:9000".to_owned());
//! headers.insert("x-amz-content-sha256".to_owned(), payload_hash.clone());
//! headers.insert("x-amz-date".to_owned(), time.amz_date().to_owned());
//!
//! let canonical = CanonicalRequest::new("HEAD", "/bucket", &[], &headers, &payload_hash);
//! let params = SigningParams::new(&credentials, "us-east-1", "s3", &time);
//! let authorization = sign(&canonical, &params);
//! assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`credentials`] - The access key / secret key pair
//! - [`error`] - Signing error types
//! - [`signer`] - String to sign, key derivation, and the authorization header
//! - [`verify`] - Server-side recomputation used by the in-memory backend

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod signer;
pub mod verify;

pub use canonical::{CanonicalHeaders, CanonicalRequest, normalize_headers};
pub use credentials::Credentials;
pub use error::SigningError;
pub use signer::{SigningParams, SigningTime, hash_payload, sign};
pub use verify::verify_request;
