//! The HTTP transport seam under the signed client.
//!
//! [`HttpTransport`] sends one fully built request and returns the buffered
//! response. TLS, connection pooling, DNS, and timeouts belong to the
//! implementation; the signed client only sees status, headers, and body.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Failure to obtain any response from the backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP stack failed (connect, TLS, I/O, timeout).
    #[error("HTTP transport failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request could not be handed to the HTTP stack.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Sends a single HTTP request.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Dispatch `request` and buffer the whole response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only when no HTTP response was received; a
    /// response with an error status is still `Ok`.
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError>;
}

/// Production transport backed by [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with reqwest's default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = http::Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
