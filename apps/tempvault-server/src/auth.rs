//! Bearer-token gate for permanent uploads.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

/// Why a permanent upload was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UploadAuthError {
    /// The server has no token to compare against.
    #[error("UPLOAD_AUTH_TOKEN is not configured on server.")]
    NotConfigured,
    /// The bearer token is absent or wrong.
    #[error("Unauthorized upload token.")]
    Unauthorized,
}

/// Check the request's `Authorization: Bearer <token>` against `configured`.
pub fn authorize_upload(
    configured: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), UploadAuthError> {
    let configured = configured.ok_or(UploadAuthError::NotConfigured)?;

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if !presented.is_empty() && bool::from(presented.as_bytes().ct_eq(configured.as_bytes())) {
        Ok(())
    } else {
        Err(UploadAuthError::Unauthorized)
    }
}
