//! The credential pair used to sign requests.

use std::fmt;

use crate::error::SigningError;

/// An access key ID and its secret.
///
/// Both halves must be non-empty; construction fails otherwise so a missing
/// credential surfaces before any request leaves the process.
///
/// # Examples
///
/// ```
/// use tempvault_sigv4::{Credentials, SigningError};
///
/// let creds = Credentials::new("AKID", "secret").unwrap();
/// assert_eq!(creds.access_key_id(), "AKID");
///
/// assert_eq!(Credentials::new("", "secret").unwrap_err(), SigningError::MissingAccessKey);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create a credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingAccessKey`] or [`SigningError::MissingSecretKey`]
    /// when the corresponding half is empty.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, SigningError> {
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();
        if access_key_id.is_empty() {
            return Err(SigningError::MissingAccessKey);
        }
        if secret_access_key.is_empty() {
            return Err(SigningError::MissingSecretKey);
        }
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }

    /// The access key ID, as it appears in the credential scope.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret used to seed the signing key chain.
    #[must_use]
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}
