//! Document metadata as stored in `x-amz-meta-*` headers.
//!
//! | Key | Value |
//! |-----|-------|
//! | `original-name` | filename, percent-encoded |
//! | `content-type` | declared MIME type |
//! | `created-at` | epoch milliseconds |
//! | `permanent` | `true` or `false` |
//! | `expires-at` | epoch milliseconds, only when not permanent |

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tempvault_s3_client::ObjectHead;

const ORIGINAL_NAME: &str = "original-name";
const CONTENT_TYPE: &str = "content-type";
const CREATED_AT: &str = "created-at";
const PERMANENT: &str = "permanent";
const EXPIRES_AT: &str = "expires-at";

/// Everything but unreserved characters is escaped so any filename fits in a header.
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// The lifetime state of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Never expires.
    Permanent,
    /// Expires at the given epoch millisecond.
    Expiring(i64),
}

impl Lifetime {
    /// Expiry timestamp, `None` when permanent.
    #[must_use]
    pub fn expires_at(self) -> Option<i64> {
        match self {
            Self::Permanent => None,
            Self::Expiring(at) => Some(at),
        }
    }

    /// Whether the document has lapsed at `now`.
    #[must_use]
    pub fn is_expired(self, now: i64) -> bool {
        matches!(self, Self::Expiring(at) if now >= at)
    }
}

/// Decoded per-object metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Filename as uploaded.
    pub original_name: String,
    /// Declared content type.
    pub content_type: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Permanent, or expiring at a fixed instant.
    pub lifetime: Lifetime,
    /// Stored size in bytes.
    pub size: u64,
}

impl DocumentMetadata {
    /// Encode as metadata entries for a PUT.
    #[must_use]
    pub fn to_entries(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::from([
            (
                ORIGINAL_NAME.to_owned(),
                utf8_percent_encode(&self.original_name, NAME_ENCODE_SET).to_string(),
            ),
            (CONTENT_TYPE.to_owned(), self.content_type.clone()),
            (CREATED_AT.to_owned(), self.created_at.to_string()),
        ]);
        match self.lifetime {
            Lifetime::Permanent => {
                entries.insert(PERMANENT.to_owned(), "true".to_owned());
            }
            Lifetime::Expiring(at) => {
                entries.insert(PERMANENT.to_owned(), "false".to_owned());
                entries.insert(EXPIRES_AT.to_owned(), at.to_string());
            }
        }
        entries
    }

    /// Decode from HEAD/GET response headers.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed or missing field.
    pub fn from_head(head: &ObjectHead) -> Result<Self, String> {
        let entries = head.metadata();

        let original_name = match entries.get(ORIGINAL_NAME) {
            Some(raw) => percent_decode_str(raw)
                .decode_utf8()
                .map_err(|e| format!("{ORIGINAL_NAME}: {e}"))?
                .into_owned(),
            None => String::new(),
        };
        let content_type = entries
            .get(CONTENT_TYPE)
            .map(String::as_str)
            .or_else(|| head.content_type())
            .filter(|ct| !ct.is_empty())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_owned();
        let created_at = parse_millis(&entries, CREATED_AT)?;

        let lifetime = match entries.get(PERMANENT).map(String::as_str) {
            Some("true") => Lifetime::Permanent,
            Some("false") => Lifetime::Expiring(parse_millis(&entries, EXPIRES_AT)?),
            Some(other) => return Err(format!("{PERMANENT}: unexpected value {other:?}")),
            None => return Err(format!("{PERMANENT}: missing")),
        };

        Ok(Self {
            original_name,
            content_type,
            created_at,
            lifetime,
            size: head.content_length().unwrap_or(0),
        })
    }
}

fn parse_millis(entries: &BTreeMap<String, String>, key: &str) -> Result<i64, String> {
    let raw = entries.get(key).ok_or_else(|| format!("{key}: missing"))?;
    raw.parse()
        .map_err(|_| format!("{key}: not an integer timestamp: {raw:?}"))
}
