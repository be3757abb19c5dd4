//! The document lifecycle manager.
//!
//! Documents live only in the object store. Each one is a single object whose
//! key is the document identifier and whose metadata carries the creation
//! time, permanence, and expiry. Expiry is enforced lazily: reads that see a
//! lapsed document delete it and report it missing, and [`DocumentManager::cleanup`]
//! removes whatever the reads have not touched.
//!
//! Concurrent operations on the same identifier are not serialized. An extend
//! racing a sweep may lose; deletes are idempotent and reads treat "missing"
//! and "expired" the same.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tempvault_s3_client::{ObjectStore, StorageError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{DocumentError, DocumentResult};
use crate::metadata::{DocumentMetadata, Lifetime};
use crate::policy::DocumentPolicy;
use crate::sweep::{SweepGuard, SweepOutcome, SweepReport};
use crate::view::{DocumentView, DownloadedDocument, ExtendedDocument, remaining_seconds};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata reads a listing keeps in flight at once.
const HEAD_CONCURRENCY: usize = 16;

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Client-side filename.
    pub file_name: String,
    /// Declared MIME type, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub body: Bytes,
}

/// Upload, list, download, extend, and sweep documents.
#[derive(Debug)]
pub struct DocumentManager {
    store: ObjectStore,
    clock: Arc<dyn Clock>,
    policy: DocumentPolicy,
    sweep: SweepGuard,
}

impl DocumentManager {
    /// Manage documents in `store` with the system clock and default policy.
    #[must_use]
    pub fn new(store: ObjectStore) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: DocumentPolicy::default(),
            sweep: SweepGuard::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the lifetime policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DocumentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Store a new document under a fresh identifier.
    ///
    /// Temporary documents expire `default_ttl` after creation; permanent
    /// ones carry no expiry.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Storage`] when the write fails.
    pub async fn upload(&self, file: NewDocument, permanent: bool) -> DocumentResult<DocumentView> {
        let id = Uuid::new_v4().to_string();
        let now = self.clock.now_millis();
        let lifetime = if permanent {
            Lifetime::Permanent
        } else {
            Lifetime::Expiring(now.saturating_add(self.policy.ttl_millis()))
        };
        let content_type = file
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_owned());
        let metadata = DocumentMetadata {
            original_name: file.file_name,
            content_type,
            created_at: now,
            lifetime,
            size: file.body.len() as u64,
        };

        self.store
            .put_object(&id, file.body, Some(&metadata.content_type), &metadata.to_entries())
            .await?;

        info!(
            id = %id,
            permanent,
            size = metadata.size,
            expires_at = ?lifetime.expires_at(),
            "document uploaded"
        );
        Ok(DocumentView::new(&id, &metadata, &self.policy, now))
    }

    /// Every live document, permanent ones first.
    ///
    /// Permanent documents are ordered newest first, temporary ones by
    /// soonest expiry. Expired documents are left out and deleted in the
    /// background; documents with unreadable metadata are left out and kept.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Storage`] when the listing or a metadata read fails
    /// for any reason other than the object having vanished.
    pub async fn list(&self) -> DocumentResult<Vec<DocumentView>> {
        let keys = self.store.list_object_keys().await?;
        let head_futures: Vec<_> = keys.iter().map(|key| self.store.head_object(key)).collect();
        let heads: Vec<_> = stream::iter(head_futures)
            .buffered(HEAD_CONCURRENCY)
            .collect()
            .await;
        let now = self.clock.now_millis();

        let mut views = Vec::with_capacity(keys.len());
        for (key, head) in keys.iter().zip(heads) {
            let head = match head {
                Ok(head) => head,
                Err(err) if err.is_not_found() => continue,
                Err(StorageError::InvalidKey { .. }) => {
                    warn!(id = %key, "skipping object whose key cannot be addressed");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let metadata = match DocumentMetadata::from_head(&head) {
                Ok(metadata) => metadata,
                Err(reason) => {
                    warn!(id = %key, %reason, "skipping document with invalid metadata");
                    continue;
                }
            };
            if metadata.lifetime.is_expired(now) {
                self.discard_in_background(key);
                continue;
            }
            views.push(DocumentView::new(key, &metadata, &self.policy, now));
        }

        views.sort_by(listing_order);
        Ok(views)
    }

    /// Fetch a live document's bytes.
    ///
    /// # Errors
    ///
    /// [`DocumentError::NotFoundOrExpired`] when the document is absent,
    /// lapsed (it is deleted first), or unreadable.
    pub async fn download(&self, id: &str) -> DocumentResult<DownloadedDocument> {
        let metadata = self.live_metadata(id).await?;
        let object = self
            .store
            .get_object(id)
            .await
            .map_err(|err| not_found_or(id, err))?;
        debug!(id, size = object.body.len(), "document downloaded");
        Ok(DownloadedDocument::new(id, object.body, &metadata))
    }

    /// Push a temporary document's expiry to `now + minutes`.
    ///
    /// The object is rewritten in full with the same bytes and updated
    /// metadata.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::InvalidExtension`] unless `0 < minutes <= 720`,
    ///   checked before any storage call.
    /// - [`DocumentError::PermanentDocument`] for permanent documents.
    /// - [`DocumentError::NotFoundOrExpired`] when absent or already lapsed
    ///   (a lapsed document is deleted).
    pub async fn extend(&self, id: &str, minutes: f64) -> DocumentResult<ExtendedDocument> {
        if !self.policy.accepts_extension(minutes) {
            return Err(DocumentError::InvalidExtension { minutes });
        }

        let mut metadata = self.live_metadata(id).await?;
        if metadata.lifetime == Lifetime::Permanent {
            return Err(DocumentError::PermanentDocument { id: id.to_owned() });
        }

        let object = self
            .store
            .get_object(id)
            .await
            .map_err(|err| not_found_or(id, err))?;

        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(extension_millis(minutes));
        metadata.lifetime = Lifetime::Expiring(expires_at);
        metadata.size = object.body.len() as u64;

        self.store
            .put_object(id, object.body, Some(&metadata.content_type), &metadata.to_entries())
            .await?;

        info!(id, minutes, expires_at, "document extended");
        Ok(ExtendedDocument {
            id: id.to_owned(),
            expires_at,
            expires_in_seconds: remaining_seconds(expires_at, now),
        })
    }

    /// Delete every expired document in the bucket.
    ///
    /// Returns [`SweepOutcome::Skipped`] without touching the store when a
    /// sweep is already running. Per-document failures are logged and
    /// counted; they never stop the sweep.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Storage`] when the listing itself fails.
    pub async fn cleanup(&self) -> DocumentResult<SweepOutcome> {
        let Some(_permit) = self.sweep.try_acquire() else {
            debug!("sweep already in progress");
            return Ok(SweepOutcome::Skipped);
        };

        let keys = self.store.list_object_keys().await?;
        let now = self.clock.now_millis();
        let mut report = SweepReport {
            scanned: keys.len(),
            ..SweepReport::default()
        };

        for key in &keys {
            let metadata = match self.load(key).await {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(DocumentError::InvalidMetadata { reason, .. }) => {
                    debug!(id = %key, %reason, "sweep leaving document with invalid metadata");
                    continue;
                }
                Err(err) => {
                    warn!(id = %key, error = %err, "sweep could not read document metadata");
                    report.failed += 1;
                    continue;
                }
            };
            if !metadata.lifetime.is_expired(now) {
                continue;
            }
            match self.store.delete_object(key).await {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    warn!(id = %key, error = %err, "sweep failed to delete expired document");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            "sweep finished"
        );
        Ok(SweepOutcome::Completed(report))
    }

    /// Whether a sweep is currently running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweep.is_running()
    }

    /// Metadata of `id`, `None` when the object does not exist.
    async fn load(&self, id: &str) -> DocumentResult<Option<DocumentMetadata>> {
        match self.store.head_object(id).await {
            Ok(head) => DocumentMetadata::from_head(&head).map(Some).map_err(|reason| {
                DocumentError::InvalidMetadata {
                    id: id.to_owned(),
                    reason,
                }
            }),
            Err(err) if err.is_not_found() || matches!(err, StorageError::InvalidKey { .. }) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Metadata of a document that exists, decodes, and has not lapsed.
    async fn live_metadata(&self, id: &str) -> DocumentResult<DocumentMetadata> {
        if !is_valid_id(id) {
            return Err(not_found(id));
        }
        let metadata = match self.load(id).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return Err(not_found(id)),
            Err(DocumentError::InvalidMetadata { reason, .. }) => {
                warn!(id, %reason, "treating document with invalid metadata as missing");
                return Err(not_found(id));
            }
            Err(err) => return Err(err),
        };
        if metadata.lifetime.is_expired(self.clock.now_millis()) {
            self.discard(id).await;
            return Err(not_found(id));
        }
        Ok(metadata)
    }

    async fn discard(&self, id: &str) {
        match self.store.delete_object(id).await {
            Ok(()) => debug!(id, "expired document deleted"),
            Err(err) => warn!(id, error = %err, "failed to delete expired document"),
        }
    }

    fn discard_in_background(&self, id: &str) {
        let store = self.store.clone();
        let id = id.to_owned();
        tokio::spawn(async move {
            match store.delete_object(&id).await {
                Ok(()) => debug!(id = %id, "expired document deleted"),
                Err(err) => warn!(id = %id, error = %err, "failed to delete expired document"),
            }
        });
    }
}

/// Permanent before temporary; newest permanent first; soonest expiry first.
fn listing_order(a: &DocumentView, b: &DocumentView) -> Ordering {
    match (a.expires_at, b.expires_at) {
        (None, None) => b.created_at.cmp(&a.created_at),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
    .then_with(|| a.id.cmp(&b.id))
}

#[allow(clippy::cast_possible_truncation)]
fn extension_millis(minutes: f64) -> i64 {
    (minutes * 60_000.0).round() as i64
}

/// Identifiers are single path segments that survive URL normalization.
fn is_valid_id(id: &str) -> bool {
    !matches!(id, "" | "." | "..") && !id.contains('/')
}

fn not_found(id: &str) -> DocumentError {
    DocumentError::NotFoundOrExpired { id: id.to_owned() }
}

fn not_found_or(id: &str, err: StorageError) -> DocumentError {
    if err.is_not_found() {
        not_found(id)
    } else {
        err.into()
    }
}
