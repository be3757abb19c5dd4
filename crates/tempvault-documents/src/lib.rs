//! Document lifecycle management over an S3-compatible object store.
//!
//! Documents are either temporary, expiring a fixed time after upload unless
//! extended, or permanent. The backend has no native expiry, so the lifetime
//! lives in object metadata and is enforced two ways:
//!
//! - reads ([`DocumentManager::download`], [`DocumentManager::extend`],
//!   [`DocumentManager::list`]) treat a lapsed document as missing and delete it;
//! - [`DocumentManager::cleanup`] sweeps the whole bucket, at most one run at a
//!   time, and [`spawn_sweeper`] runs it on an interval.

pub mod clock;
pub mod error;
pub mod filename;
pub mod manager;
pub mod metadata;
pub mod policy;
pub mod sweep;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DocumentError, DocumentResult};
pub use filename::sanitize_filename;
pub use manager::{DocumentManager, NewDocument};
pub use metadata::{DocumentMetadata, Lifetime};
pub use policy::DocumentPolicy;
pub use sweep::{SweepGuard, SweepOutcome, SweepReport, spawn_sweeper};
pub use view::{DocumentView, DownloadedDocument, ExtendedDocument};
