//! Signed HTTP client and object-store facade for S3-compatible backends.
//!
//! # Architecture
//!
//! ```text
//!   ObjectStore (ensure_bucket, put/get/head/delete, list keys)
//!        |
//!        v
//!   SignedClient (payload hash, mandatory headers, SigV4, status check)
//!        |
//!        v
//!   HttpTransport (reqwest in production, MemoryTransport in tests)
//! ```
//!
//! Every request is dispatched exactly once. Non-2xx responses surface as
//! [`StorageError::Request`] carrying the status and the server's reason
//! text; [`StorageError::is_retriable`] tells a caller whether a retry could
//! help, but no retry happens at this layer.

pub mod client;
pub mod error;
pub mod memory;
pub mod store;
pub mod transport;
mod xml;

pub use client::{SignedClient, StorageResponse};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryTransport;
pub use store::{ObjectHead, ObjectStore, StoredObject};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
