//! Shared configuration for Tempvault.
//!
//! This crate holds the connection settings for the S3-compatible backend
//! that every other crate consumes. Configuration is read once at startup
//! and passed explicitly to the signer and client constructors; nothing
//! below it reaches back into the process environment.

mod config;
mod error;

pub use config::{StorageConfig, parse_bool};
pub use error::{ConfigError, ConfigResult};
