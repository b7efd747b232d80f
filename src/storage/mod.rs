//! Object storage abstraction.
//!
//! Provides a pluggable storage layer for attachment files, backed by:
//! - Local filesystem (default)
//! - S3-compatible object storage (AWS S3, MinIO, R2, etc.)

mod backend;
mod config;
mod local;
mod s3;

pub use backend::{buckets, StorageBackend, StorageError, StorageResult};
pub use config::{StorageConfig, StorageType};
pub use local::LocalStorage;
pub use s3::{S3Config, S3Storage};
