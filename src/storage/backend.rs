//! Storage backend trait definition.
//!
//! Attachment files live in buckets (one per kind of owning entity) and are
//! keyed by `<classroom_id>/<unique file name>`, so every object a classroom
//! owns can be found by prefix.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Object not found
    NotFound(String),
    /// IO error
    Io(std::io::Error),
    /// Key would escape its bucket or is otherwise malformed
    InvalidKey(String),
    /// Other error
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "Object not found: {}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::InvalidKey(key) => write!(f, "Invalid object key: {}", key),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend trait for pluggable object storage.
///
/// `bucket` partitions objects by owning entity kind, see [`buckets`].
/// Deleting a missing object is not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get an object by bucket and key
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Put an object by bucket and key
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object by bucket and key
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a bucket (with optional prefix)
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>>;
}

/// Storage buckets
pub mod buckets {
    /// Stream post attachments
    pub const POSTS: &str = "posts";
    /// Class and private comment attachments
    pub const COMMENTS: &str = "comments";
    /// Submission attachments
    pub const SUBMISSIONS: &str = "submissions";
    /// Chat message attachments
    pub const CHAT: &str = "chat";

    pub const ALL: [&str; 4] = [POSTS, COMMENTS, SUBMISSIONS, CHAT];
}
