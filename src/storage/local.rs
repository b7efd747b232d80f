//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::backend::{StorageBackend, StorageError, StorageResult};

/// Local filesystem storage backend.
///
/// Stores objects in a directory structure mirroring their keys:
/// ```text
/// {base_path}/
///   {bucket}/
///     {classroom_id}/
///       {uuid}-{file name}
/// ```
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the full path for a key, refusing anything that would leave the bucket
    fn key_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(format!("{}/{}", bucket, key)));
        }
        Ok(self.base_path.join(bucket).join(relative))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(bucket, key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("{}/{}", bucket, key))
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(bucket, key)?;
        self.ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.key_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.key_path(bucket, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let root = self.base_path.join(bucket);
        if !fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if let Some(p) = prefix {
                    if !key.starts_with(p) {
                        continue;
                    }
                }

                keys.push(key);
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_basic() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        let data = Bytes::from("hello world");
        storage.put("posts", "7/abc-notes.txt", data.clone()).await.unwrap();

        let retrieved = storage.get("posts", "7/abc-notes.txt").await.unwrap();
        assert_eq!(retrieved, data);

        assert!(storage.exists("posts", "7/abc-notes.txt").await.unwrap());
        assert!(!storage.exists("posts", "7/missing.txt").await.unwrap());

        storage.delete("posts", "7/abc-notes.txt").await.unwrap();
        assert!(!storage.exists("posts", "7/abc-notes.txt").await.unwrap());

        // Deleting twice is fine
        storage.delete("posts", "7/abc-notes.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_list_by_classroom_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        storage.put("chat", "1/a.png", Bytes::from("1")).await.unwrap();
        storage.put("chat", "1/b.png", Bytes::from("2")).await.unwrap();
        storage.put("chat", "12/c.png", Bytes::from("3")).await.unwrap();

        let mut keys = storage.list("chat", None).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1/a.png", "1/b.png", "12/c.png"]);

        let mut keys = storage.list("chat", Some("1/")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1/a.png", "1/b.png"]);

        assert!(storage.list("posts", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        let result = storage.put("posts", "../escape.txt", Bytes::from("x")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("posts", "/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
