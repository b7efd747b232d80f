//! Attachment storage and reconciliation.
//!
//! Every stored file is addressed by a public URL of the form
//! `<public_url>/<bucket>/<classroom_id>/<uuid>-<file name>`. The URL is what
//! rows persist; the key is recovered from it when the file must go.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;

use crate::storage::{buckets, StorageBackend, StorageResult};

/// A file received with a mutation request
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

/// The persisted attachment state of one row
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentSet {
    /// URLs of objects held in storage
    pub files: Vec<String>,
    /// Plain URLs with no storage object behind them
    pub links: Vec<String>,
}

/// Outcome of a best-effort removal
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: usize,
    /// URLs whose objects could not be deleted and are now storage debt
    pub failed: Vec<String>,
}

/// Attachment state a row will hold after an edit, plus the storage work
/// that waits on the row write
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub set: AttachmentSet,
    /// Previously stored objects the row no longer lists
    pub dropped: Vec<String>,
    /// Objects stored for this edit
    pub uploaded: Vec<String>,
}

pub struct AttachmentStore {
    backend: Arc<dyn StorageBackend>,
    public_url: String,
}

impl AttachmentStore {
    pub fn new(backend: Arc<dyn StorageBackend>, public_url: impl Into<String>) -> Self {
        Self {
            backend,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, bucket, key)
    }

    /// Recover the storage key of a URL this store issued for `bucket`
    pub fn key_for(&self, bucket: &str, url: &str) -> Option<String> {
        let key = url
            .strip_prefix(&self.public_url)?
            .strip_prefix('/')?
            .strip_prefix(bucket)?
            .strip_prefix('/')?;
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Store one file under the classroom's namespace and return its URL
    pub async fn upload(&self, bucket: &str, classroom_id: i32, upload: Upload) -> StorageResult<String> {
        let key = format!(
            "{}/{}-{}",
            classroom_id,
            uuid::Uuid::new_v4().simple(),
            sanitize_file_name(&upload.file_name)
        );
        self.backend.put(bucket, &key, upload.data).await?;
        Ok(self.url_for(bucket, &key))
    }

    /// Upload concurrently; failed uploads are logged and left out.
    pub async fn upload_all(&self, bucket: &str, classroom_id: i32, uploads: Vec<Upload>) -> Vec<String> {
        if uploads.is_empty() {
            return Vec::new();
        }

        let results = join_all(uploads.into_iter().map(|upload| async move {
            let name = upload.file_name.clone();
            (name, self.upload(bucket, classroom_id, upload).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(name, result)| match result {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("upload of '{}' to {} failed, dropping it: {}", name, bucket, e);
                    None
                }
            })
            .collect()
    }

    /// Delete the objects behind `urls`. Failures are reported, never raised.
    pub async fn remove(&self, bucket: &str, urls: &[String]) -> RemovalReport {
        let mut report = RemovalReport::default();
        let mut keyed = Vec::new();

        for url in urls {
            match self.key_for(bucket, url) {
                Some(key) => keyed.push((url, key)),
                None => tracing::debug!("{} is not a {} object, nothing to delete", url, bucket),
            }
        }

        let results = join_all(keyed.iter().map(|(_, key)| self.backend.delete(bucket, key))).await;

        for ((url, _), result) in keyed.into_iter().zip(results) {
            match result {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!("failed to delete {} from storage, leaving it as debt: {}", url, e);
                    report.failed.push(url.clone());
                }
            }
        }

        report
    }

    /// Plan a row's move from `previous` to `kept` + uploaded files.
    ///
    /// New files are stored right away. Nothing is deleted here: the caller
    /// writes the row, then hands the plan to [`AttachmentStore::settle`].
    /// Entries of `kept` that were never part of `previous` are ignored, so a
    /// caller cannot adopt objects it does not own.
    pub async fn reconcile(
        &self,
        bucket: &str,
        classroom_id: i32,
        previous: &[String],
        kept: &[String],
        incoming_files: Vec<Upload>,
        incoming_links: Vec<String>,
    ) -> Reconciliation {
        let previous_set: HashSet<&String> = previous.iter().collect();
        let kept = dedup(kept.iter().filter(|url| previous_set.contains(url)).cloned());
        let kept_set: HashSet<&String> = kept.iter().collect();

        let dropped: Vec<String> = dedup(
            previous
                .iter()
                .filter(|url| !kept_set.contains(url))
                .cloned(),
        );

        let uploaded = self.upload_all(bucket, classroom_id, incoming_files).await;

        Reconciliation {
            set: AttachmentSet {
                files: dedup(uploaded.iter().cloned().chain(kept)),
                links: normalize_links(incoming_links),
            },
            dropped,
            uploaded,
        }
    }

    /// Finish a reconciliation once the row write is known.
    ///
    /// On success the objects the row stopped listing go; on failure the
    /// row still lists the old set, so only this edit's uploads go.
    pub async fn settle(&self, bucket: &str, plan: &Reconciliation, written: bool) {
        if written {
            if !plan.dropped.is_empty() {
                let report = self.remove(bucket, &plan.dropped).await;
                tracing::debug!(
                    "reconcile: removed {} object(s) from {}, {} failed",
                    report.removed,
                    bucket,
                    report.failed.len()
                );
            }
        } else {
            self.discard(bucket, &plan.uploaded).await;
        }
    }

    /// Remove objects uploaded for a row that was never written
    pub async fn discard(&self, bucket: &str, uploaded: &[String]) {
        if uploaded.is_empty() {
            return;
        }
        let report = self.remove(bucket, uploaded).await;
        if report.failed.is_empty() {
            tracing::debug!("discarded {} unreferenced upload(s) from {}", report.removed, bucket);
        } else {
            tracing::warn!("orphaned upload(s) left in {}: {:?}", bucket, report.failed);
        }
    }

    /// Remove every object left under a classroom's namespace, in all buckets
    pub async fn sweep_classroom(&self, classroom_id: i32) -> usize {
        let prefix = format!("{}/", classroom_id);
        let mut swept = 0;

        for bucket in buckets::ALL {
            let keys = match self.backend.list(bucket, Some(&prefix)).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!("could not list {} for classroom {}: {}", bucket, classroom_id, e);
                    continue;
                }
            };

            for key in keys {
                match self.backend.delete(bucket, &key).await {
                    Ok(()) => swept += 1,
                    Err(e) => tracing::warn!("sweep could not delete {}/{}: {}", bucket, key, e),
                }
            }
        }

        if swept > 0 {
            tracing::info!("swept {} orphaned object(s) of classroom {}", swept, classroom_id);
        }
        swept
    }
}

/// Trim, drop empties and duplicates, keep first-seen order
pub fn normalize_links(links: Vec<String>) -> Vec<String> {
    dedup(
        links
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
    )
}

fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        "file".to_string()
    } else {
        clean.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlakyStorage;
    use std::sync::atomic::Ordering;

    fn store() -> (AttachmentStore, Arc<FlakyStorage>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let flaky = Arc::new(FlakyStorage::new(dir.path().to_path_buf()));
        let store = AttachmentStore::new(flaky.clone(), "http://files.test/");
        (store, flaky, dir)
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my essay (final).docx"), "my_essay__final_.docx");
        assert_eq!(sanitize_file_name(".."), "file");
    }

    #[tokio::test]
    async fn test_same_name_uploads_do_not_collide() {
        let (store, flaky, _dir) = store();

        let urls = store
            .upload_all(
                buckets::POSTS,
                4,
                vec![Upload::new("a.txt", "one"), Upload::new("a.txt", "two")],
            )
            .await;

        assert_eq!(urls.len(), 2);
        assert_ne!(urls[0], urls[1]);
        for url in &urls {
            assert!(url.starts_with("http://files.test/posts/4/"));
            assert!(url.ends_with("-a.txt"));
        }
        assert_eq!(flaky.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconcile_removes_exactly_the_dropped_files() {
        let (store, flaky, _dir) = store();

        let previous = store
            .upload_all(
                buckets::POSTS,
                1,
                vec![Upload::new("keep.txt", "k"), Upload::new("drop.txt", "d")],
            )
            .await;
        let (keep, drop) = (previous[0].clone(), previous[1].clone());

        let plan = store
            .reconcile(
                buckets::POSTS,
                1,
                &previous,
                &[keep.clone(), "http://files.test/posts/9/stolen.txt".to_string()],
                vec![Upload::new("new.txt", "n")],
                vec![" https://example.com ".into(), "https://example.com".into(), "".into()],
            )
            .await;

        let drop_key = store.key_for(buckets::POSTS, &drop).unwrap();
        assert_eq!(flaky.deletes.load(Ordering::SeqCst), 0);
        assert!(flaky.inner.exists(buckets::POSTS, &drop_key).await.unwrap());
        assert_eq!(plan.dropped, vec![drop.clone()]);

        store.settle(buckets::POSTS, &plan, true).await;
        let result = &plan.set;
        assert_eq!(result.files.len(), 2);
        assert!(result.files.contains(&keep));
        assert!(!result.files.contains(&drop));
        assert!(!result.files.iter().any(|u| u.contains("stolen")));
        assert_eq!(result.links, vec!["https://example.com".to_string()]);

        assert_eq!(flaky.deletes.load(Ordering::SeqCst), 1);
        assert!(!flaky.inner.exists(buckets::POSTS, &drop_key).await.unwrap());
        for url in &result.files {
            let key = store.key_for(buckets::POSTS, url).unwrap();
            assert!(flaky.inner.exists(buckets::POSTS, &key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unwritten_reconciliation_keeps_previous_objects() {
        let (store, flaky, _dir) = store();
        let previous = store
            .upload_all(buckets::SUBMISSIONS, 1, vec![Upload::new("old.txt", "o")])
            .await;

        let plan = store
            .reconcile(buckets::SUBMISSIONS, 1, &previous, &[], vec![Upload::new("new.txt", "n")], vec![])
            .await;
        store.settle(buckets::SUBMISSIONS, &plan, false).await;

        let old_key = store.key_for(buckets::SUBMISSIONS, &previous[0]).unwrap();
        assert!(flaky.inner.exists(buckets::SUBMISSIONS, &old_key).await.unwrap());
        let new_key = store.key_for(buckets::SUBMISSIONS, &plan.uploaded[0]).unwrap();
        assert!(!flaky.inner.exists(buckets::SUBMISSIONS, &new_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_upload_is_filtered_not_fatal() {
        let (store, flaky, _dir) = store();
        flaky.fail_puts_named("broken");

        let urls = store
            .upload_all(
                buckets::SUBMISSIONS,
                2,
                vec![Upload::new("fine.txt", "ok"), Upload::new("broken.txt", "x")],
            )
            .await;

        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("-fine.txt"));
    }

    #[tokio::test]
    async fn test_remove_reports_failures_and_skips_foreign_urls() {
        let (store, flaky, _dir) = store();
        let urls = store
            .upload_all(buckets::COMMENTS, 3, vec![Upload::new("c.png", "c")])
            .await;

        flaky.fail_deletes.store(true, Ordering::SeqCst);
        let mut targets = urls.clone();
        targets.push("https://elsewhere.example/c.png".into());
        let report = store.remove(buckets::COMMENTS, &targets).await;

        assert_eq!(report.removed, 0);
        assert_eq!(report.failed, urls);
    }

    #[tokio::test]
    async fn test_sweep_classroom_only_touches_its_namespace() {
        let (store, flaky, _dir) = store();
        store.upload_all(buckets::POSTS, 5, vec![Upload::new("a", "a")]).await;
        store.upload_all(buckets::CHAT, 5, vec![Upload::new("b", "b")]).await;
        store.upload_all(buckets::CHAT, 55, vec![Upload::new("c", "c")]).await;

        assert_eq!(store.sweep_classroom(5).await, 2);
        assert!(flaky.inner.list(buckets::POSTS, Some("5/")).await.unwrap().is_empty());
        assert_eq!(flaky.inner.list(buckets::CHAT, Some("55/")).await.unwrap().len(), 1);
    }
}
