//! Shared fixtures for engine tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use crate::classroom::notify::ResourceRef;
use crate::classroom::rooms::ClassroomDraft;
use crate::classroom::{Actor, AttachmentStore, Engine, Notice, NotificationDispatcher, Role};
use crate::db::entities::classroom;
use crate::db::init_database;
use crate::error::Result;
use crate::storage::{buckets, LocalStorage, StorageBackend, StorageError, StorageResult};

pub(crate) const PUBLIC_URL: &str = "http://files.test";

pub(crate) fn teacher() -> Actor {
    Actor::new(1, "Ms. Frizzle", Role::Teacher)
}

pub(crate) fn alice() -> Actor {
    Actor::new(2, "Alice", Role::Member).with_avatar("https://avatars.test/alice.png")
}

pub(crate) fn bob() -> Actor {
    Actor::new(3, "Bob", Role::Member)
}

/// A member of no classroom
pub(crate) fn carol() -> Actor {
    Actor::new(4, "Carol", Role::Member)
}

pub(crate) fn admin() -> Actor {
    Actor::new(99, "Admin", Role::Admin)
}

/// Local storage that counts calls and fails on request
pub(crate) struct FlakyStorage {
    pub inner: LocalStorage,
    pub puts: AtomicUsize,
    /// Every attempted delete, failed ones included
    pub deletes: AtomicUsize,
    pub fail_deletes: AtomicBool,
    fail_put_marker: Mutex<Option<String>>,
}

impl FlakyStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            inner: LocalStorage::new(base_path),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            fail_put_marker: Mutex::new(None),
        }
    }

    /// Fail every put whose key contains `marker`
    pub fn fail_puts_named(&self, marker: &str) {
        *self.fail_put_marker.lock().unwrap() = Some(marker.to_string());
    }
}

#[async_trait]
impl StorageBackend for FlakyStorage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let marker = self.fail_put_marker.lock().unwrap().clone();
        if marker.is_some_and(|m| key.contains(&m)) {
            return Err(StorageError::Other(format!("injected put failure for {}", key)));
        }
        self.inner.put(bucket, key, data).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Other(format!("injected delete failure for {}", key)));
        }
        self.inner.delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        self.inner.exists(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        self.inner.list(bucket, prefix).await
    }
}

#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    dispatched: Mutex<Vec<Notice>>,
    retracted: Mutex<Vec<ResourceRef>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notice: &Notice) -> Result<()> {
        self.dispatched.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn retract(&self, resources: &[ResourceRef]) -> Result<()> {
        self.retracted.lock().unwrap().extend_from_slice(resources);
        Ok(())
    }
}

/// An engine over a scratch database and flaky storage
pub(crate) struct Harness {
    pub engine: Engine,
    pub storage: Arc<FlakyStorage>,
    recorder: Arc<RecordingDispatcher>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("classroom.db")).await.unwrap();
        let storage = Arc::new(FlakyStorage::new(dir.path().join("objects")));
        let recorder = Arc::new(RecordingDispatcher::default());
        let engine = Engine::new(
            db,
            AttachmentStore::new(storage.clone(), PUBLIC_URL),
            recorder.clone(),
        );

        Self {
            engine,
            storage,
            recorder,
            _dir: dir,
        }
    }

    pub fn dispatched(&self) -> Vec<Notice> {
        self.recorder.dispatched.lock().unwrap().clone()
    }

    pub fn retracted(&self) -> Vec<ResourceRef> {
        self.recorder.retracted.lock().unwrap().clone()
    }

    pub async fn classroom_named(&self, name: &str) -> classroom::Model {
        let id = self
            .engine
            .create_classroom(&teacher(), ClassroomDraft::new(name))
            .await
            .unwrap()
            .created_id()
            .unwrap();
        self.engine.load_classroom(id).await.unwrap()
    }

    /// A classroom taught by [`teacher`] with nobody in it
    pub async fn classroom(&self) -> classroom::Model {
        self.classroom_named("Physics").await
    }

    /// A classroom that `members` joined by code
    pub async fn classroom_with(&self, members: &[&Actor]) -> classroom::Model {
        let room = self.classroom().await;
        for member in members {
            self.engine.join_classroom(member, &room.join_code).await.unwrap();
        }
        room
    }

    pub async fn allow_member_posts(&self, room: &classroom::Model) {
        self.engine
            .update_classroom(
                &teacher(),
                room.id,
                ClassroomDraft {
                    allow_member_posts: true,
                    ..ClassroomDraft::from_model(room)
                },
            )
            .await
            .unwrap();
    }

    pub async fn object_exists(&self, bucket: &str, url: &str) -> bool {
        let key = self.engine.files().key_for(bucket, url).unwrap();
        self.storage.inner.exists(bucket, &key).await.unwrap()
    }

    /// Objects stored under a classroom's namespace across all buckets
    pub async fn stored_objects(&self, classroom_id: i32) -> usize {
        let prefix = format!("{}/", classroom_id);
        let mut count = 0;
        for bucket in buckets::ALL {
            count += self.storage.inner.list(bucket, Some(&prefix)).await.unwrap().len();
        }
        count
    }
}
