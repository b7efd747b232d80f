//! Classroom content lifecycle engine.
//!
//! Every operation takes the acting [`Actor`] explicitly and returns
//! [`Result<Outcome>`](crate::error::Result). Expected refusals come back as
//! errors for which [`ClassroomError::is_expected`] is true; a write that
//! would change nothing returns [`Outcome::Unchanged`] without touching the
//! database or storage.
//!
//! [`ClassroomError::is_expected`]: crate::error::ClassroomError::is_expected

pub mod actor;
pub mod attachments;
pub mod audience;
pub mod cascade;
pub mod chat;
pub mod comments;
pub mod notify;
pub mod rooms;
pub mod schedule;
pub mod stream;
pub mod submissions;

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::entities::{classroom, membership};
use crate::error::{ClassroomError, Result};

pub use actor::{Actor, Role};
pub use attachments::{AttachmentSet, AttachmentStore, Reconciliation, Upload};
pub use audience::Audience;
pub use notify::{LogDispatcher, Notice, NotificationDispatcher};

/// Result of a successful operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(i32),
    Updated,
    Unchanged,
    Deleted,
}

impl Outcome {
    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Created(_) => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "no changes",
            Outcome::Deleted => "deleted",
        }
    }

    pub fn created_id(&self) -> Option<i32> {
        match self {
            Outcome::Created(id) => Some(*id),
            _ => None,
        }
    }
}

/// Shared handles every operation works through
pub struct Engine {
    pub(crate) db: DatabaseConnection,
    pub(crate) files: AttachmentStore,
    pub(crate) dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Engine {
    pub fn new(
        db: DatabaseConnection,
        files: AttachmentStore,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            files,
            dispatcher,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn files(&self) -> &AttachmentStore {
        &self.files
    }

    pub(crate) async fn load_classroom(&self, classroom_id: i32) -> Result<classroom::Model> {
        classroom::Entity::find_by_id(classroom_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Classroom {}", classroom_id)))
    }

    pub(crate) async fn find_membership(
        &self,
        classroom_id: i32,
        user_id: i32,
    ) -> Result<Option<membership::Model>> {
        Ok(membership::Entity::find()
            .filter(membership::Column::ClassroomId.eq(classroom_id))
            .filter(membership::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    pub(crate) async fn is_member(&self, classroom_id: i32, user_id: i32) -> Result<bool> {
        Ok(self.find_membership(classroom_id, user_id).await?.is_some())
    }

    pub(crate) async fn member_ids(&self, classroom_id: i32) -> Result<Vec<i32>> {
        Ok(membership::Entity::find()
            .filter(membership::Column::ClassroomId.eq(classroom_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect())
    }
}

/// Current unix time in seconds
pub(crate) fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub(crate) fn to_json_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn from_json_list<T: DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("unreadable list column {:?}: {}", raw, e);
        Vec::new()
    })
}
