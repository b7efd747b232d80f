//! Notification recording and hand-off.
//!
//! Notification rows are persisted here so deletions can clean them up;
//! delivering them to connected clients is the dispatcher's business.

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

use super::{now, Engine};
use crate::db::entities::notification;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    PostPublished,
    ClassComment,
    PrivateComment,
    SubmissionTurnedIn,
    SubmissionGraded,
    MemberJoined,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PostPublished => "post_published",
            Event::ClassComment => "class_comment",
            Event::PrivateComment => "private_comment",
            Event::SubmissionTurnedIn => "submission_turned_in",
            Event::SubmissionGraded => "submission_graded",
            Event::MemberJoined => "member_joined",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Post,
    Comment,
    PrivateComment,
    Submission,
    Membership,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Post => "post",
            ResourceKind::Comment => "comment",
            ResourceKind::PrivateComment => "private_comment",
            ResourceKind::Submission => "submission",
            ResourceKind::Membership => "membership",
        }
    }
}

/// The entity a notification points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i32,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: i32) -> Self {
        Self { kind, id }
    }
}

#[derive(Clone, Debug)]
pub struct Notice {
    pub event: Event,
    pub classroom_id: i32,
    pub actor_id: i32,
    pub recipients: Vec<i32>,
    pub resource: ResourceRef,
    pub summary: String,
    pub link: String,
}

/// Fan-out of notices to connected clients
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notice: &Notice) -> Result<()>;

    /// The notifications for `resources` were deleted
    async fn retract(&self, resources: &[ResourceRef]) -> Result<()>;
}

/// Dispatcher that only logs; used when no real-time transport is attached
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notice: &Notice) -> Result<()> {
        tracing::debug!(
            "notice {} for {} recipient(s) on {} {}",
            notice.event.as_str(),
            notice.recipients.len(),
            notice.resource.kind.as_str(),
            notice.resource.id
        );
        Ok(())
    }

    async fn retract(&self, resources: &[ResourceRef]) -> Result<()> {
        tracing::debug!("retracted notices for {} resource(s)", resources.len());
        Ok(())
    }
}

pub(crate) fn post_link(classroom_id: i32, post_id: i32) -> String {
    format!("/classrooms/{}/posts/{}", classroom_id, post_id)
}

impl Engine {
    /// Persist one row per recipient, then hand the notice to the dispatcher.
    ///
    /// The actor is never notified of their own action. Failures here are
    /// logged; they never undo the write that triggered the notice.
    pub(crate) async fn notify(&self, mut notice: Notice) {
        let actor_id = notice.actor_id;
        notice.recipients.retain(|id| *id != actor_id);
        notice.recipients.sort_unstable();
        notice.recipients.dedup();
        if notice.recipients.is_empty() {
            return;
        }

        let created_at = now();
        let rows = notice.recipients.iter().map(|recipient| notification::ActiveModel {
            recipient_id: Set(*recipient),
            actor_id: Set(notice.actor_id),
            classroom_id: Set(notice.classroom_id),
            event: Set(notice.event.as_str().to_string()),
            resource_kind: Set(notice.resource.kind.as_str().to_string()),
            resource_id: Set(notice.resource.id),
            summary: Set(notice.summary.clone()),
            link: Set(notice.link.clone()),
            is_read: Set(false),
            created_at: Set(created_at),
            ..Default::default()
        });

        if let Err(e) = notification::Entity::insert_many(rows).exec(&self.db).await {
            tracing::warn!("failed to record {} notice: {}", notice.event.as_str(), e);
            return;
        }

        if let Err(e) = self.dispatcher.dispatch(&notice).await {
            tracing::warn!("failed to dispatch {} notice: {}", notice.event.as_str(), e);
        }
    }

    /// Delete every notification row keyed to one of `resources`
    pub(crate) async fn purge_notifications(&self, resources: &[ResourceRef]) -> Result<u64> {
        if resources.is_empty() {
            return Ok(0);
        }

        let mut by_kind: HashMap<ResourceKind, Vec<i32>> = HashMap::new();
        for resource in resources {
            by_kind.entry(resource.kind).or_default().push(resource.id);
        }

        let mut deleted = 0;
        for (kind, ids) in by_kind {
            deleted += notification::Entity::delete_many()
                .filter(notification::Column::ResourceKind.eq(kind.as_str()))
                .filter(notification::Column::ResourceId.is_in(ids))
                .exec(&self.db)
                .await?
                .rows_affected;
        }

        if let Err(e) = self.dispatcher.retract(resources).await {
            tracing::warn!("failed to retract notices: {}", e);
        }

        Ok(deleted)
    }
}
