//! Class comments and private comment threads.
//!
//! Comments are immutable once posted. A private thread belongs to one
//! (post, member) pair and only ever runs between that member and the owner.

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set};

use super::attachments::{normalize_links, Upload};
use super::audience;
use super::notify::{post_link, Event, Notice, ResourceKind, ResourceRef};
use super::{from_json_list, now, to_json_list, Actor, Engine, Outcome};
use crate::db::entities::{classroom, comment, post, private_comment};
use crate::error::{ClassroomError, Result};
use crate::storage::buckets;

/// Text plus attachments, as sent for a comment or chat message
#[derive(Clone, Debug, Default)]
pub struct MessageDraft {
    pub body: String,
    pub files: Vec<Upload>,
    pub links: Vec<String>,
}

impl MessageDraft {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<Upload>) -> Self {
        self.files = files;
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    /// Trimmed body and normalized links; refuses a message with no content
    pub(crate) fn checked(self) -> Result<(String, Vec<Upload>, Vec<String>)> {
        let body = self.body.trim().to_string();
        let links = normalize_links(self.links);
        if body.is_empty() && self.files.is_empty() && links.is_empty() {
            return Err(ClassroomError::invalid("message cannot be empty"));
        }
        Ok((body, self.files, links))
    }
}

fn summary_of(author: &str, body: &str) -> String {
    const PREVIEW: usize = 80;
    let preview: String = body.chars().take(PREVIEW).collect();
    format!("{}: {}", author, preview)
}

impl Engine {
    /// Load a post the actor may see, along with its classroom
    async fn viewable_post(&self, actor: &Actor, post_id: i32) -> Result<(classroom::Model, post::Model, bool)> {
        let post = self.load_post(post_id).await?;
        let room = self.load_classroom(post.classroom_id).await?;
        let is_member = self.is_member(room.id, actor.id).await?;
        if !room.is_owner(actor.id) && !is_member {
            return Err(ClassroomError::denied("not a member of this class"));
        }
        if !audience::can_view(&room, &post, actor.id, is_member, now()) {
            return Err(ClassroomError::rejected("this post is not shared with you"));
        }
        Ok((room, post, is_member))
    }

    pub async fn add_comment(&self, actor: &Actor, post_id: i32, draft: MessageDraft) -> Result<Outcome> {
        if !actor.can_author() {
            return Err(ClassroomError::rejected("admins cannot comment"));
        }

        let (room, post, _) = self.viewable_post(actor, post_id).await?;
        if !room.is_owner(actor.id) && !room.allow_member_comments {
            return Err(ClassroomError::rejected("the teacher has turned off class comments"));
        }

        let (body, files, links) = draft.checked()?;
        let files = self.files.upload_all(buckets::COMMENTS, room.id, files).await;

        let saved = comment::ActiveModel {
            post_id: Set(post.id),
            classroom_id: Set(room.id),
            author_id: Set(actor.id),
            author_name: Set(actor.name.clone()),
            author_avatar: Set(actor.avatar.clone()),
            body: Set(body),
            attachments: Set(to_json_list(&files)),
            links: Set(to_json_list(&links)),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await;
        if saved.is_err() {
            self.files.discard(buckets::COMMENTS, &files).await;
        }
        let saved = saved?;

        self.notify(Notice {
            event: Event::ClassComment,
            classroom_id: room.id,
            actor_id: actor.id,
            recipients: vec![room.teacher_id, post.author_id],
            resource: ResourceRef::new(ResourceKind::Comment, saved.id),
            summary: summary_of(&actor.name, &saved.body),
            link: post_link(room.id, post.id),
        })
        .await;

        Ok(Outcome::Created(saved.id))
    }

    /// Add to a private thread.
    ///
    /// A member always writes to the owner; the owner must name the member
    /// whose thread it is in `to_member`.
    pub async fn add_private_comment(
        &self,
        actor: &Actor,
        post_id: i32,
        to_member: Option<i32>,
        draft: MessageDraft,
    ) -> Result<Outcome> {
        if !actor.can_author() {
            return Err(ClassroomError::rejected("admins cannot comment"));
        }

        let (room, post, _) = self.viewable_post(actor, post_id).await?;
        let (member_id, to_user_id) = if room.is_owner(actor.id) {
            let member_id =
                to_member.ok_or_else(|| ClassroomError::invalid("a private reply must name its member"))?;
            let is_member = self.is_member(room.id, member_id).await?;
            if room.is_owner(member_id) || !audience::in_audience(&room, &post, member_id, is_member) {
                return Err(ClassroomError::rejected(format!("user {} is not assigned this post", member_id)));
            }
            (member_id, member_id)
        } else {
            (actor.id, room.teacher_id)
        };

        let (body, files, links) = draft.checked()?;
        let files = self.files.upload_all(buckets::COMMENTS, room.id, files).await;

        let saved = private_comment::ActiveModel {
            post_id: Set(post.id),
            classroom_id: Set(room.id),
            member_id: Set(member_id),
            author_id: Set(actor.id),
            author_name: Set(actor.name.clone()),
            author_avatar: Set(actor.avatar.clone()),
            to_user_id: Set(to_user_id),
            body: Set(body),
            attachments: Set(to_json_list(&files)),
            links: Set(to_json_list(&links)),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await;
        if saved.is_err() {
            self.files.discard(buckets::COMMENTS, &files).await;
        }
        let saved = saved?;

        self.notify(Notice {
            event: Event::PrivateComment,
            classroom_id: room.id,
            actor_id: actor.id,
            recipients: vec![to_user_id],
            resource: ResourceRef::new(ResourceKind::PrivateComment, saved.id),
            summary: summary_of(&actor.name, &saved.body),
            link: post_link(room.id, post.id),
        })
        .await;

        Ok(Outcome::Created(saved.id))
    }

    pub async fn delete_comment(&self, actor: &Actor, comment_id: i32) -> Result<Outcome> {
        let found = comment::Entity::find_by_id(comment_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Comment {}", comment_id)))?;
        let room = self.load_classroom(found.classroom_id).await?;
        if found.author_id != actor.id && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the author or the teacher can delete this comment"));
        }

        self.files
            .remove(buckets::COMMENTS, &from_json_list::<String>(&found.attachments))
            .await;
        self.purge_notifications(&[ResourceRef::new(ResourceKind::Comment, found.id)])
            .await?;
        found.delete(&self.db).await?;

        tracing::info!("comment {} deleted by user {}", comment_id, actor.id);
        Ok(Outcome::Deleted)
    }

    pub async fn delete_private_comment(&self, actor: &Actor, comment_id: i32) -> Result<Outcome> {
        let found = private_comment::Entity::find_by_id(comment_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Private comment {}", comment_id)))?;
        let room = self.load_classroom(found.classroom_id).await?;
        if found.author_id != actor.id && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the author or the teacher can delete this comment"));
        }

        self.files
            .remove(buckets::COMMENTS, &from_json_list::<String>(&found.attachments))
            .await;
        self.purge_notifications(&[ResourceRef::new(ResourceKind::PrivateComment, found.id)])
            .await?;
        found.delete(&self.db).await?;

        tracing::info!("private comment {} deleted by user {}", comment_id, actor.id);
        Ok(Outcome::Deleted)
    }

    /// Class comments on a post, oldest first
    pub async fn comments(&self, actor: &Actor, post_id: i32) -> Result<Vec<comment::Model>> {
        let (_, post, _) = self.viewable_post(actor, post_id).await?;
        Ok(comment::Entity::find()
            .filter(comment::Column::PostId.eq(post.id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// One member's private thread on a post
    pub async fn private_thread(
        &self,
        actor: &Actor,
        post_id: i32,
        member_id: i32,
    ) -> Result<Vec<private_comment::Model>> {
        let (room, post, _) = self.viewable_post(actor, post_id).await?;
        if !room.is_owner(actor.id) && actor.id != member_id {
            return Err(ClassroomError::denied("private threads are visible to their member and the teacher"));
        }

        Ok(private_comment::Entity::find()
            .filter(private_comment::Column::PostId.eq(post.id))
            .filter(private_comment::Column::MemberId.eq(member_id))
            .order_by_asc(private_comment::Column::CreatedAt)
            .order_by_asc(private_comment::Column::Id)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::audience::Audience;
    use crate::classroom::rooms::ClassroomDraft;
    use crate::classroom::stream::{PostDraft, PostKind};
    use crate::db::entities::notification;
    use crate::test_support::{admin, alice, bob, carol, teacher, Harness};

    async fn announcement(h: &Harness, room_id: i32, audience: Audience) -> i32 {
        h.engine
            .create_post(&teacher(), room_id, PostDraft::new(PostKind::Announcement, "Field trip").to(audience))
            .await
            .unwrap()
            .created_id()
            .unwrap()
    }

    #[tokio::test]
    async fn test_comment_policy() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;
        let post_id = announcement(&h, room.id, Audience::Only(vec![alice().id])).await;

        assert!(h.engine.add_comment(&alice(), post_id, MessageDraft::text("Yay")).await.is_ok());

        let err = h.engine.add_comment(&bob(), post_id, MessageDraft::text("me?")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));
        let err = h.engine.add_comment(&carol(), post_id, MessageDraft::text("hi")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));
        let err = h.engine.add_comment(&admin(), post_id, MessageDraft::text("hi")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));
        let err = h.engine.add_comment(&alice(), post_id, MessageDraft::text("  ")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::InvalidRequest(_)));

        h.engine
            .update_classroom(
                &teacher(),
                room.id,
                ClassroomDraft {
                    allow_member_comments: false,
                    ..ClassroomDraft::from_model(&room)
                },
            )
            .await
            .unwrap();
        let err = h.engine.add_comment(&alice(), post_id, MessageDraft::text("again")).await.unwrap_err();
        assert!(err.is_expected());
        assert!(h.engine.add_comment(&teacher(), post_id, MessageDraft::text("closed")).await.is_ok());

        assert_eq!(h.engine.comments(&alice(), post_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_insert_discards_uploads() {
        use sea_orm::ConnectionTrait;

        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice()]).await;
        let post_id = announcement(&h, room.id, Audience::All).await;
        h.engine
            .db()
            .execute_unprepared(
                "CREATE TRIGGER comments_frozen BEFORE INSERT ON comments \
                 BEGIN SELECT RAISE(ABORT, 'frozen'); END",
            )
            .await
            .unwrap();

        let draft = MessageDraft::text("see attached").with_files(vec![Upload::new("photo.png", "p")]);
        let err = h.engine.add_comment(&alice(), post_id, draft).await.unwrap_err();

        assert!(matches!(err, ClassroomError::Database(_)));
        assert_eq!(h.stored_objects(room.id).await, 0);
    }

    #[tokio::test]
    async fn test_private_threads_run_between_member_and_owner() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;
        let post_id = announcement(&h, room.id, Audience::All).await;

        // The target argument means nothing coming from a member
        let id = h
            .engine
            .add_private_comment(&alice(), post_id, Some(bob().id), MessageDraft::text("question"))
            .await
            .unwrap()
            .created_id()
            .unwrap();
        let reply = h
            .engine
            .add_private_comment(&teacher(), post_id, Some(alice().id), MessageDraft::text("answer"))
            .await
            .unwrap()
            .created_id()
            .unwrap();

        let thread = h.engine.private_thread(&teacher(), post_id, alice().id).await.unwrap();
        assert_eq!(thread.iter().map(|c| c.id).collect::<Vec<_>>(), vec![id, reply]);
        assert_eq!(thread[0].member_id, alice().id);
        assert_eq!(thread[0].to_user_id, teacher().id);
        assert_eq!(thread[1].to_user_id, alice().id);

        assert!(h.engine.private_thread(&bob(), post_id, bob().id).await.unwrap().is_empty());
        let err = h.engine.private_thread(&bob(), post_id, alice().id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));

        let err = h
            .engine
            .add_private_comment(&teacher(), post_id, None, MessageDraft::text("to whom?"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::InvalidRequest(_)));
        let err = h
            .engine
            .add_private_comment(&teacher(), post_id, Some(carol().id), MessageDraft::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_files_then_notifications_then_row() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;
        let post_id = announcement(&h, room.id, Audience::All).await;

        let id = h
            .engine
            .add_comment(
                &alice(),
                post_id,
                MessageDraft::text("see attached").with_files(vec![Upload::new("photo.jpg", "jpg")]),
            )
            .await
            .unwrap()
            .created_id()
            .unwrap();
        let url = from_json_list::<String>(&h.engine.comments(&alice(), post_id).await.unwrap()[0].attachments)
            .remove(0);
        assert!(h.object_exists(buckets::COMMENTS, &url).await);

        let err = h.engine.delete_comment(&bob(), id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));

        assert_eq!(h.engine.delete_comment(&teacher(), id).await.unwrap(), Outcome::Deleted);
        assert!(!h.object_exists(buckets::COMMENTS, &url).await);
        assert!(h.engine.comments(&alice(), post_id).await.unwrap().is_empty());
        let leftover = notification::Entity::find()
            .filter(notification::Column::ResourceKind.eq(ResourceKind::Comment.as_str()))
            .all(h.engine.db())
            .await
            .unwrap();
        assert!(leftover.is_empty());

        let err = h.engine.delete_comment(&teacher(), id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_private_comment_deletion() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice()]).await;
        let post_id = announcement(&h, room.id, Audience::All).await;
        let id = h
            .engine
            .add_private_comment(&alice(), post_id, None, MessageDraft::text("psst"))
            .await
            .unwrap()
            .created_id()
            .unwrap();

        assert_eq!(h.engine.delete_private_comment(&alice(), id).await.unwrap(), Outcome::Deleted);
        assert!(h.engine.private_thread(&alice(), post_id, alice().id).await.unwrap().is_empty());
        assert_eq!(h.retracted().last(), Some(&ResourceRef::new(ResourceKind::PrivateComment, id)));
    }
}
