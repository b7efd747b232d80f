//! Deletion of classrooms, memberships, posts and topics.
//!
//! Dependents always go before the row they reference, and stored files go
//! before the row that lists them. Steps run one after another; storage
//! failures are logged and left behind as debt while the rows still go.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter};

use super::notify::{ResourceKind, ResourceRef};
use super::{from_json_list, Actor, Engine, Outcome};
use crate::db::entities::{chat_message, comment, membership, notification, post, private_comment, submission, topic};
use crate::error::{ClassroomError, Result};
use crate::storage::buckets;

impl Engine {
    /// Remove the stored files listed by `attachment_columns`
    async fn remove_listed_files<'a>(&self, bucket: &str, attachment_columns: impl IntoIterator<Item = &'a String>) {
        let urls: Vec<String> = attachment_columns
            .into_iter()
            .flat_map(|raw| from_json_list::<String>(raw))
            .collect();
        if !urls.is_empty() {
            self.files.remove(bucket, &urls).await;
        }
    }

    /// Delete a post with its comments, private comments, submissions,
    /// notifications and files
    pub(crate) async fn purge_post(&self, post: &post::Model) -> Result<()> {
        let mut resources = vec![ResourceRef::new(ResourceKind::Post, post.id)];

        let comments = comment::Entity::find()
            .filter(comment::Column::PostId.eq(post.id))
            .all(&self.db)
            .await?;
        self.remove_listed_files(buckets::COMMENTS, comments.iter().map(|c| &c.attachments))
            .await;
        comment::Entity::delete_many()
            .filter(comment::Column::PostId.eq(post.id))
            .exec(&self.db)
            .await?;
        resources.extend(comments.iter().map(|c| ResourceRef::new(ResourceKind::Comment, c.id)));

        let private = private_comment::Entity::find()
            .filter(private_comment::Column::PostId.eq(post.id))
            .all(&self.db)
            .await?;
        self.remove_listed_files(buckets::COMMENTS, private.iter().map(|c| &c.attachments))
            .await;
        private_comment::Entity::delete_many()
            .filter(private_comment::Column::PostId.eq(post.id))
            .exec(&self.db)
            .await?;
        resources.extend(
            private
                .iter()
                .map(|c| ResourceRef::new(ResourceKind::PrivateComment, c.id)),
        );

        let submissions = submission::Entity::find()
            .filter(submission::Column::PostId.eq(post.id))
            .all(&self.db)
            .await?;
        self.remove_listed_files(buckets::SUBMISSIONS, submissions.iter().map(|s| &s.attachments))
            .await;
        submission::Entity::delete_many()
            .filter(submission::Column::PostId.eq(post.id))
            .exec(&self.db)
            .await?;
        resources.extend(
            submissions
                .iter()
                .map(|s| ResourceRef::new(ResourceKind::Submission, s.id)),
        );

        let notifications = self.purge_notifications(&resources).await?;

        self.remove_listed_files(buckets::POSTS, [&post.attachments]).await;
        post::Entity::delete_by_id(post.id).exec(&self.db).await?;

        tracing::debug!(
            "purged post {}: {} comment(s), {} private comment(s), {} submission(s), {} notification(s)",
            post.id,
            comments.len(),
            private.len(),
            submissions.len(),
            notifications
        );
        Ok(())
    }

    /// Delete a membership together with the member's submissions in that
    /// classroom and the notifications about them
    async fn purge_membership(&self, membership: membership::Model) -> Result<()> {
        let submissions = submission::Entity::find()
            .filter(submission::Column::ClassroomId.eq(membership.classroom_id))
            .filter(submission::Column::UserId.eq(membership.user_id))
            .all(&self.db)
            .await?;
        self.remove_listed_files(buckets::SUBMISSIONS, submissions.iter().map(|s| &s.attachments))
            .await;
        submission::Entity::delete_many()
            .filter(submission::Column::ClassroomId.eq(membership.classroom_id))
            .filter(submission::Column::UserId.eq(membership.user_id))
            .exec(&self.db)
            .await?;

        let mut resources: Vec<ResourceRef> = submissions
            .iter()
            .map(|s| ResourceRef::new(ResourceKind::Submission, s.id))
            .collect();
        resources.push(ResourceRef::new(ResourceKind::Membership, membership.id));

        let (classroom_id, user_id) = (membership.classroom_id, membership.user_id);
        membership.delete(&self.db).await?;
        self.purge_notifications(&resources).await?;

        // The member no longer has any business with this classroom's inbox
        notification::Entity::delete_many()
            .filter(notification::Column::ClassroomId.eq(classroom_id))
            .filter(notification::Column::RecipientId.eq(user_id))
            .exec(&self.db)
            .await?;

        tracing::debug!(
            "removed user {} from classroom {} with {} submission(s)",
            user_id,
            classroom_id,
            submissions.len()
        );
        Ok(())
    }

    /// Leave a classroom, or remove a member from it as its owner
    pub async fn remove_member(&self, actor: &Actor, classroom_id: i32, user_id: i32) -> Result<Outcome> {
        let room = self.load_classroom(classroom_id).await?;
        if actor.id != user_id && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can remove other members"));
        }

        let membership = self
            .find_membership(room.id, user_id)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Membership of user {} in classroom {}", user_id, room.id)))?;

        self.purge_membership(membership).await?;
        tracing::info!("user {} left classroom {} (by user {})", user_id, room.id, actor.id);
        Ok(Outcome::Deleted)
    }

    /// Delete a classroom and everything in it
    pub async fn delete_classroom(&self, actor: &Actor, classroom_id: i32) -> Result<Outcome> {
        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can delete this class"));
        }

        let memberships = membership::Entity::find()
            .filter(membership::Column::ClassroomId.eq(room.id))
            .all(&self.db)
            .await?;
        let member_count = memberships.len();
        for membership in memberships {
            self.purge_membership(membership).await?;
        }

        let messages = chat_message::Entity::find()
            .filter(chat_message::Column::ClassroomId.eq(room.id))
            .all(&self.db)
            .await?;
        self.remove_listed_files(buckets::CHAT, messages.iter().map(|m| &m.attachments))
            .await;
        chat_message::Entity::delete_many()
            .filter(chat_message::Column::ClassroomId.eq(room.id))
            .exec(&self.db)
            .await?;

        let posts = post::Entity::find()
            .filter(post::Column::ClassroomId.eq(room.id))
            .all(&self.db)
            .await?;
        for post in &posts {
            self.purge_post(post).await?;
        }

        topic::Entity::delete_many()
            .filter(topic::Column::ClassroomId.eq(room.id))
            .exec(&self.db)
            .await?;

        let stray_notifications = notification::Entity::delete_many()
            .filter(notification::Column::ClassroomId.eq(room.id))
            .exec(&self.db)
            .await?
            .rows_affected;
        let swept = self.files.sweep_classroom(room.id).await;

        room.delete(&self.db).await?;

        tracing::info!(
            "classroom {} deleted: {} member(s), {} post(s), {} chat message(s), {} stray notification(s), {} swept object(s)",
            classroom_id,
            member_count,
            posts.len(),
            messages.len(),
            stray_notifications,
            swept
        );
        Ok(Outcome::Deleted)
    }

    /// Delete a topic; its posts stay, detached from it
    pub async fn delete_topic(&self, actor: &Actor, topic_id: i32) -> Result<Outcome> {
        let found = self.load_topic(topic_id).await?;
        let room = self.load_classroom(found.classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can manage topics"));
        }

        let detached = post::Entity::update_many()
            .col_expr(post::Column::TopicId, Expr::value(Option::<i32>::None))
            .col_expr(post::Column::TopicName, Expr::value(Option::<String>::None))
            .filter(post::Column::TopicId.eq(topic_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        found.delete(&self.db).await?;

        tracing::info!("topic {} deleted, {} post(s) detached", topic_id, detached);
        Ok(Outcome::Deleted)
    }
}
