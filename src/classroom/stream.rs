//! Stream posts: create, conditional update, delete.

use std::collections::HashSet;
use std::str::FromStr;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use super::attachments::{normalize_links, Upload};
use super::audience::{self, Audience};
use super::notify::{post_link, Event, Notice, ResourceKind, ResourceRef};
use super::schedule::{self, LocalTime};
use super::{from_json_list, now, to_json_list, Actor, Engine, Outcome};
use crate::db::entities::{classroom, post, topic};
use crate::error::{ClassroomError, Result};
use crate::storage::buckets;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostKind {
    Announcement,
    Assignment,
    Quiz,
    Material,
    Question,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Announcement => "announcement",
            PostKind::Assignment => "assignment",
            PostKind::Quiz => "quiz",
            PostKind::Material => "material",
            PostKind::Question => "question",
        }
    }

    pub fn requires_title(&self) -> bool {
        *self != PostKind::Announcement
    }

    /// Kinds that carry due dates, points and submissions
    pub fn is_gradeable(&self) -> bool {
        matches!(self, PostKind::Assignment | PostKind::Quiz | PostKind::Question)
    }
}

impl FromStr for PostKind {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "announcement" => Ok(PostKind::Announcement),
            "assignment" => Ok(PostKind::Assignment),
            "quiz" => Ok(PostKind::Quiz),
            "material" => Ok(PostKind::Material),
            "question" => Ok(PostKind::Question),
            _ => Err(ClassroomError::invalid(format!("unknown post kind '{}'", s))),
        }
    }
}

/// Settings only gradeable kinds carry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classwork {
    pub due: Option<LocalTime>,
    /// `Some` marks the post as graded out of this many points
    pub total_points: Option<i32>,
    pub accept_submissions: bool,
    pub close_after_due: bool,
}

impl Default for Classwork {
    fn default() -> Self {
        Self {
            due: None,
            total_points: None,
            accept_submissions: true,
            close_after_due: false,
        }
    }
}

/// Desired state of a post as submitted by its author
#[derive(Clone, Debug)]
pub struct PostDraft {
    pub kind: PostKind,
    pub caption: String,
    pub title: Option<String>,
    pub audience: Audience,
    pub links: Vec<String>,
    pub files: Vec<Upload>,
    /// `None` is the "no topic" choice
    pub topic_id: Option<i32>,
    pub scheduled: Option<LocalTime>,
    pub classwork: Option<Classwork>,
}

impl PostDraft {
    pub fn new(kind: PostKind, caption: impl Into<String>) -> Self {
        Self {
            kind,
            caption: caption.into(),
            title: None,
            audience: Audience::All,
            links: Vec::new(),
            files: Vec::new(),
            topic_id: None,
            scheduled: None,
            classwork: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn to(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_classwork(mut self, classwork: Classwork) -> Self {
        self.classwork = Some(classwork);
        self
    }

    pub fn with_topic(mut self, topic_id: i32) -> Self {
        self.topic_id = Some(topic_id);
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    pub fn with_files(mut self, files: Vec<Upload>) -> Self {
        self.files = files;
        self
    }

    pub fn scheduled_for(mut self, at: LocalTime) -> Self {
        self.scheduled = Some(at);
        self
    }
}

/// The comparable, storage-ready form of every mutable column but attachments
#[derive(Clone, Debug, PartialEq, Eq)]
struct PostFields {
    caption: String,
    title: Option<String>,
    audience: Audience,
    links: Vec<String>,
    due_at: Option<i64>,
    scheduled_at: Option<i64>,
    is_graded: bool,
    total_points: Option<i32>,
    accept_submissions: bool,
    close_after_due: bool,
    topic_id: Option<i32>,
}

impl PostFields {
    fn from_model(post: &post::Model) -> Self {
        Self {
            caption: post.caption.clone(),
            title: post.title.clone(),
            audience: Audience::of(post),
            links: from_json_list(&post.links),
            due_at: post.due_at,
            scheduled_at: post.scheduled_at,
            is_graded: post.is_graded,
            total_points: post.total_points,
            accept_submissions: post.accept_submissions,
            close_after_due: post.close_after_due,
            topic_id: post.topic_id,
        }
    }
}

/// Kind-aware shape check, independent of any stored state
fn check_draft(draft: &PostDraft) -> Result<()> {
    let kind = draft.kind.as_str();
    let has_title = draft.title.as_deref().is_some_and(|t| !t.trim().is_empty());

    if draft.kind.requires_title() && !has_title {
        return Err(ClassroomError::invalid(format!("a {} needs a title", kind)));
    }
    if !draft.kind.requires_title() && has_title {
        return Err(ClassroomError::invalid("announcements do not take a title"));
    }
    if draft.kind == PostKind::Announcement
        && draft.caption.trim().is_empty()
        && draft.files.is_empty()
        && draft.links.iter().all(|l| l.trim().is_empty())
    {
        return Err(ClassroomError::invalid("an announcement cannot be empty"));
    }

    if let Some(work) = &draft.classwork {
        if !draft.kind.is_gradeable() {
            return Err(ClassroomError::invalid(format!("a {} has no due date, points or submissions", kind)));
        }
        if work.total_points.is_some_and(|p| p < 1) {
            return Err(ClassroomError::invalid("total points must be at least 1"));
        }
        if work.close_after_due && work.due.is_none() {
            return Err(ClassroomError::invalid("closing after the due date needs a due date"));
        }
    }

    Ok(())
}

impl Engine {
    pub(crate) async fn load_post(&self, post_id: i32) -> Result<post::Model> {
        post::Entity::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Post {}", post_id)))
    }

    async fn resolve_topic(&self, classroom_id: i32, topic_id: Option<i32>) -> Result<Option<topic::Model>> {
        let Some(id) = topic_id else {
            return Ok(None);
        };
        topic::Entity::find_by_id(id)
            .filter(topic::Column::ClassroomId.eq(classroom_id))
            .one(&self.db)
            .await?
            .map(Some)
            .ok_or_else(|| ClassroomError::invalid(format!("topic {} does not exist in this class", id)))
    }

    /// Validate a draft and bring it into storage form.
    ///
    /// Audience ids not already addressed by `previous` must be members.
    async fn resolve_fields(
        &self,
        room: &classroom::Model,
        draft: &PostDraft,
        previous: &Audience,
    ) -> Result<(PostFields, Option<topic::Model>)> {
        check_draft(draft)?;

        let audience = draft.audience.clone().normalized();
        if let Audience::Only(ids) = &audience {
            let members: HashSet<i32> = self.member_ids(room.id).await?.into_iter().collect();
            if let Some(stranger) = ids
                .iter()
                .find(|id| !members.contains(*id) && !previous.explicit_ids().contains(*id))
            {
                return Err(ClassroomError::invalid(format!("user {} is not in this class", stranger)));
            }
        }

        let topic = self.resolve_topic(room.id, draft.topic_id).await?;
        let work = if draft.kind.is_gradeable() {
            draft.classwork.clone().unwrap_or_default()
        } else {
            Classwork {
                accept_submissions: false,
                ..Classwork::default()
            }
        };

        let fields = PostFields {
            caption: draft.caption.trim().to_string(),
            title: draft.title.as_ref().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            audience,
            links: normalize_links(draft.links.clone()),
            due_at: schedule::normalize(work.due)?,
            scheduled_at: schedule::normalize(draft.scheduled)?,
            is_graded: work.total_points.is_some(),
            total_points: work.total_points,
            accept_submissions: work.accept_submissions,
            close_after_due: work.close_after_due,
            topic_id: topic.as_ref().map(|t| t.id),
        };

        Ok((fields, topic))
    }

    /// Publish a new post to a classroom's stream
    pub async fn create_post(&self, actor: &Actor, classroom_id: i32, draft: PostDraft) -> Result<Outcome> {
        if !actor.can_author() {
            return Err(ClassroomError::rejected("admins cannot post to a class stream"));
        }

        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) {
            if !self.is_member(room.id, actor.id).await? {
                return Err(ClassroomError::denied("not a member of this class"));
            }
            if !room.allow_member_posts {
                return Err(ClassroomError::rejected("the teacher has turned off member posts"));
            }
            if draft.kind != PostKind::Announcement {
                return Err(ClassroomError::rejected("only the teacher can post classwork"));
            }
        }

        let (fields, topic) = self.resolve_fields(&room, &draft, &Audience::Only(Vec::new())).await?;
        let files = self.files.upload_all(buckets::POSTS, room.id, draft.files).await;
        let created_at = now();

        let saved = post::ActiveModel {
            classroom_id: Set(room.id),
            author_id: Set(actor.id),
            author_name: Set(actor.name.clone()),
            kind: Set(draft.kind.as_str().to_string()),
            caption: Set(fields.caption),
            title: Set(fields.title),
            attachments: Set(to_json_list(&files)),
            links: Set(to_json_list(&fields.links)),
            audience: Set(to_json_list(fields.audience.explicit_ids())),
            announce_to_all: Set(fields.audience.announce_to_all()),
            due_at: Set(fields.due_at),
            scheduled_at: Set(fields.scheduled_at),
            is_graded: Set(fields.is_graded),
            total_points: Set(fields.total_points),
            accept_submissions: Set(fields.accept_submissions),
            close_after_due: Set(fields.close_after_due),
            topic_id: Set(fields.topic_id),
            topic_name: Set(topic.map(|t| t.name)),
            created_at: Set(created_at),
            updated_at: Set(created_at),
            ..Default::default()
        }
        .insert(&self.db)
        .await;
        if saved.is_err() {
            self.files.discard(buckets::POSTS, &files).await;
        }
        let saved = saved?;

        tracing::info!(
            "{} {} created in classroom {} by user {}",
            saved.kind,
            saved.id,
            room.id,
            actor.id
        );

        if saved.scheduled_at.is_some_and(|at| at > created_at) {
            tracing::debug!("post {} is scheduled, publication notice deferred", saved.id);
        } else {
            let members = self.member_ids(room.id).await?;
            let headline = saved.title.clone().unwrap_or_else(|| saved.caption.clone());
            self.notify(Notice {
                event: Event::PostPublished,
                classroom_id: room.id,
                actor_id: actor.id,
                recipients: audience::recipients(&room, &saved, &members),
                resource: ResourceRef::new(ResourceKind::Post, saved.id),
                summary: format!("{} posted a new {}: {}", actor.name, saved.kind, headline),
                link: post_link(room.id, saved.id),
            })
            .await;
        }

        Ok(Outcome::Created(saved.id))
    }

    /// Replace a post's mutable state with `draft`.
    ///
    /// `kept` lists the existing attachment URLs to retain. When nothing
    /// differs the post is left untouched and `Unchanged` is returned.
    pub async fn update_post(
        &self,
        actor: &Actor,
        post_id: i32,
        draft: PostDraft,
        kept: Vec<String>,
    ) -> Result<Outcome> {
        let current = self.load_post(post_id).await?;
        if current.author_id != actor.id {
            return Err(ClassroomError::denied("only the author can edit this post"));
        }
        if current.kind.parse::<PostKind>().ok() != Some(draft.kind) {
            return Err(ClassroomError::invalid("a post cannot change kind"));
        }

        let room = self.load_classroom(current.classroom_id).await?;
        let previous_fields = PostFields::from_model(&current);
        let (fields, topic) = self
            .resolve_fields(&room, &draft, &previous_fields.audience)
            .await?;

        let previous_files: Vec<String> = from_json_list(&current.attachments);
        let previous_set: HashSet<&String> = previous_files.iter().collect();
        let kept_set: HashSet<&String> = kept.iter().filter(|u| previous_set.contains(u)).collect();
        let attachments_unchanged = draft.files.is_empty() && kept_set == previous_set;

        if attachments_unchanged && fields == previous_fields {
            tracing::debug!("post {} update carries no changes", post_id);
            return Ok(Outcome::Unchanged);
        }

        let plan = self
            .files
            .reconcile(
                buckets::POSTS,
                room.id,
                &previous_files,
                &kept,
                draft.files,
                fields.links.clone(),
            )
            .await;

        let mut active: post::ActiveModel = current.into();
        active.caption = Set(fields.caption);
        active.title = Set(fields.title);
        active.attachments = Set(to_json_list(&plan.set.files));
        active.links = Set(to_json_list(&plan.set.links));
        active.audience = Set(to_json_list(fields.audience.explicit_ids()));
        active.announce_to_all = Set(fields.audience.announce_to_all());
        active.due_at = Set(fields.due_at);
        active.scheduled_at = Set(fields.scheduled_at);
        active.is_graded = Set(fields.is_graded);
        active.total_points = Set(fields.total_points);
        active.accept_submissions = Set(fields.accept_submissions);
        active.close_after_due = Set(fields.close_after_due);
        active.topic_id = Set(fields.topic_id);
        active.topic_name = Set(topic.map(|t| t.name));
        active.updated_at = Set(now());
        let written = active.update(&self.db).await;
        self.files.settle(buckets::POSTS, &plan, written.is_ok()).await;
        written?;

        tracing::info!("post {} updated by user {}", post_id, actor.id);
        Ok(Outcome::Updated)
    }

    /// Delete a post and everything hanging off it
    pub async fn delete_post(&self, actor: &Actor, post_id: i32) -> Result<Outcome> {
        let post = self.load_post(post_id).await?;
        let room = self.load_classroom(post.classroom_id).await?;
        if post.author_id != actor.id && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the author or the teacher can delete this post"));
        }

        self.purge_post(&post).await?;
        tracing::info!("post {} deleted by user {}", post_id, actor.id);
        Ok(Outcome::Deleted)
    }

    /// Posts of a classroom the actor may see, newest first
    pub async fn visible_posts(&self, actor: &Actor, classroom_id: i32) -> Result<Vec<post::Model>> {
        let room = self.load_classroom(classroom_id).await?;
        let is_member = self.is_member(room.id, actor.id).await?;
        if !is_member && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("not a member of this class"));
        }

        let at = now();
        let posts = post::Entity::find()
            .filter(post::Column::ClassroomId.eq(room.id))
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .all(&self.db)
            .await?;

        Ok(posts
            .into_iter()
            .filter(|p| audience::can_view(&room, p, actor.id, is_member, at))
            .collect())
    }
}
