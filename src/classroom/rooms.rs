//! Classrooms, memberships and topics.

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use super::notify::{Event, Notice, ResourceKind, ResourceRef};
use super::{now, Actor, Engine, Outcome, Role};
use crate::db::entities::{classroom, membership, post, topic};
use crate::error::{ClassroomError, Result};

const JOIN_CODE_LEN: usize = 7;
const JOIN_CODE_ATTEMPTS: usize = 5;
const DEFAULT_CARD_COLOR: &str = "#1e88e5";

/// Desired settings of a classroom
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassroomDraft {
    pub name: String,
    pub subject: Option<String>,
    pub section: Option<String>,
    pub card_color: Option<String>,
    pub card_banner: Option<String>,
    pub allow_member_posts: bool,
    pub allow_member_comments: bool,
}

impl ClassroomDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_member_comments: true,
            ..Default::default()
        }
    }

    /// The draft that would leave `room` as it is
    pub fn from_model(room: &classroom::Model) -> Self {
        Self {
            name: room.name.clone(),
            subject: room.subject.clone(),
            section: room.section.clone(),
            card_color: Some(room.card_color.clone()),
            card_banner: room.card_banner.clone(),
            allow_member_posts: room.allow_member_posts,
            allow_member_comments: room.allow_member_comments,
        }
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required_name(name: &str, what: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClassroomError::invalid(format!("{} name cannot be empty", what)));
    }
    Ok(name.to_string())
}

fn generate_join_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..JOIN_CODE_LEN].to_ascii_uppercase()
}

impl Engine {
    async fn unused_join_code(&self) -> Result<String> {
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = generate_join_code();
            let taken = classroom::Entity::find()
                .filter(classroom::Column::JoinCode.eq(code.as_str()))
                .one(&self.db)
                .await?
                .is_some();
            if !taken {
                return Ok(code);
            }
        }
        Err(ClassroomError::Internal("could not allocate a join code".into()))
    }

    /// Open a classroom owned by `actor`
    pub async fn create_classroom(&self, actor: &Actor, draft: ClassroomDraft) -> Result<Outcome> {
        if actor.role != Role::Teacher {
            return Err(ClassroomError::rejected("only teachers can create classes"));
        }

        let name = required_name(&draft.name, "class")?;
        let created_at = now();
        let saved = classroom::ActiveModel {
            name: Set(name),
            subject: Set(optional(draft.subject)),
            section: Set(optional(draft.section)),
            teacher_id: Set(actor.id),
            teacher_name: Set(actor.name.clone()),
            join_code: Set(self.unused_join_code().await?),
            card_color: Set(optional(draft.card_color).unwrap_or_else(|| DEFAULT_CARD_COLOR.to_string())),
            card_banner: Set(optional(draft.card_banner)),
            allow_member_posts: Set(draft.allow_member_posts),
            allow_member_comments: Set(draft.allow_member_comments),
            created_at: Set(created_at),
            updated_at: Set(created_at),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("classroom {} '{}' created by user {}", saved.id, saved.name, actor.id);
        Ok(Outcome::Created(saved.id))
    }

    /// Change classroom settings and refresh the copies held by memberships
    pub async fn update_classroom(&self, actor: &Actor, classroom_id: i32, draft: ClassroomDraft) -> Result<Outcome> {
        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can change class settings"));
        }

        let wanted = ClassroomDraft {
            name: required_name(&draft.name, "class")?,
            subject: optional(draft.subject),
            section: optional(draft.section),
            card_color: Some(optional(draft.card_color).unwrap_or_else(|| room.card_color.clone())),
            card_banner: optional(draft.card_banner),
            allow_member_posts: draft.allow_member_posts,
            allow_member_comments: draft.allow_member_comments,
        };
        if wanted == ClassroomDraft::from_model(&room) {
            tracing::debug!("classroom {} update carries no changes", classroom_id);
            return Ok(Outcome::Unchanged);
        }

        let card_color = wanted.card_color.unwrap_or_default();
        let mut active: classroom::ActiveModel = room.into();
        active.name = Set(wanted.name.clone());
        active.subject = Set(wanted.subject.clone());
        active.section = Set(wanted.section.clone());
        active.card_color = Set(card_color.clone());
        active.card_banner = Set(wanted.card_banner);
        active.allow_member_posts = Set(wanted.allow_member_posts);
        active.allow_member_comments = Set(wanted.allow_member_comments);
        active.updated_at = Set(now());
        active.update(&self.db).await?;

        let refreshed = membership::Entity::update_many()
            .col_expr(membership::Column::ClassName, Expr::value(wanted.name))
            .col_expr(membership::Column::ClassSubject, Expr::value(wanted.subject))
            .col_expr(membership::Column::ClassSection, Expr::value(wanted.section))
            .col_expr(membership::Column::CardColor, Expr::value(card_color))
            .filter(membership::Column::ClassroomId.eq(classroom_id))
            .exec(&self.db)
            .await?;

        tracing::info!(
            "classroom {} updated, {} membership(s) refreshed",
            classroom_id,
            refreshed.rows_affected
        );
        Ok(Outcome::Updated)
    }

    /// Join the classroom whose join code is `code`
    pub async fn join_classroom(&self, actor: &Actor, code: &str) -> Result<Outcome> {
        if actor.role == Role::Admin {
            return Err(ClassroomError::rejected("admins cannot join classes"));
        }

        let code = code.trim().to_ascii_uppercase();
        let room = classroom::Entity::find()
            .filter(classroom::Column::JoinCode.eq(code.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::rejected(format!("no class uses the code {}", code)))?;

        if room.is_owner(actor.id) {
            return Err(ClassroomError::rejected("you already teach this class"));
        }
        if self.is_member(room.id, actor.id).await? {
            return Err(ClassroomError::rejected("you are already in this class"));
        }

        let saved = membership::ActiveModel {
            classroom_id: Set(room.id),
            user_id: Set(actor.id),
            user_name: Set(actor.name.clone()),
            class_name: Set(room.name.clone()),
            class_subject: Set(room.subject.clone()),
            class_section: Set(room.section.clone()),
            teacher_name: Set(room.teacher_name.clone()),
            card_color: Set(room.card_color.clone()),
            joined_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("user {} joined classroom {}", actor.id, room.id);

        self.notify(Notice {
            event: Event::MemberJoined,
            classroom_id: room.id,
            actor_id: actor.id,
            recipients: vec![room.teacher_id],
            resource: ResourceRef::new(ResourceKind::Membership, saved.id),
            summary: format!("{} joined {}", actor.name, room.name),
            link: format!("/classrooms/{}/people", room.id),
        })
        .await;

        Ok(Outcome::Created(saved.id))
    }

    /// Classrooms `user_id` teaches or belongs to
    pub async fn classrooms_of(&self, user_id: i32) -> Result<Vec<classroom::Model>> {
        let joined: Vec<i32> = membership::Entity::find()
            .filter(membership::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.classroom_id)
            .collect();

        Ok(classroom::Entity::find()
            .filter(
                classroom::Column::TeacherId
                    .eq(user_id)
                    .or(classroom::Column::Id.is_in(joined)),
            )
            .order_by_asc(classroom::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn topic_name_taken(&self, classroom_id: i32, name: &str) -> Result<bool> {
        Ok(topic::Entity::find()
            .filter(topic::Column::ClassroomId.eq(classroom_id))
            .filter(topic::Column::Name.eq(name))
            .one(&self.db)
            .await?
            .is_some())
    }

    pub async fn create_topic(&self, actor: &Actor, classroom_id: i32, name: &str) -> Result<Outcome> {
        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can manage topics"));
        }

        let name = required_name(name, "topic")?;
        if self.topic_name_taken(room.id, &name).await? {
            return Err(ClassroomError::rejected(format!("topic '{}' already exists", name)));
        }

        let saved = topic::ActiveModel {
            classroom_id: Set(room.id),
            name: Set(name),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(Outcome::Created(saved.id))
    }

    /// Rename a topic; posts filed under it carry the new name
    pub async fn rename_topic(&self, actor: &Actor, topic_id: i32, name: &str) -> Result<Outcome> {
        let current = self.load_topic(topic_id).await?;
        let room = self.load_classroom(current.classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can manage topics"));
        }

        let name = required_name(name, "topic")?;
        if name == current.name {
            return Ok(Outcome::Unchanged);
        }
        if self.topic_name_taken(room.id, &name).await? {
            return Err(ClassroomError::rejected(format!("topic '{}' already exists", name)));
        }

        let mut active: topic::ActiveModel = current.into();
        active.name = Set(name.clone());
        active.update(&self.db).await?;

        post::Entity::update_many()
            .col_expr(post::Column::TopicName, Expr::value(name))
            .filter(post::Column::TopicId.eq(topic_id))
            .exec(&self.db)
            .await?;

        Ok(Outcome::Updated)
    }

    pub(crate) async fn load_topic(&self, topic_id: i32) -> Result<topic::Model> {
        topic::Entity::find_by_id(topic_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Topic {}", topic_id)))
    }

    pub async fn topics(&self, actor: &Actor, classroom_id: i32) -> Result<Vec<topic::Model>> {
        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) && !self.is_member(room.id, actor.id).await? {
            return Err(ClassroomError::denied("not a member of this class"));
        }
        Ok(topic::Entity::find()
            .filter(topic::Column::ClassroomId.eq(room.id))
            .order_by_asc(topic::Column::Id)
            .all(&self.db)
            .await?)
    }
}
