//! Stream post entity.
//!
//! All five post kinds share this table; `kind` selects which of the
//! classwork columns are meaningful.

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub classroom_id: i32,
    pub author_id: i32,
    pub author_name: String,
    pub kind: String, // "announcement", "assignment", "quiz", "material", "question"
    pub caption: String,
    pub title: Option<String>,
    pub attachments: String, // JSON array of storage URLs
    pub links: String,       // JSON array of plain URLs
    pub audience: String,    // JSON array of user ids
    pub announce_to_all: bool,
    pub due_at: Option<i64>,
    pub scheduled_at: Option<i64>,
    pub is_graded: bool,
    pub total_points: Option<i32>,
    pub accept_submissions: bool,
    pub close_after_due: bool,
    pub topic_id: Option<i32>,
    pub topic_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::classroom::Entity",
        from = "Column::ClassroomId",
        to = "super::classroom::Column::Id"
    )]
    Classroom,
    #[sea_orm(
        belongs_to = "super::topic::Entity",
        from = "Column::TopicId",
        to = "super::topic::Column::Id"
    )]
    Topic,
    #[sea_orm(has_many = "super::comment::Entity")]
    Comments,
    #[sea_orm(has_many = "super::private_comment::Entity")]
    PrivateComments,
    #[sea_orm(has_many = "super::submission::Entity")]
    Submissions,
}

impl Related<super::classroom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Classroom.def()
    }
}

impl Related<super::topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Topic.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl Related<super::private_comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrivateComments.def()
    }
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
