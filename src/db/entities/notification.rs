//! Notification entity.
//!
//! Rows point at the entity that produced them through
//! (`resource_kind`, `resource_id`); there is no foreign key because the
//! target table depends on the kind.

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub recipient_id: i32,
    pub actor_id: i32,
    pub classroom_id: i32,
    pub event: String,
    pub resource_kind: String,
    pub resource_id: i32,
    pub summary: String,
    pub link: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
