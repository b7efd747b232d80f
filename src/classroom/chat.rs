//! Classroom chat.

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set};

use super::comments::MessageDraft;
use super::{from_json_list, now, to_json_list, Actor, Engine, Outcome};
use crate::db::entities::chat_message;
use crate::error::{ClassroomError, Result};
use crate::storage::buckets;

impl Engine {
    pub async fn send_chat_message(&self, actor: &Actor, classroom_id: i32, draft: MessageDraft) -> Result<Outcome> {
        if !actor.can_author() {
            return Err(ClassroomError::rejected("admins cannot chat"));
        }

        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) && !self.is_member(room.id, actor.id).await? {
            return Err(ClassroomError::denied("not a member of this class"));
        }

        let (body, files, links) = draft.checked()?;
        let files = self.files.upload_all(buckets::CHAT, room.id, files).await;

        let saved = chat_message::ActiveModel {
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
            self.files.discard(buckets::CHAT, &files).await;
        }
        let saved = saved?;

        tracing::debug!("chat message {} sent to classroom {}", saved.id, room.id);
        Ok(Outcome::Created(saved.id))
    }

    pub async fn delete_chat_message(&self, actor: &Actor, message_id: i32) -> Result<Outcome> {
        let message = chat_message::Entity::find_by_id(message_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ClassroomError::not_found(format!("Chat message {}", message_id)))?;
        let room = self.load_classroom(message.classroom_id).await?;
        if message.author_id != actor.id && !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the author or the teacher can delete this message"));
        }

        self.files
            .remove(buckets::CHAT, &from_json_list::<String>(&message.attachments))
            .await;
        message.delete(&self.db).await?;
        Ok(Outcome::Deleted)
    }

    /// Chat history, oldest first
    pub async fn chat_messages(&self, actor: &Actor, classroom_id: i32) -> Result<Vec<chat_message::Model>> {
        let room = self.load_classroom(classroom_id).await?;
        if !room.is_owner(actor.id) && !self.is_member(room.id, actor.id).await? {
            return Err(ClassroomError::denied("not a member of this class"));
        }

        Ok(chat_message::Entity::find()
            .filter(chat_message::Column::ClassroomId.eq(room.id))
            .order_by_asc(chat_message::Column::CreatedAt)
            .order_by_asc(chat_message::Column::Id)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::Upload;
    use crate::test_support::{admin, alice, bob, carol, teacher, Harness};

    #[tokio::test]
    async fn test_chat_send_and_delete() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;

        let id = h
            .engine
            .send_chat_message(
                &alice(),
                room.id,
                MessageDraft::text("hello all").with_files(vec![Upload::new("meme.png", "png")]),
            )
            .await
            .unwrap()
            .created_id()
            .unwrap();

        for outsider in [admin(), carol()] {
            assert!(h
                .engine
                .send_chat_message(&outsider, room.id, MessageDraft::text("hi"))
                .await
                .is_err());
        }

        let history = h.engine.chat_messages(&bob(), room.id).await.unwrap();
        assert_eq!(history.len(), 1);
        let url = from_json_list::<String>(&history[0].attachments).remove(0);
        assert!(h.object_exists(buckets::CHAT, &url).await);

        let err = h.engine.delete_chat_message(&bob(), id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));

        assert_eq!(h.engine.delete_chat_message(&alice(), id).await.unwrap(), Outcome::Deleted);
        assert!(!h.object_exists(buckets::CHAT, &url).await);
        assert!(h.engine.chat_messages(&teacher(), room.id).await.unwrap().is_empty());
    }
}
