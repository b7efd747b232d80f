//! Database entities

pub mod chat_message;
pub mod classroom;
pub mod comment;
pub mod membership;
pub mod notification;
pub mod post;
pub mod private_comment;
pub mod submission;
pub mod topic;

pub use chat_message::Entity as ChatMessage;
pub use classroom::Entity as Classroom;
pub use comment::Entity as Comment;
pub use membership::Entity as Membership;
pub use notification::Entity as Notification;
pub use post::Entity as Post;
pub use private_comment::Entity as PrivateComment;
pub use submission::Entity as Submission;
pub use topic::Entity as Topic;
