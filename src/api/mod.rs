pub mod form;
pub mod handlers;
pub mod session;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub use handlers::{ActionResponse, AppState};

/// Classroom JSON/multipart API plus attachment downloads
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Classrooms and membership
        .route("/api/classrooms", get(handlers::list_classrooms).post(handlers::create_classroom))
        .route("/api/classrooms/join", post(handlers::join_classroom))
        .route(
            "/api/classrooms/:id",
            put(handlers::update_classroom).delete(handlers::delete_classroom),
        )
        .route("/api/classrooms/:id/members/:user_id", delete(handlers::remove_member))
        // Topics
        .route(
            "/api/classrooms/:id/topics",
            get(handlers::list_topics).post(handlers::create_topic),
        )
        .route("/api/topics/:id", put(handlers::rename_topic).delete(handlers::delete_topic))
        // Stream
        .route(
            "/api/classrooms/:id/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route("/api/posts/:id", put(handlers::update_post).delete(handlers::delete_post))
        // Classwork
        .route("/api/posts/:id/submissions", get(handlers::list_submissions))
        .route("/api/posts/:id/submission", post(handlers::submit).delete(handlers::unsubmit))
        .route("/api/posts/:id/grades/:member_id", put(handlers::grade))
        // Comments
        .route(
            "/api/posts/:id/comments",
            get(handlers::list_comments).post(handlers::add_comment),
        )
        .route("/api/comments/:id", delete(handlers::delete_comment))
        .route("/api/posts/:id/private", post(handlers::add_private_comment))
        .route("/api/posts/:id/private/:member_id", get(handlers::private_thread))
        .route("/api/private-comments/:id", delete(handlers::delete_private_comment))
        // Chat
        .route("/api/classrooms/:id/chat", get(handlers::list_chat).post(handlers::send_chat))
        .route("/api/chat/:id", delete(handlers::delete_chat))
        // Attachments
        .route("/files/:bucket/*key", get(handlers::download))
        .route("/health", get(handlers::health))
}
