use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::form::Form;
use super::session::extract_actor;
use crate::classroom::rooms::ClassroomDraft;
use crate::classroom::{Engine, Outcome};
use crate::error::{ClassroomError, Result};
use crate::storage::{buckets, StorageError};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Engine,
}

/// Body of every mutation response
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
}

/// Expected failures become `success: false`; precondition violations keep
/// their error status.
fn action_response(result: Result<Outcome>) -> Response {
    match result {
        Ok(outcome) => Json(ActionResponse {
            success: true,
            message: outcome.message().to_string(),
            id: outcome.created_id(),
        })
        .into_response(),
        Err(e) if e.is_expected() => Json(ActionResponse {
            success: false,
            message: e.to_string(),
            id: None,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Create and update paths also report a missing target in the body
fn write_response(result: Result<Outcome>) -> Response {
    match result {
        Err(ClassroomError::NotFound(what)) => Json(ActionResponse {
            success: false,
            message: ClassroomError::NotFound(what).to_string(),
            id: None,
        })
        .into_response(),
        other => action_response(other),
    }
}

fn list_response<T: Serialize>(result: Result<Vec<T>>) -> Response {
    match result {
        Ok(items) => Json(items).into_response(),
        Err(e) => e.into_response(),
    }
}

macro_rules! actor_or_reject {
    ($headers:expr) => {
        match extract_actor(&$headers) {
            Ok(actor) => actor,
            Err(e) => return e.into_response(),
        }
    };
}

macro_rules! form_or_reject {
    ($multipart:expr) => {
        match Form::read($multipart).await {
            Ok(form) => form,
            Err(e) => return action_response(Err(e)),
        }
    };
}

#[derive(Debug, Deserialize)]
pub struct ClassroomRequest {
    pub name: String,
    pub subject: Option<String>,
    pub section: Option<String>,
    pub card_color: Option<String>,
    pub card_banner: Option<String>,
    #[serde(default)]
    pub allow_member_posts: bool,
    #[serde(default = "default_true")]
    pub allow_member_comments: bool,
}

fn default_true() -> bool {
    true
}

impl From<ClassroomRequest> for ClassroomDraft {
    fn from(req: ClassroomRequest) -> Self {
        ClassroomDraft {
            name: req.name,
            subject: req.subject,
            section: req.section,
            card_color: req.card_color,
            card_banner: req.card_banner,
            allow_member_posts: req.allow_member_posts,
            allow_member_comments: req.allow_member_comments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub points: i32,
}

/// GET /api/classrooms
pub async fn list_classrooms(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.classrooms_of(actor.id).await)
}

/// POST /api/classrooms
pub async fn create_classroom(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ClassroomRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.create_classroom(&actor, req.into()).await)
}

/// PUT /api/classrooms/:id
pub async fn update_classroom(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<ClassroomRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.update_classroom(&actor, classroom_id, req.into()).await)
}

/// DELETE /api/classrooms/:id
pub async fn delete_classroom(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_classroom(&actor, classroom_id).await)
}

/// POST /api/classrooms/join
pub async fn join_classroom(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<JoinRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.join_classroom(&actor, &req.code).await)
}

/// DELETE /api/classrooms/:id/members/:user_id
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((classroom_id, user_id)): Path<(i32, i32)>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.remove_member(&actor, classroom_id, user_id).await)
}

/// GET /api/classrooms/:id/topics
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.topics(&actor, classroom_id).await)
}

/// POST /api/classrooms/:id/topics
pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.create_topic(&actor, classroom_id, &req.name).await)
}

/// PUT /api/topics/:id
pub async fn rename_topic(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.rename_topic(&actor, topic_id, &req.name).await)
}

/// DELETE /api/topics/:id
pub async fn delete_topic(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_topic(&actor, topic_id).await)
}

/// GET /api/classrooms/:id/posts
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.visible_posts(&actor, classroom_id).await)
}

/// POST /api/classrooms/:id/posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    let result = match form.post_draft() {
        Ok(draft) => state.engine.create_post(&actor, classroom_id, draft).await,
        Err(e) => Err(e),
    };
    write_response(result)
}

/// PUT /api/posts/:id
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    let kept = form.kept();
    let result = match form.post_draft() {
        Ok(draft) => state.engine.update_post(&actor, post_id, draft, kept).await,
        Err(e) => Err(e),
    };
    write_response(result)
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_post(&actor, post_id).await)
}

/// GET /api/posts/:id/submissions
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.submissions(&actor, post_id).await)
}

/// POST /api/posts/:id/submission
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    let kept = form.kept();
    write_response(state.engine.submit(&actor, post_id, form.work(), kept).await)
}

/// DELETE /api/posts/:id/submission
pub async fn unsubmit(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.unsubmit(&actor, post_id).await)
}

/// PUT /api/posts/:id/grades/:member_id
pub async fn grade(
    State(state): State<Arc<AppState>>,
    Path((post_id, member_id)): Path<(i32, i32)>,
    headers: HeaderMap,
    Json(req): Json<GradeRequest>,
) -> Response {
    let actor = actor_or_reject!(headers);
    write_response(state.engine.grade(&actor, post_id, member_id, req.points).await)
}

/// GET /api/posts/:id/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.comments(&actor, post_id).await)
}

/// POST /api/posts/:id/comments
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    write_response(state.engine.add_comment(&actor, post_id, form.message()).await)
}

/// DELETE /api/comments/:id
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_comment(&actor, comment_id).await)
}

/// GET /api/posts/:id/private/:member_id
pub async fn private_thread(
    State(state): State<Arc<AppState>>,
    Path((post_id, member_id)): Path<(i32, i32)>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.private_thread(&actor, post_id, member_id).await)
}

/// POST /api/posts/:id/private
pub async fn add_private_comment(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    let result = match form.int("to_member") {
        Ok(to_member) => {
            state
                .engine
                .add_private_comment(&actor, post_id, to_member, form.message())
                .await
        }
        Err(e) => Err(e),
    };
    write_response(result)
}

/// DELETE /api/private-comments/:id
pub async fn delete_private_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_private_comment(&actor, comment_id).await)
}

/// GET /api/classrooms/:id/chat
pub async fn list_chat(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    list_response(state.engine.chat_messages(&actor, classroom_id).await)
}

/// POST /api/classrooms/:id/chat
pub async fn send_chat(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<i32>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = actor_or_reject!(headers);
    let mut form = form_or_reject!(multipart);
    write_response(state.engine.send_chat_message(&actor, classroom_id, form.message()).await)
}

/// DELETE /api/chat/:id
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_reject!(headers);
    action_response(state.engine.delete_chat_message(&actor, message_id).await)
}

/// GET /files/:bucket/*key - serve a stored attachment
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    if !buckets::ALL.contains(&bucket.as_str()) {
        return ClassroomError::not_found(format!("Bucket {}", bucket)).into_response();
    }

    match state.engine.files().backend().get(&bucket, &key).await {
        Ok(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from(data),
        )
            .into_response(),
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidKey(_)) => {
            ClassroomError::not_found(format!("Object {}/{}", bucket, key)).into_response()
        }
        Err(e) => ClassroomError::Storage(e).into_response(),
    }
}

/// Health check endpoint
pub async fn health() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
    .into_response()
}
