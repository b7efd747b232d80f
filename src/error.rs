use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ClassroomError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClassroomError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ClassroomError::NotFound(what.into())
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        ClassroomError::PermissionDenied(reason.into())
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        ClassroomError::Rejected(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ClassroomError::InvalidRequest(reason.into())
    }

    /// Failures a caller is expected to branch on rather than treat as a
    /// violated precondition.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ClassroomError::Rejected(_)
                | ClassroomError::InvalidRequest(_)
                | ClassroomError::InvalidState(_)
        )
    }
}

impl IntoResponse for ClassroomError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ClassroomError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ClassroomError::PermissionDenied(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ClassroomError::Rejected(_) => (StatusCode::CONFLICT, self.to_string()),
            ClassroomError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ClassroomError::InvalidState(_) => (StatusCode::CONFLICT, self.to_string()),
            ClassroomError::Database(e) => {
                tracing::error!("database failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ClassroomError::Storage(e) => {
                tracing::error!("storage failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ClassroomError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({ "success": false, "message": message });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ClassroomError>;
