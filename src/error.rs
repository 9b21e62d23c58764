use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Remote delete failed: {0}")]
    RemoteDeleteFailed(String),

    #[error("Remote upload failed: {0}")]
    RemoteUploadFailed(String),

    #[error("Failed to write file: {0}")]
    LocalWriteFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(i32),

    #[error("Template not found: {0}")]
    TemplateNotFound(i32),

    #[error("Another update is in progress for {0}")]
    SlotBusy(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidFile(_) => StatusCode::BAD_REQUEST,
            ServerError::RemoteDeleteFailed(_) => StatusCode::BAD_GATEWAY,
            ServerError::RemoteUploadFailed(_) => StatusCode::BAD_GATEWAY,
            ServerError::LocalWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::EventNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::SlotBusy(_) => StatusCode::CONFLICT,
            ServerError::AuthRequired => StatusCode::UNAUTHORIZED,
            ServerError::AuthFailed => StatusCode::UNAUTHORIZED,
            ServerError::PermissionDenied => StatusCode::FORBIDDEN,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Database(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(path) => ServerError::NotFound(path),
            StorageError::InvalidPath(path) => ServerError::InvalidRequest(format!("Invalid path: {}", path)),
            StorageError::Io(e) => ServerError::Io(e),
            StorageError::Other(msg) => ServerError::Internal(msg),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            ServerError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
