use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use sea_orm::{DatabaseConnection, EntityTrait};

use super::auth::{Session, SessionManager};
use crate::assets::AssetSync;
use crate::config::ServerConfig;
use crate::db::entities::event;
use crate::error::{Result, ServerError};
use crate::storage::{AssetStore, LocalStorage, RemoteClient};

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub db: DatabaseConnection,
    pub assets: AssetSync,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(config: ServerConfig, db: DatabaseConnection) -> Result<Self> {
        let store: Arc<dyn AssetStore> = Arc::new(LocalStorage::new(config.public_dir.clone()));
        let remote = RemoteClient::new(config.remote_timeout, config.mirror_secret.clone())
            .map_err(|e| ServerError::Internal(format!("HTTP client: {}", e)))?;
        let assets = AssetSync::new(db.clone(), store, remote, config.max_upload_bytes);
        let sessions = SessionManager::new(config.session_ttl);

        Ok(Self {
            config,
            db,
            assets,
            sessions,
        })
    }

    /// Load an event the session's merchant owns
    pub async fn owned_event(&self, session: &Session, event_id: i32) -> Result<event::Model> {
        let event = event::Entity::find_by_id(event_id)
            .one(&self.db)
            .await?
            .ok_or(ServerError::EventNotFound(event_id))?;

        if event.merchant_id != session.merchant_id {
            tracing::warn!(
                "Merchant {} tried to access event {} of merchant {}",
                session.merchant_id,
                event_id,
                event.merchant_id
            );
            return Err(ServerError::PermissionDenied);
        }
        Ok(event)
    }
}

/// JSON response helper
pub fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            let mut response = Response::new(Body::from("Internal server error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}
