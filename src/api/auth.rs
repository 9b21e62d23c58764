//! Merchant sessions.
//!
//! A session is created at login and lives in [`SessionManager`] until
//! logout or expiry. Handlers receive it through the [`Session`] extractor
//! instead of reading any ambient "current user".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::handlers::{json_response, AppState};
use crate::config::BootstrapMerchant;
use crate::db::entities::merchant;
use crate::db::now_secs;
use crate::error::{Result, ServerError};
use crate::storage::MIRROR_SECRET_HEADER;

/// Hash a password with salt
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"event-admin-salt:");
    hasher.update(password.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate an unguessable session token
fn generate_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hasher.update(timestamp.to_le_bytes());

    let result = hasher.finalize();
    BASE64.encode(&result[..24]) // 24 bytes = 32 base64 chars
}

/// A logged-in merchant
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub merchant_id: i32,
    pub name: String,
    pub email: String,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// Merchant fields safe to hand back to the admin UI
#[derive(Clone, Debug, Serialize)]
pub struct MerchantView {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub logo: Option<String>,
}

impl From<merchant::Model> for MerchantView {
    fn from(m: merchant::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            email: m.email,
            logo: m.logo,
        }
    }
}

/// In-memory session store
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Check credentials and open a session
    pub async fn login(
        &self,
        db: &DatabaseConnection,
        email: &str,
        password: &str,
    ) -> Result<(Session, merchant::Model)> {
        let merchant = merchant::Entity::find()
            .filter(merchant::Column::Email.eq(email.trim()))
            .one(db)
            .await?
            .ok_or(ServerError::AuthFailed)?;

        if hash_password(password) != merchant.password_hash {
            return Err(ServerError::AuthFailed);
        }

        let session = Session {
            token: generate_token(),
            merchant_id: merchant.id,
            name: merchant.name.clone(),
            email: merchant.email.clone(),
            expires_at: SystemTime::now() + self.ttl,
        };

        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());
        tracing::info!("Merchant {} logged in", merchant.email);

        Ok((session, merchant))
    }

    /// Look up a live session by token
    pub fn validate(&self, token: &str) -> Result<Session> {
        let sessions = self.sessions.read();
        let session = sessions.get(token).ok_or(ServerError::AuthFailed)?;

        if session.is_expired() {
            return Err(ServerError::AuthFailed);
        }

        Ok(session.clone())
    }

    /// Parse `Authorization: Bearer <token>` and validate it
    pub fn from_headers(&self, headers: &HeaderMap) -> Result<Session> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ServerError::AuthRequired)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(ServerError::AuthRequired)?;

        self.validate(token.trim())
    }

    /// Invalidate a session. Returns whether it existed.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| !s.is_expired());
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        state.sessions.from_headers(&parts.headers)
    }
}

/// Who is calling a file route: a logged-in merchant, or another
/// deployment presenting the shared mirror secret
#[derive(Clone, Debug)]
pub enum FileCaller {
    Merchant(Session),
    Mirror,
}

fn digest(value: &[u8]) -> Vec<u8> {
    Sha256::digest(value).to_vec()
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for FileCaller {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(presented) = parts.headers.get(MIRROR_SECRET_HEADER) else {
            return state.sessions.from_headers(&parts.headers).map(FileCaller::Merchant);
        };

        // Compare digests so the check does not short-circuit on a prefix
        match &state.config.mirror_secret {
            Some(expected) if digest(presented.as_bytes()) == digest(expected.as_bytes()) => {
                Ok(FileCaller::Mirror)
            }
            Some(_) => {
                tracing::warn!("Rejected mirror call with a mismatched secret");
                Err(ServerError::AuthFailed)
            }
            None => {
                tracing::warn!("Rejected mirror call: no mirror secret configured");
                Err(ServerError::AuthFailed)
            }
        }
    }
}

/// Create the configured merchant if no account uses its email yet
pub async fn ensure_merchant(db: &DatabaseConnection, bootstrap: &BootstrapMerchant) -> Result<()> {
    let existing = merchant::Entity::find()
        .filter(merchant::Column::Email.eq(bootstrap.email.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    merchant::ActiveModel {
        name: Set(bootstrap.name.clone()),
        email: Set(bootstrap.email.clone()),
        password_hash: Set(hash_password(&bootstrap.password)),
        created_at: Set(now_secs()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!("Created merchant account {}", bootstrap.email);
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let (session, merchant) = state.sessions.login(&state.db, &req.email, &req.password).await?;
    state.sessions.cleanup_expired();

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({
            "token": session.token,
            "merchant": MerchantView::from(merchant),
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<Arc<AppState>>, session: Session) -> Response {
    state.sessions.logout(&session.token);
    tracing::info!("Merchant {} logged out", session.email);
    json_response(StatusCode::OK, &serde_json::json!({ "success": true }))
}

/// GET /api/auth/me
pub async fn me(State(state): State<Arc<AppState>>, session: Session) -> Result<Response> {
    let merchant = merchant::Entity::find_by_id(session.merchant_id)
        .one(&state.db)
        .await?
        .ok_or(ServerError::AuthFailed)?;

    Ok(json_response(StatusCode::OK, &MerchantView::from(merchant)))
}

#[derive(Deserialize)]
pub struct UpdateMerchantRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// PUT /api/merchants/me
pub async fn update_merchant(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<UpdateMerchantRequest>,
) -> Result<Response> {
    let merchant = merchant::Entity::find_by_id(session.merchant_id)
        .one(&state.db)
        .await?
        .ok_or(ServerError::AuthFailed)?;
    let mut active: merchant::ActiveModel = merchant.into();

    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServerError::InvalidRequest("Merchant name cannot be empty".to_string()));
        }
        active.name = Set(name.to_string());
    }

    if let Some(email) = req.email {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServerError::InvalidRequest(format!("Invalid email: {:?}", email)));
        }
        let taken = merchant::Entity::find()
            .filter(merchant::Column::Email.eq(email))
            .filter(merchant::Column::Id.ne(session.merchant_id))
            .one(&state.db)
            .await?;
        if taken.is_some() {
            return Err(ServerError::InvalidRequest(format!("Email {} is already in use", email)));
        }
        active.email = Set(email.to_string());
    }

    let merchant = active.update(&state.db).await?;
    tracing::info!("Merchant {} updated their profile", merchant.id);

    Ok(json_response(StatusCode::OK, &MerchantView::from(merchant)))
}
