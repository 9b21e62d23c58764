//! Fixtures shared by unit tests: a scratch environment, seed rows and a
//! fake template deployment.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::api::{self, hash_password, AppState};
use crate::assets::{content_type_for, AssetSlot, AssetSync, UploadFile};
use crate::config::ServerConfig;
use crate::db::entities::{
    checkin, event, guest, merchant, order, order_item, template, ticket, ticket_detail,
};
use crate::db::{init_database, now_secs};
use crate::storage::{AssetStore, MIRROR_SECRET_HEADER};

// ============================================================================
// Fake template deployment
// ============================================================================

/// One request received by [`TestRemote`]
#[derive(Clone, Debug)]
pub struct RemoteCall {
    pub route: &'static str,
    pub fields: Vec<(String, String)>,
}

impl RemoteCall {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct RemoteState {
    calls: Mutex<Vec<RemoteCall>>,
    upload_status: Mutex<Option<StatusCode>>,
    delete_status: Mutex<Option<StatusCode>>,
}

/// A template deployment on a random local port that records every call
pub struct TestRemote {
    addr: SocketAddr,
    state: Arc<RemoteState>,
}

impl TestRemote {
    pub async fn spawn() -> Self {
        let state = Arc::new(RemoteState::default());
        let app = Router::new()
            .route("/api/upload", post(remote_upload))
            .route("/api/delete-file", post(remote_delete))
            .with_state(state.clone())
            .layer(DefaultBodyLimit::disable());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.calls.lock().clone()
    }

    pub fn fail_uploads(&self, status: u16) {
        *self.state.upload_status.lock() = Some(StatusCode::from_u16(status).unwrap());
    }

    pub fn fail_deletes(&self, status: u16) {
        *self.state.delete_status.lock() = Some(StatusCode::from_u16(status).unwrap());
    }
}

/// The mirror secret a call carried, recorded as a field
fn secret_field(headers: &HeaderMap) -> Option<(String, String)> {
    headers
        .get(MIRROR_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| ("mirror_secret".to_string(), v.to_string()))
}

async fn remote_upload(
    State(state): State<Arc<RemoteState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut fields: Vec<(String, String)> = secret_field(&headers).into_iter().collect();
    let mut file_name = "file".to_string();

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            file_name = field.file_name().unwrap_or("file").to_string();
            let data = field.bytes().await.unwrap();
            fields.push(("file".to_string(), file_name.clone()));
            fields.push(("file_size".to_string(), data.len().to_string()));
        } else {
            let value = field.text().await.unwrap();
            fields.push((name, value));
        }
    }

    let call = RemoteCall {
        route: "upload",
        fields,
    };
    let folder = call.field("folder").unwrap_or("general").to_string();
    state.calls.lock().push(call);

    let failure = *state.upload_status.lock();
    if let Some(status) = failure {
        return (status, Json(json!({ "error": "upload rejected" }))).into_response();
    }
    Json(json!({
        "url": format!("/uploads/{}/{}", folder, file_name),
        "remote": null,
    }))
    .into_response()
}

async fn remote_delete(
    State(state): State<Arc<RemoteState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = body
        .get("filePath")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut fields: Vec<(String, String)> = secret_field(&headers).into_iter().collect();
    fields.push(("filePath".to_string(), path));
    state.calls.lock().push(RemoteCall {
        route: "delete-file",
        fields,
    });

    let failure = *state.delete_status.lock();
    if let Some(status) = failure {
        return (status, Json(json!({ "error": "delete rejected" }))).into_response();
    }
    Json(json!({ "success": true })).into_response()
}

/// Serve a router on a random local port and return its base URL
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

/// Base URL of a port nothing is listening on
pub async fn closed_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

// ============================================================================
// Scratch environment
// ============================================================================

/// Database, public directory and application state in a temp dir
pub struct TestEnv {
    pub db: DatabaseConnection,
    pub store: Arc<dyn AssetStore>,
    pub sync: AssetSync,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// An environment that signs its mirror calls with `secret` and
    /// accepts calls carrying it
    pub async fn with_mirror_secret(secret: &str) -> Self {
        Self::build(Some(secret.to_string())).await
    }

    async fn build(mirror_secret: Option<String>) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::for_dir(dir.path());
        config.mirror_secret = mirror_secret;
        let db = init_database(&config.db_path).await.unwrap();
        let state = Arc::new(AppState::new(config, db.clone()).unwrap());

        Self {
            db,
            store: state.assets.store().clone(),
            sync: state.assets.clone(),
            state,
            _dir: dir,
        }
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Log in and return the bearer token
    pub async fn login(&self, email: &str, password: &str) -> String {
        let (session, _) = self
            .state
            .sessions
            .login(&self.db, email, password)
            .await
            .unwrap();
        session.token
    }
}

/// An image upload of `len` bytes, typed by its extension
pub fn image(name: &str, len: usize) -> UploadFile {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    UploadFile::new(name, content_type_for(name), Bytes::from(data))
}

/// A multipart/form-data body with text fields and an optional file part
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

// ============================================================================
// Seed rows
// ============================================================================

pub async fn seed_merchant(db: &DatabaseConnection, email: &str, password: &str) -> merchant::Model {
    merchant::ActiveModel {
        name: Set("Acme Events".to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)),
        created_at: Set(now_secs()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_template(db: &DatabaseConnection, id: i32, url: &str) -> template::Model {
    template::ActiveModel {
        id: Set(id),
        title: Set(format!("Template {}", id)),
        category: Set("concert".to_string()),
        url: Set(Some(url.to_string())),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// An event running 2024-03-05 through 2024-03-07
pub async fn seed_event(
    db: &DatabaseConnection,
    merchant_id: i32,
    template_id: Option<i32>,
) -> event::Model {
    event::ActiveModel {
        merchant_id: Set(merchant_id),
        name: Set("Spring Festival".to_string()),
        description: Set(Some("Three days of music".to_string())),
        location: Set(Some("Jakarta".to_string())),
        start_date: Set(Some("2024-03-05".to_string())),
        end_date: Set(Some("2024-03-07".to_string())),
        capacity: Set(Some(500)),
        status: Set(true),
        template_id: Set(template_id),
        created_at: Set(now_secs()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn set_event_asset(
    db: &DatabaseConnection,
    event_id: i32,
    slot: AssetSlot,
    path: Option<&str>,
) {
    let mut active = event::ActiveModel {
        id: sea_orm::Unchanged(event_id),
        ..Default::default()
    };
    match slot {
        AssetSlot::ImageVenue => active.image_venue = Set(path.map(str::to_string)),
        AssetSlot::HeroImage => active.hero_image = Set(path.map(str::to_string)),
        AssetSlot::Logo => panic!("not an event slot"),
    }
    active.update(db).await.unwrap();
}

pub async fn seed_guest(db: &DatabaseConnection, name: &str, email: Option<&str>) -> guest::Model {
    guest::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.map(str::to_string)),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_ticket(db: &DatabaseConnection, event_id: i32, ticket_type: &str) -> ticket::Model {
    ticket::ActiveModel {
        event_id: Set(event_id),
        ticket_type: Set(ticket_type.to_string()),
        price: Set(150_000),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_order(
    db: &DatabaseConnection,
    event_id: i32,
    status: &str,
    order_date: &str,
) -> order::Model {
    order::ActiveModel {
        event_id: Set(event_id),
        customer_name: Set("Budi".to_string()),
        customer_email: Set("budi@example.com".to_string()),
        order_date: Set(order_date.to_string()),
        status: Set(status.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_order_item(
    db: &DatabaseConnection,
    order_id: i32,
    ticket_id: i32,
    quantity: i32,
) -> order_item::Model {
    order_item::ActiveModel {
        order_id: Set(order_id),
        ticket_id: Set(ticket_id),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_ticket_detail(
    db: &DatabaseConnection,
    order_id: i32,
    gender: &str,
    event_date: &str,
) -> ticket_detail::Model {
    ticket_detail::ActiveModel {
        order_id: Set(order_id),
        name: Set("Attendee".to_string()),
        gender: Set(Some(gender.to_string())),
        event_date: Set(Some(event_date.to_string())),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_checkin(
    db: &DatabaseConnection,
    id: &str,
    ticket_detail_id: i32,
    checked_in_at: Option<&str>,
) -> checkin::Model {
    checkin::ActiveModel {
        id: Set(id.to_string()),
        ticket_detail_id: Set(ticket_detail_id),
        checked_in_at: Set(checked_in_at.map(str::to_string)),
    }
    .insert(db)
    .await
    .unwrap()
}
