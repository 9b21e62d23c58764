//! Upload, download and delete routes for stored images.
//!
//! These are the two routes template deployments expose as well, so the
//! same request shapes are forwarded there verbatim. Another deployment
//! calls them with the shared mirror secret instead of a session, and such
//! calls are never forwarded any further.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::io::ReaderStream;

use super::auth::FileCaller;
use super::handlers::{json_response, AppState};
use crate::assets::{content_type_for, Mirror, UploadFile};
use crate::error::{Result, ServerError};
use crate::storage::{folders, normalize_base_url};

/// Stored files never change under a given name
const CACHE_FOREVER: &str = "public, max-age=31536000, immutable";

/// A parsed multipart form: the `file` part plus every text field
pub struct UploadForm {
    pub file: Option<UploadFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut file = None;
        let mut fields = HashMap::new();

        while let Some(field) = multipart.next_field().await.map_err(form_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(form_error)?;
                file = Some(UploadFile::new(file_name, content_type, data));
            } else {
                let value = field.text().await.map_err(form_error)?;
                fields.insert(name, value);
            }
        }

        Ok(Self { file, fields })
    }

    /// A non-empty text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require_file(&mut self) -> Result<UploadFile> {
        self.file
            .take()
            .ok_or_else(|| ServerError::InvalidRequest("No file uploaded".to_string()))
    }
}

fn form_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::InvalidFile("File too large".to_string())
    } else {
        ServerError::InvalidRequest(e.body_text())
    }
}

/// Template id as sent by the admin UI: a number or a numeric string
fn parse_template_id(value: Option<&Value>) -> Result<Option<i32>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ServerError::InvalidRequest(format!("Invalid template id: {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServerError::InvalidRequest(format!("Invalid template id: {:?}", s))),
        Some(other) => Err(ServerError::InvalidRequest(format!(
            "Invalid template id: {}",
            other
        ))),
    }
}

/// Work out which deployment, if any, a request should be mirrored to.
///
/// Only event-scoped files are mirrored. The template id decides the target;
/// a `template_url` sent alongside must agree with the stored one.
async fn request_mirror(
    state: &AppState,
    scope: Option<&str>,
    template_id: Option<i32>,
    template_url: Option<&str>,
) -> Result<Option<Mirror>> {
    if scope != Some(folders::EVENT) {
        return Ok(None);
    }
    let Some(template_id) = template_id else {
        if let Some(url) = template_url {
            tracing::warn!("Ignoring template_url {} without a template id", url);
        }
        return Ok(None);
    };

    let mirror = state.assets.resolve_mirror(Some(template_id)).await?;
    if let (Some(mirror), Some(url)) = (&mirror, template_url) {
        if normalize_base_url(url).as_deref() != Some(mirror.base_url.as_str()) {
            return Err(ServerError::InvalidRequest(format!(
                "template_url does not match template {}",
                template_id
            )));
        }
    }
    Ok(mirror)
}

/// POST /api/upload
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    caller: FileCaller,
    multipart: Multipart,
) -> Result<Response> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;

    let folder = form.field("folder").unwrap_or(folders::GENERAL).to_string();
    let scope = form.field("scope").map(str::to_string);
    let template_id = parse_template_id(
        form.field("template_id")
            .map(|s| Value::String(s.to_string()))
            .as_ref(),
    )?;
    let mirror = match caller {
        FileCaller::Merchant(_) => {
            request_mirror(&state, scope.as_deref(), template_id, form.field("template_url")).await?
        }
        FileCaller::Mirror => None,
    };

    let stored = state
        .assets
        .upload(&folder, scope.as_deref().unwrap_or(&folder), &file, mirror.as_ref())
        .await?;

    tracing::info!("Uploaded {} ({} bytes)", stored.url, file.size());
    Ok(json_response(StatusCode::OK, &stored))
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

/// GET /api/upload?file=<path>
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Response> {
    let path = query
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("Missing file parameter".to_string()))?;
    stream_asset(&state, &path).await
}

/// GET /uploads/*path
pub async fn public_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response> {
    stream_asset(&state, &format!("/uploads/{}", path)).await
}

/// Stream a stored file as HTTP response
async fn stream_asset(state: &AppState, path: &str) -> Result<Response> {
    let store = state.assets.store();
    let size = store.size(path).await?;
    let reader = store.get_stream(path).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(path))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::CACHE_CONTROL, CACHE_FOREVER)
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub template_id: Option<Value>,
    #[serde(default)]
    pub template_url: Option<String>,
}

/// POST /api/delete-file
///
/// A path some slot points at is released through that slot, and only by
/// the merchant who owns it. Unreferenced files can be deleted by any
/// logged-in merchant.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    caller: FileCaller,
    Json(req): Json<DeleteFileRequest>,
) -> Result<Response> {
    if req.file_path.trim().is_empty() {
        return Err(ServerError::InvalidRequest("filePath is required".to_string()));
    }

    let session = match caller {
        FileCaller::Merchant(session) => session,
        FileCaller::Mirror => {
            state.assets.delete(&req.file_path, None).await?;
            tracing::info!("Deleted {} for a mirroring deployment", req.file_path);
            return Ok(deleted(None));
        }
    };

    if let Some(reference) = state.assets.find_reference(&req.file_path).await? {
        if reference.merchant_id != session.merchant_id {
            tracing::warn!(
                "Merchant {} tried to delete {} of merchant {}",
                session.merchant_id,
                reference.path,
                reference.merchant_id
            );
            return Err(ServerError::PermissionDenied);
        }
        let remote = state.assets.release(&reference).await?;
        tracing::info!("Deleted {} and cleared its slot", reference.path);
        return Ok(deleted(remote));
    }

    let template_id = parse_template_id(req.template_id.as_ref())?;
    let mirror = request_mirror(
        &state,
        req.scope.as_deref(),
        template_id,
        req.template_url.as_deref().filter(|u| !u.trim().is_empty()),
    )
    .await?;

    let remote = state.assets.delete(&req.file_path, mirror.as_ref()).await?;

    tracing::info!("Deleted {}", req.file_path);
    Ok(deleted(remote))
}

fn deleted(remote: Option<Value>) -> Response {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "remote": remote }),
    )
}
