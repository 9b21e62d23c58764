//! Client for the mirror kept on a template deployment.
//!
//! Every template site exposes the same two routes this server does
//! (`api/upload` and `api/delete-file`), so mirroring is plain HTTP
//! forwarding against the template's base URL.

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

/// Header carrying the shared secret that lets one deployment call another
/// deployment's file routes without a merchant session
pub const MIRROR_SECRET_HEADER: &str = "x-mirror-secret";

/// Why a remote call did not succeed
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Could not reach the deployment at all (DNS, connect, timeout)
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The deployment answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The template has no usable base URL
    #[error("invalid template url: {0:?}")]
    InvalidUrl(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A file forwarded to a template deployment
pub struct RemoteUpload<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: Bytes,
    pub folder: &'a str,
    pub scope: &'a str,
    pub template_id: Option<i32>,
}

/// Normalize a template base URL: trimmed, non-empty, ending in `/`
pub fn normalize_base_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if url.ends_with('/') {
        Some(url.to_string())
    } else {
        Some(format!("{}/", url))
    }
}

/// HTTP client for template deployments
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    secret: Option<String>,
}

impl RemoteClient {
    /// Create a client whose every request gives up after `timeout`.
    /// When `secret` is set it is sent in [`MIRROR_SECRET_HEADER`] on every call.
    pub fn new(timeout: Duration, secret: Option<String>) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        Ok(Self { http, secret })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(url);
        match &self.secret {
            Some(secret) => request.header(MIRROR_SECRET_HEADER, secret),
            None => request,
        }
    }

    fn endpoint(base_url: &str, route: &str) -> RemoteResult<String> {
        let base = normalize_base_url(base_url)
            .ok_or_else(|| RemoteError::InvalidUrl(base_url.to_string()))?;
        Ok(format!("{}{}", base, route))
    }

    /// POST the file to `{base}api/upload`. Returns the deployment's JSON ack.
    pub async fn upload(&self, base_url: &str, upload: RemoteUpload<'_>) -> RemoteResult<Value> {
        let url = Self::endpoint(base_url, "api/upload")?;

        let part = reqwest::multipart::Part::bytes(upload.data.to_vec())
            .file_name(upload.file_name.to_string())
            .mime_str(upload.content_type)
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("folder", upload.folder.to_string())
            .text("scope", upload.scope.to_string());
        if let Some(id) = upload.template_id {
            form = form.text("template_id", id.to_string());
        }

        tracing::debug!("Forwarding upload of {} to {}", upload.file_name, url);
        let response = self
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        Self::read_ack(response).await
    }

    /// POST `{"filePath": path}` to `{base}api/delete-file`
    pub async fn delete_file(&self, base_url: &str, file_path: &str) -> RemoteResult<Value> {
        let url = Self::endpoint(base_url, "api/delete-file")?;

        tracing::debug!("Forwarding delete of {} to {}", file_path, url);
        let response = self
            .post(&url)
            .json(&serde_json::json!({ "filePath": file_path }))
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        Self::read_ack(response).await
    }

    async fn read_ack(response: reqwest::Response) -> RemoteResult<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The ack is passed through opaquely; tolerate non-JSON bodies
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Pull the `url` a deployment reports for an uploaded file, if any
pub fn remote_url(ack: &Value) -> Option<&str> {
    ack.get("url").and_then(Value::as_str)
}
