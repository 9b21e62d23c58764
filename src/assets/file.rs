//! Uploaded file validation and naming.

use bytes::Bytes;

use crate::error::{Result, ServerError};

/// An image received from a merchant, not yet stored anywhere
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Reject anything that is not an image or is larger than `max_bytes`.
    /// Runs before any storage is touched.
    pub fn validate(&self, max_bytes: usize) -> Result<()> {
        if !self.content_type.starts_with("image/") {
            return Err(ServerError::InvalidFile(format!(
                "Invalid file type {:?}, expected an image",
                self.content_type
            )));
        }
        if self.size() > max_bytes {
            return Err(ServerError::InvalidFile(format!(
                "File too large (max {})",
                format_limit(max_bytes)
            )));
        }
        Ok(())
    }

    /// `{epoch_millis}-{sanitized original name}`
    pub fn stamped_name(&self, epoch_millis: i64) -> String {
        format!("{}-{}", epoch_millis, sanitize_file_name(&self.file_name))
    }
}

fn format_limit(bytes: usize) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{}MB", bytes / (1024 * 1024))
    } else {
        format!("{} bytes", bytes)
    }
}

/// Keep only the final path component and a filesystem-safe alphabet
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "file".to_string();
    }

    if cleaned.len() > 128 {
        // Keep the extension, it drives the served content type
        match cleaned.rfind('.') {
            Some(dot) if cleaned.len() - dot <= 10 => {
                let ext = &cleaned[dot..];
                format!("{}{}", &cleaned[..128 - ext.len()], ext)
            }
            _ => cleaned[..128].to_string(),
        }
    } else {
        cleaned.to_string()
    }
}

/// Content type served for a stored file, by extension
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
