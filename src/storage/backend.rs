//! Asset store trait definition.
//!
//! Assets are addressed by the relative path the database stores,
//! always of the form `/uploads/{folder}/{file_name}`.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// File not found
    NotFound(String),
    /// Path is malformed or escapes the uploads root
    InvalidPath(String),
    /// IO error
    Io(std::io::Error),
    /// Other error
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(path) => write!(f, "File not found: {}", path),
            StorageError::InvalidPath(path) => write!(f, "Invalid path: {}", path),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage for uploaded assets.
///
/// `delete` is idempotent: removing a path that does not exist succeeds and
/// reports `false`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Write a file under `folder` and return its relative path
    async fn put(&self, folder: &str, file_name: &str, data: Bytes) -> StorageResult<String>;

    /// Read a whole file
    async fn get(&self, path: &str) -> StorageResult<Bytes>;

    /// Open a file for streaming
    async fn get_stream(
        &self,
        path: &str,
    ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>>;

    /// Delete a file. Returns whether a file was actually removed.
    async fn delete(&self, path: &str) -> StorageResult<bool>;

    /// Check if a file exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Size of a file without reading it
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// List relative paths stored under a folder
    async fn list(&self, folder: &str) -> StorageResult<Vec<String>>;
}

/// Upload folders
pub mod folders {
    /// Event venue and hero images
    pub const EVENT: &str = "event";
    /// Merchant logos
    pub const MERCHANT: &str = "merchant";
    /// Anything uploaded without a folder
    pub const GENERAL: &str = "general";
}
