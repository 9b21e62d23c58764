//! Local filesystem asset store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::backend::{AssetStore, StorageError, StorageResult};

/// Directory under the public root that holds every upload
pub const UPLOADS_DIR: &str = "uploads";

/// Local filesystem asset store.
///
/// Stores files in a directory structure that the stored path mirrors:
/// ```text
/// {public_root}/
///   uploads/
///     {folder}/
///       {timestamp}-{original_name}
/// ```
pub struct LocalStorage {
    public_root: PathBuf,
}

impl LocalStorage {
    /// Create a new local store rooted at the public directory
    pub fn new(public_root: PathBuf) -> Self {
        Self { public_root }
    }

    /// Map a stored relative path onto disk, refusing anything that would
    /// land outside `{public_root}/uploads`.
    ///
    /// A well-formed path elsewhere in the public tree (a bundled
    /// placeholder such as `/placeholder.png`) is never an upload, so it
    /// resolves to `NotFound` rather than `InvalidPath`.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        if path.contains('\\') || path.contains('\0') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        let relative = Path::new(path.trim_start_matches('/'));
        let mut components = relative.components();
        match components.next() {
            Some(Component::Normal(first)) if first == UPLOADS_DIR => {}
            Some(Component::Normal(_))
                if components
                    .clone()
                    .all(|c| matches!(c, Component::Normal(_))) =>
            {
                return Err(StorageError::NotFound(path.to_string()));
            }
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }

        let mut depth = 0;
        for component in components {
            match component {
                Component::Normal(_) => depth += 1,
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        if depth < 2 {
            // Need at least {folder}/{file}
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        Ok(self.public_root.join(relative))
    }

    fn not_found(path: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Folder names become a directory, so keep them to a safe alphabet
pub fn is_valid_folder(folder: &str) -> bool {
    !folder.is_empty()
        && folder.len() <= 64
        && folder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Relative path the database stores for a file in a folder
pub fn relative_path(folder: &str, file_name: &str) -> String {
    format!("/{}/{}/{}", UPLOADS_DIR, folder, file_name)
}

#[async_trait]
impl AssetStore for LocalStorage {
    async fn put(&self, folder: &str, file_name: &str, data: Bytes) -> StorageResult<String> {
        if !is_valid_folder(folder) {
            return Err(StorageError::InvalidPath(folder.to_string()));
        }
        if file_name.contains('/') {
            return Err(StorageError::InvalidPath(file_name.to_string()));
        }
        let relative = relative_path(folder, file_name);
        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await.map_err(StorageError::Io)?;
        Ok(relative)
    }

    async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let disk_path = self.resolve(path)?;
        let data = fs::read(&disk_path)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn get_stream(
        &self,
        path: &str,
    ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        let disk_path = self.resolve(path)?;
        let file = fs::File::open(&disk_path)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        if !file.metadata().await?.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(Box::new(file))
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let disk_path = self.resolve(path)?;
        match fs::remove_file(&disk_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false), // Already deleted
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let disk_path = self.resolve(path)?;
        Ok(fs::metadata(&disk_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let disk_path = self.resolve(path)?;
        let metadata = fs::metadata(&disk_path)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(metadata.len())
    }

    async fn list(&self, folder: &str) -> StorageResult<Vec<String>> {
        if !is_valid_folder(folder) {
            return Err(StorageError::InvalidPath(folder.to_string()));
        }
        let dir = self.public_root.join(UPLOADS_DIR).join(folder);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            paths.push(relative_path(folder, &name.to_string_lossy()));
        }
        paths.sort();
        Ok(paths)
    }
}
