//! Asset storage.
//!
//! Two places hold a copy of every event image:
//! - the local upload directory under the public root (always)
//! - the deployment of the event's template, reached over HTTP (when a
//!   template is set)

mod backend;
mod local;
mod remote;

pub use backend::{folders, AssetStore, StorageError};
pub use local::{is_valid_folder, relative_path, LocalStorage};
pub use remote::{
    normalize_base_url, remote_url, RemoteClient, RemoteError, RemoteUpload, MIRROR_SECRET_HEADER,
};
