//! Keeps an image slot, its local file and the template mirror in step.
//!
//! Replacement is write, then swap, then delete: the new file is staged
//! locally and on the mirror, the database pointer is flipped, and only
//! then is the previous file retired. A failure before the flip leaves the
//! old asset untouched. A rejected delete of the old file after the flip
//! puts the pointer back and removes the staged copies.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Value};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, error, info, warn};

use super::file::UploadFile;
use super::guard::{InFlight, SlotGuard};
use super::slot::{AssetOwner, AssetSlot, SlotState};
use crate::db::entities::{event, merchant, template};
use crate::error::{Result, ServerError};
use crate::storage::{
    is_valid_folder, normalize_base_url, relative_path, remote_url, AssetStore, RemoteClient,
    RemoteError, RemoteUpload, StorageError,
};

/// Attempts at finding a free timestamped name before giving up
const NAME_ATTEMPTS: i64 = 16;

/// A template deployment that mirrors event assets
#[derive(Clone, Debug)]
pub struct Mirror {
    pub template_id: i32,
    pub base_url: String,
}

/// A stored asset as reported back to clients
#[derive(Clone, Debug, Serialize)]
pub struct StoredAsset {
    /// Relative path recorded in the database
    pub url: String,
    /// Mirror acknowledgement; `null` without a mirror or when it was unreachable
    pub remote: Option<Json>,
}

/// A slot whose current pointer is a given stored file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRef {
    pub owner: AssetOwner,
    pub slot: AssetSlot,
    /// Merchant the slot ultimately belongs to
    pub merchant_id: i32,
    /// The stored path, as recorded in the database
    pub path: String,
}

#[derive(Clone)]
pub struct AssetSync {
    db: DatabaseConnection,
    store: Arc<dyn AssetStore>,
    remote: RemoteClient,
    in_flight: InFlight,
    max_upload_bytes: usize,
}

impl AssetSync {
    pub fn new(
        db: DatabaseConnection,
        store: Arc<dyn AssetStore>,
        remote: RemoteClient,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            store,
            remote,
            in_flight: InFlight::new(),
            max_upload_bytes,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    /// Look up the deployment a template mirrors to
    pub async fn resolve_mirror(&self, template_id: Option<i32>) -> Result<Option<Mirror>> {
        let Some(id) = template_id else {
            return Ok(None);
        };
        let template = template::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ServerError::TemplateNotFound(id))?;
        let base_url = template
            .url
            .as_deref()
            .and_then(normalize_base_url)
            .ok_or_else(|| {
                ServerError::InvalidRequest(format!("Template {} has no deployment URL", id))
            })?;

        Ok(Some(Mirror {
            template_id: id,
            base_url,
        }))
    }

    /// Replace the image in one of an event's slots
    pub async fn replace_event_asset(
        &self,
        event_id: i32,
        slot: AssetSlot,
        file: UploadFile,
    ) -> Result<StoredAsset> {
        if !slot.is_event_slot() {
            return Err(ServerError::InvalidRequest(format!("{} is not an event slot", slot)));
        }
        file.validate(self.max_upload_bytes)?;

        let owner = AssetOwner::Event(event_id);
        let _guard = self.claim(owner, slot)?;

        let event = self.find_event(event_id).await?;
        let mirror = self.resolve_mirror(event.template_id).await?;
        let previous = slot.event_path(&event).map(str::to_string);

        self.swap(owner, slot, previous.as_deref(), &file, mirror.as_ref())
            .await
    }

    /// Replace a merchant's logo. Logos are never mirrored.
    pub async fn replace_merchant_logo(
        &self,
        merchant_id: i32,
        file: UploadFile,
    ) -> Result<StoredAsset> {
        file.validate(self.max_upload_bytes)?;

        let owner = AssetOwner::Merchant(merchant_id);
        let _guard = self.claim(owner, AssetSlot::Logo)?;

        let merchant = self.find_merchant(merchant_id).await?;

        self.swap(owner, AssetSlot::Logo, merchant.logo.as_deref(), &file, None)
            .await
    }

    /// Empty a slot, deleting its file from the mirror and from disk.
    /// Returns the mirror's acknowledgement, if any.
    pub async fn remove_event_asset(&self, event_id: i32, slot: AssetSlot) -> Result<Option<Json>> {
        let owner = AssetOwner::Event(event_id);
        let _guard = self.claim(owner, slot)?;

        let event = self.find_event(event_id).await?;
        let Some(previous) = slot.event_path(&event).map(str::to_string) else {
            return Ok(None);
        };

        let mirror = self.resolve_mirror(event.template_id).await?;
        self.clear(owner, slot, &previous, mirror.as_ref()).await
    }

    /// Find the slot, if any, whose pointer is `path`
    pub async fn find_reference(&self, path: &str) -> Result<Option<SlotRef>> {
        let path = format!("/{}", path.trim().trim_start_matches('/'));

        let event = event::Entity::find()
            .filter(
                Condition::any()
                    .add(event::Column::ImageVenue.eq(path.as_str()))
                    .add(event::Column::HeroImage.eq(path.as_str())),
            )
            .one(&self.db)
            .await?;
        if let Some(event) = event {
            let slot = AssetSlot::EVENT_SLOTS
                .into_iter()
                .find(|slot| slot.event_path(&event) == Some(path.as_str()))
                .unwrap_or(AssetSlot::ImageVenue);
            return Ok(Some(SlotRef {
                owner: AssetOwner::Event(event.id),
                slot,
                merchant_id: event.merchant_id,
                path,
            }));
        }

        let merchant = merchant::Entity::find()
            .filter(merchant::Column::Logo.eq(path.as_str()))
            .one(&self.db)
            .await?;
        Ok(merchant.map(|merchant| SlotRef {
            owner: AssetOwner::Merchant(merchant.id),
            slot: AssetSlot::Logo,
            merchant_id: merchant.id,
            path,
        }))
    }

    /// Delete the file a slot points at and empty the slot, under the
    /// slot's guard. Fails with `SlotBusy` if the pointer moved since
    /// `reference` was looked up.
    pub async fn release(&self, reference: &SlotRef) -> Result<Option<Json>> {
        let SlotRef {
            owner, slot, path, ..
        } = reference;
        let _guard = self.claim(*owner, *slot)?;

        let (current, mirror) = match *owner {
            AssetOwner::Event(id) => {
                let event = self.find_event(id).await?;
                let mirror = self.resolve_mirror(event.template_id).await?;
                (slot.event_path(&event).map(str::to_string), mirror)
            }
            AssetOwner::Merchant(id) => (self.find_merchant(id).await?.logo, None),
        };
        if current.as_deref() != Some(path.as_str()) {
            return Err(ServerError::SlotBusy(format!(
                "{} of {} changed while deleting {}",
                slot, owner, path
            )));
        }

        self.clear(*owner, *slot, path, mirror.as_ref()).await
    }

    /// Switch an event to another template.
    ///
    /// Old paths are meaningless to the new deployment, so both slots are
    /// emptied. The old files are then cleaned up on a best-effort basis.
    pub async fn apply_template(&self, event_id: i32, template_id: i32) -> Result<event::Model> {
        let owner = AssetOwner::Event(event_id);
        let _venue = self.claim(owner, AssetSlot::ImageVenue)?;
        let _hero = self.claim(owner, AssetSlot::HeroImage)?;

        let event = self.find_event(event_id).await?;
        if event.template_id == Some(template_id) {
            return Ok(event);
        }
        template::Entity::find_by_id(template_id)
            .one(&self.db)
            .await?
            .ok_or(ServerError::TemplateNotFound(template_id))?;

        let old_mirror = match self.resolve_mirror(event.template_id).await {
            Ok(mirror) => mirror,
            Err(e) => {
                warn!("Previous template of event {} is unusable: {}", event_id, e);
                None
            }
        };
        let old_paths: Vec<String> = AssetSlot::EVENT_SLOTS
            .iter()
            .filter_map(|slot| slot.event_path(&event).map(str::to_string))
            .collect();

        event::Entity::update_many()
            .col_expr(event::Column::TemplateId, Expr::value(Value::from(Some(template_id))))
            .col_expr(event::Column::ImageVenue, Expr::value(Value::from(None::<String>)))
            .col_expr(event::Column::HeroImage, Expr::value(Value::from(None::<String>)))
            .filter(event::Column::Id.eq(event_id))
            .exec(&self.db)
            .await?;
        info!("Event {} now uses template {}", event_id, template_id);

        for path in &old_paths {
            if let Some(mirror) = &old_mirror {
                if let Err(e) = self.delete_remote(mirror, path).await {
                    warn!("Leaving {} on template {}: {}", path, mirror.template_id, e);
                }
            }
            if let Err(e) = self.delete_local(path).await {
                warn!("Could not remove {} from disk: {}", path, e);
            }
        }

        self.find_event(event_id).await
    }

    /// Current path of a slot and whether its file is actually there
    pub async fn slot_state(
        &self,
        event_id: i32,
        slot: AssetSlot,
    ) -> Result<(Option<String>, SlotState)> {
        let event = self.find_event(event_id).await?;
        let Some(path) = slot.event_path(&event).map(str::to_string) else {
            return Ok((None, SlotState::Empty));
        };

        let state = match self.store.exists(&path).await {
            Ok(true) => SlotState::Present,
            Ok(false) | Err(StorageError::InvalidPath(_) | StorageError::NotFound(_)) => {
                SlotState::Orphaned
            }
            Err(e) => return Err(e.into()),
        };
        Ok((Some(path), state))
    }

    /// Store a file that is not bound to any slot
    pub async fn upload(
        &self,
        folder: &str,
        scope: &str,
        file: &UploadFile,
        mirror: Option<&Mirror>,
    ) -> Result<StoredAsset> {
        file.validate(self.max_upload_bytes)?;
        self.stage(folder, scope, file, mirror).await
    }

    /// Delete a stored file: from the mirror first, then from disk.
    /// A rejected mirror delete stops before anything local is touched.
    pub async fn delete(&self, path: &str, mirror: Option<&Mirror>) -> Result<Option<Json>> {
        let ack = match mirror {
            Some(mirror) => self.delete_remote(mirror, path).await?,
            None => None,
        };
        if !self.delete_local(path).await? {
            debug!("{} was already gone", path);
        }
        Ok(ack)
    }

    fn claim(&self, owner: AssetOwner, slot: AssetSlot) -> Result<SlotGuard> {
        self.in_flight.try_acquire(owner, slot).ok_or_else(|| {
            ServerError::SlotBusy(format!("{} of {} is already being updated", slot, owner))
        })
    }

    async fn find_event(&self, event_id: i32) -> Result<event::Model> {
        event::Entity::find_by_id(event_id)
            .one(&self.db)
            .await?
            .ok_or(ServerError::EventNotFound(event_id))
    }

    async fn find_merchant(&self, merchant_id: i32) -> Result<merchant::Model> {
        merchant::Entity::find_by_id(merchant_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("Merchant {} not found", merchant_id)))
    }

    /// Delete `path` from the mirror, empty the slot, then drop the local
    /// file. A rejected mirror delete leaves the slot as it was.
    async fn clear(
        &self,
        owner: AssetOwner,
        slot: AssetSlot,
        path: &str,
        mirror: Option<&Mirror>,
    ) -> Result<Option<Json>> {
        let ack = match mirror {
            Some(mirror) => self.delete_remote(mirror, path).await?,
            None => None,
        };

        self.set_pointer(owner, slot, None).await?;
        if let Err(e) = self.delete_local(path).await {
            warn!("Could not remove {} from disk: {}", path, e);
        }

        info!("Cleared {} of {}", slot, owner);
        Ok(ack)
    }

    async fn swap(
        &self,
        owner: AssetOwner,
        slot: AssetSlot,
        previous: Option<&str>,
        file: &UploadFile,
        mirror: Option<&Mirror>,
    ) -> Result<StoredAsset> {
        let staged = self.stage(slot.folder(), slot.scope(), file, mirror).await?;

        if let Err(e) = self.set_pointer(owner, slot, Some(&staged.url)).await {
            self.discard(&staged, mirror).await;
            return Err(e);
        }
        debug!("{} of {} now points at {}", slot, owner, staged.url);

        let Some(previous) = previous else {
            info!("Stored {} for {} at {}", slot, owner, staged.url);
            return Ok(staged);
        };

        if let Some(mirror) = mirror {
            if let Err(e) = self.delete_remote(mirror, previous).await {
                warn!("Rolling back {} of {}: {}", slot, owner, e);
                match self.set_pointer(owner, slot, Some(previous)).await {
                    Ok(()) => self.discard(&staged, Some(mirror)).await,
                    // Keep the staged file so the pointer stays valid
                    Err(revert) => error!(
                        "Could not restore {} of {} to {}: {}",
                        slot, owner, previous, revert
                    ),
                }
                return Err(e);
            }
        }

        match self.delete_local(previous).await {
            Ok(true) => debug!("Removed previous asset {}", previous),
            Ok(false) => debug!("Previous asset {} was already gone", previous),
            Err(e) => warn!("Could not remove previous asset {}: {}", previous, e),
        }

        info!("Replaced {} of {} with {}", slot, owner, staged.url);
        Ok(staged)
    }

    /// Write the file locally, then forward it to the mirror if there is one
    async fn stage(
        &self,
        folder: &str,
        scope: &str,
        file: &UploadFile,
        mirror: Option<&Mirror>,
    ) -> Result<StoredAsset> {
        let url = self.write_local(folder, file).await?;

        let Some(mirror) = mirror else {
            return Ok(StoredAsset { url, remote: None });
        };

        let upload = RemoteUpload {
            file_name: &file.file_name,
            content_type: &file.content_type,
            data: file.data.clone(),
            folder,
            scope,
            template_id: Some(mirror.template_id),
        };
        match self.remote.upload(&mirror.base_url, upload).await {
            Ok(ack) => {
                if let Some(remote) = remote_url(&ack) {
                    info!("Template {} stored {} as {}", mirror.template_id, url, remote);
                }
                Ok(StoredAsset {
                    url,
                    remote: Some(ack),
                })
            }
            Err(RemoteError::Unreachable(e)) => {
                warn!(
                    "Template {} unreachable, {} is not mirrored: {}",
                    mirror.template_id, url, e
                );
                Ok(StoredAsset { url, remote: None })
            }
            Err(e) => {
                self.discard_local(&url).await;
                Err(ServerError::RemoteUploadFailed(e.to_string()))
            }
        }
    }

    async fn write_local(&self, folder: &str, file: &UploadFile) -> Result<String> {
        if !is_valid_folder(folder) {
            return Err(ServerError::InvalidRequest(format!("Invalid folder: {:?}", folder)));
        }

        let millis = chrono::Utc::now().timestamp_millis();
        for offset in 0..NAME_ATTEMPTS {
            let name = file.stamped_name(millis + offset);
            let taken = self
                .store
                .exists(&relative_path(folder, &name))
                .await
                .map_err(local_write_failed)?;
            if taken {
                continue;
            }
            return self
                .store
                .put(folder, &name, file.data.clone())
                .await
                .map_err(local_write_failed);
        }

        Err(ServerError::LocalWriteFailed(format!(
            "no free name for {} in {}",
            file.file_name, folder
        )))
    }

    async fn delete_remote(&self, mirror: &Mirror, path: &str) -> Result<Option<Json>> {
        match self.remote.delete_file(&mirror.base_url, path).await {
            Ok(ack) => Ok(Some(ack)),
            Err(RemoteError::Unreachable(e)) => {
                warn!(
                    "Template {} unreachable, {} may linger there: {}",
                    mirror.template_id, path, e
                );
                Ok(None)
            }
            Err(e) => Err(ServerError::RemoteDeleteFailed(e.to_string())),
        }
    }

    /// Remove a local file; a missing file counts as removed
    async fn delete_local(&self, path: &str) -> Result<bool> {
        match self.store.delete(path).await {
            Ok(removed) => Ok(removed),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn discard_local(&self, path: &str) {
        if let Err(e) = self.store.delete(path).await {
            warn!("Could not discard staged file {}: {}", path, e);
        }
    }

    async fn discard(&self, staged: &StoredAsset, mirror: Option<&Mirror>) {
        self.discard_local(&staged.url).await;

        let remote_path = staged.remote.as_ref().and_then(remote_url);
        if let (Some(mirror), Some(remote_path)) = (mirror, remote_path) {
            if let Err(e) = self.remote.delete_file(&mirror.base_url, remote_path).await {
                warn!(
                    "Could not discard {} on template {}: {}",
                    remote_path, mirror.template_id, e
                );
            }
        }
    }

    async fn set_pointer(&self, owner: AssetOwner, slot: AssetSlot, path: Option<&str>) -> Result<()> {
        let value = Value::from(path.map(str::to_string));

        let rows = match (owner, slot.event_column()) {
            (AssetOwner::Event(id), Some(column)) => {
                event::Entity::update_many()
                    .col_expr(column, Expr::value(value))
                    .filter(event::Column::Id.eq(id))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            (AssetOwner::Merchant(id), None) => {
                merchant::Entity::update_many()
                    .col_expr(merchant::Column::Logo, Expr::value(value))
                    .filter(merchant::Column::Id.eq(id))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            _ => {
                return Err(ServerError::Internal(format!("{} has no {} slot", owner, slot)));
            }
        };

        if rows == 0 {
            return Err(match owner {
                AssetOwner::Event(id) => ServerError::EventNotFound(id),
                AssetOwner::Merchant(id) => {
                    ServerError::NotFound(format!("Merchant {} not found", id))
                }
            });
        }
        Ok(())
    }
}

fn local_write_failed(e: StorageError) -> ServerError {
    match e {
        StorageError::InvalidPath(path) => {
            ServerError::InvalidRequest(format!("Invalid path: {}", path))
        }
        other => ServerError::LocalWriteFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        closed_base_url, image, seed_event, seed_merchant, seed_template, serve, set_event_asset,
        TestEnv, TestRemote,
    };
    use bytes::Bytes;

    async fn find_event(env: &TestEnv, id: i32) -> event::Model {
        event::Entity::find_by_id(id).one(&env.db).await.unwrap().unwrap()
    }

    /// An event whose venue slot already holds a stored file
    async fn event_with_venue(env: &TestEnv, template_id: Option<i32>) -> (event::Model, String) {
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let event = seed_event(&env.db, merchant.id, template_id).await;
        let previous = env
            .store
            .put("event", "1000-old.jpg", Bytes::from_static(b"old"))
            .await
            .unwrap();
        set_event_asset(&env.db, event.id, AssetSlot::ImageVenue, Some(&previous)).await;
        (find_event(env, event.id).await, previous)
    }

    #[tokio::test]
    async fn test_rejects_non_image_before_touching_anything() {
        let env = TestEnv::new().await;
        let (event, previous) = event_with_venue(&env, None).await;

        let file = UploadFile::new("notes.txt", "text/plain", Bytes::from_static(b"hello"));
        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, file)
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::InvalidFile(_)));
        assert_eq!(env.store.get(&previous).await.unwrap().as_ref(), b"old");
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(previous.clone()));
        assert_eq!(env.store.list("event").await.unwrap(), vec![previous]);
    }

    #[tokio::test]
    async fn test_rejects_oversize_before_touching_anything() {
        let env = TestEnv::new().await;
        let (event, previous) = event_with_venue(&env, None).await;

        let file = image("huge.png", 2 * 1024 * 1024 + 1);
        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, file)
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::InvalidFile(_)));
        assert!(env.store.exists(&previous).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(previous));
    }

    #[tokio::test]
    async fn test_first_upload_without_template() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        // A template exists but the event does not use it
        seed_template(&env.db, 5, &remote.base_url()).await;
        let event = seed_event(&env.db, merchant.id, None).await;

        let file = image("venue.jpg", 1536 * 1024);
        let stored = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, file.clone())
            .await
            .unwrap();

        assert!(stored.url.starts_with("/uploads/event/"));
        assert!(stored.url.ends_with("-venue.jpg"));
        assert!(stored.remote.is_none());
        assert_eq!(env.store.get(&stored.url).await.unwrap(), file.data);
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(stored.url));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_upload_with_template_issues_no_delete() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        seed_template(&env.db, 5, &remote.base_url()).await;
        let event = seed_event(&env.db, merchant.id, Some(5)).await;

        let stored = env
            .sync
            .replace_event_asset(event.id, AssetSlot::HeroImage, image("hero.png", 64))
            .await
            .unwrap();

        assert!(stored.remote.is_some());
        assert_eq!(find_event(&env, event.id).await.hero_image, Some(stored.url));
        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].route, "upload");
    }

    #[tokio::test]
    async fn test_rejected_remote_delete_keeps_previous_asset() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        remote.fail_deletes(500);
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::RemoteDeleteFailed(_)));
        // Previous file still readable and still referenced, nothing new left behind
        assert_eq!(env.store.get(&previous).await.unwrap().as_ref(), b"old");
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(previous.clone()));
        assert_eq!(env.store.list("event").await.unwrap(), vec![previous.clone()]);

        let calls = remote.calls();
        assert_eq!(calls[0].route, "upload");
        assert_eq!(calls[1].route, "delete-file");
        assert_eq!(calls[1].field("filePath"), Some(previous.as_str()));
    }

    #[tokio::test]
    async fn test_mirrored_replace() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        let stored = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap();

        assert!(stored.remote.is_some());
        assert!(!env.store.exists(&previous).await.unwrap());
        assert!(env.store.exists(&stored.url).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(stored.url));

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].route, "upload");
        assert_eq!(calls[0].field("folder"), Some("event"));
        assert_eq!(calls[0].field("scope"), Some("event"));
        assert_eq!(calls[0].field("template_id"), Some("5"));
        assert_eq!(calls[1].route, "delete-file");
        assert_eq!(calls[1].field("filePath"), Some(previous.as_str()));
    }

    #[tokio::test]
    async fn test_rejected_remote_upload_leaves_no_staged_file() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        remote.fail_uploads(502);
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::RemoteUploadFailed(_)));
        assert_eq!(env.store.list("event").await.unwrap(), vec![previous.clone()]);
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(previous));
        // No delete was attempted
        assert!(remote.calls().iter().all(|call| call.route == "upload"));
    }

    #[tokio::test]
    async fn test_unreachable_mirror_is_tolerated() {
        let env = TestEnv::new().await;
        seed_template(&env.db, 7, &closed_base_url().await).await;
        let (event, previous) = event_with_venue(&env, Some(7)).await;

        let stored = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap();

        assert!(stored.remote.is_none());
        assert!(!env.store.exists(&previous).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(stored.url));
    }

    #[tokio::test]
    async fn test_previous_already_missing_on_disk() {
        let env = TestEnv::new().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let event = seed_event(&env.db, merchant.id, None).await;
        set_event_asset(&env.db, event.id, AssetSlot::HeroImage, Some("/uploads/event/1-gone.jpg")).await;

        let stored = env
            .sync
            .replace_event_asset(event.id, AssetSlot::HeroImage, image("hero.png", 32))
            .await
            .unwrap();

        assert!(env.store.exists(&stored.url).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.hero_image, Some(stored.url));
    }

    #[tokio::test]
    async fn test_concurrent_replace_is_refused() {
        let env = TestEnv::new().await;
        let (event, previous) = event_with_venue(&env, None).await;

        let _held = env
            .sync
            .in_flight
            .try_acquire(AssetOwner::Event(event.id), AssetSlot::ImageVenue)
            .unwrap();

        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::SlotBusy(_)));
        assert_eq!(env.store.list("event").await.unwrap(), vec![previous]);

        // The other slot is free
        env.sync
            .replace_event_asset(event.id, AssetSlot::HeroImage, image("hero.jpg", 64))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let env = TestEnv::new().await;
        let (event, _) = event_with_venue(&env, None).await;

        let bad = UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"x"));
        assert!(env.sync.replace_event_asset(event.id, AssetSlot::ImageVenue, bad).await.is_err());
        assert!(!env
            .sync
            .in_flight
            .is_active(AssetOwner::Event(event.id), AssetSlot::ImageVenue));

        let missing = env
            .sync
            .replace_event_asset(9999, AssetSlot::ImageVenue, image("a.jpg", 8))
            .await
            .unwrap_err();
        assert!(matches!(missing, ServerError::EventNotFound(9999)));
        assert!(!env.sync.in_flight.is_active(AssetOwner::Event(9999), AssetSlot::ImageVenue));
    }

    #[tokio::test]
    async fn test_missing_template_is_reported() {
        let env = TestEnv::new().await;
        let (event, previous) = event_with_venue(&env, Some(42)).await;

        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::TemplateNotFound(42)));
        assert_eq!(env.store.list("event").await.unwrap(), vec![previous]);
    }

    #[tokio::test]
    async fn test_remove_event_asset() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        let ack = env.sync.remove_event_asset(event.id, AssetSlot::ImageVenue).await.unwrap();
        assert!(ack.is_some());
        assert!(!env.store.exists(&previous).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.image_venue, None);

        // Removing an empty slot does nothing
        let ack = env.sync.remove_event_asset(event.id, AssetSlot::ImageVenue).await.unwrap();
        assert!(ack.is_none());
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_aborts_on_rejected_remote_delete() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        remote.fail_deletes(500);
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        let err = env.sync.remove_event_asset(event.id, AssetSlot::ImageVenue).await.unwrap_err();
        assert!(matches!(err, ServerError::RemoteDeleteFailed(_)));
        assert!(env.store.exists(&previous).await.unwrap());
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(previous));
    }

    #[tokio::test]
    async fn test_apply_template_clears_slots() {
        let env = TestEnv::new().await;
        let old_remote = TestRemote::spawn().await;
        seed_template(&env.db, 1, &old_remote.base_url()).await;
        seed_template(&env.db, 2, "https://new.example").await;
        let (event, venue) = event_with_venue(&env, Some(1)).await;
        let hero = env
            .store
            .put("event", "2000-hero.jpg", Bytes::from_static(b"hero"))
            .await
            .unwrap();
        set_event_asset(&env.db, event.id, AssetSlot::HeroImage, Some(&hero)).await;

        let updated = env.sync.apply_template(event.id, 2).await.unwrap();

        assert_eq!(updated.template_id, Some(2));
        assert_eq!(updated.image_venue, None);
        assert_eq!(updated.hero_image, None);
        assert!(env.store.list("event").await.unwrap().is_empty());

        let deleted: Vec<String> = old_remote
            .calls()
            .iter()
            .filter_map(|call| call.field("filePath").map(str::to_string))
            .collect();
        assert_eq!(deleted, vec![venue, hero]);

        let err = env.sync.apply_template(event.id, 99).await.unwrap_err();
        assert!(matches!(err, ServerError::TemplateNotFound(99)));
    }

    #[tokio::test]
    async fn test_slot_state() {
        let env = TestEnv::new().await;
        let (event, previous) = event_with_venue(&env, None).await;

        let (path, state) = env.sync.slot_state(event.id, AssetSlot::ImageVenue).await.unwrap();
        assert_eq!(path, Some(previous.clone()));
        assert_eq!(state, SlotState::Present);

        let (path, state) = env.sync.slot_state(event.id, AssetSlot::HeroImage).await.unwrap();
        assert_eq!(path, None);
        assert_eq!(state, SlotState::Empty);

        env.store.delete(&previous).await.unwrap();
        let (_, state) = env.sync.slot_state(event.id, AssetSlot::ImageVenue).await.unwrap();
        assert_eq!(state, SlotState::Orphaned);
    }

    #[tokio::test]
    async fn test_replace_merchant_logo() {
        let env = TestEnv::new().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;

        let first = env
            .sync
            .replace_merchant_logo(merchant.id, image("logo.png", 16))
            .await
            .unwrap();
        assert!(first.url.starts_with("/uploads/merchant/"));

        let second = env
            .sync
            .replace_merchant_logo(merchant.id, image("logo.webp", 16))
            .await
            .unwrap();
        assert!(!env.store.exists(&first.url).await.unwrap());

        let stored = merchant::Entity::find_by_id(merchant.id)
            .one(&env.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.logo, Some(second.url));
    }

    #[tokio::test]
    async fn test_same_name_twice_gets_distinct_paths() {
        let env = TestEnv::new().await;

        let a = env.sync.upload("general", "general", &image("a.jpg", 4), None).await.unwrap();
        let b = env.sync.upload("general", "general", &image("a.jpg", 4), None).await.unwrap();
        assert_ne!(a.url, b.url);
        assert_eq!(env.store.list("general").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_an_error() {
        let env = TestEnv::new().await;
        let stored = env.sync.upload("event", "event", &image("a.jpg", 4), None).await.unwrap();

        env.sync.delete(&stored.url, None).await.unwrap();
        env.sync.delete(&stored.url, None).await.unwrap();
        assert!(!env.store.exists(&stored.url).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_reference_and_release() {
        let env = TestEnv::new().await;
        let remote = TestRemote::spawn().await;
        seed_template(&env.db, 5, &remote.base_url()).await;
        let (event, previous) = event_with_venue(&env, Some(5)).await;

        // The leading slash is optional
        let reference = env
            .sync
            .find_reference(previous.trim_start_matches('/'))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reference.owner, AssetOwner::Event(event.id));
        assert_eq!(reference.slot, AssetSlot::ImageVenue);
        assert_eq!(reference.merchant_id, event.merchant_id);
        assert_eq!(reference.path, previous);

        let ack = env.sync.release(&reference).await.unwrap();
        assert!(ack.is_some());
        assert!(!env.store.exists(&previous).await.unwrap());
        let (path, state) = env.sync.slot_state(event.id, AssetSlot::ImageVenue).await.unwrap();
        assert_eq!((path, state), (None, SlotState::Empty));
        assert_eq!(remote.calls()[0].field("filePath"), Some(previous.as_str()));

        // Once released the path is no longer referenced, and a stale
        // reference is refused
        assert!(env.sync.find_reference(&previous).await.unwrap().is_none());
        let err = env.sync.release(&reference).await.unwrap_err();
        assert!(matches!(err, ServerError::SlotBusy(_)));
    }

    #[tokio::test]
    async fn test_find_reference_for_logo() {
        let env = TestEnv::new().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let logo = env
            .sync
            .replace_merchant_logo(merchant.id, image("logo.png", 16))
            .await
            .unwrap();

        let reference = env.sync.find_reference(&logo.url).await.unwrap().unwrap();
        assert_eq!(reference.owner, AssetOwner::Merchant(merchant.id));
        assert_eq!(reference.slot, AssetSlot::Logo);

        env.sync.release(&reference).await.unwrap();
        assert!(!env.store.exists(&logo.url).await.unwrap());
        let stored = merchant::Entity::find_by_id(merchant.id)
            .one(&env.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.logo, None);

        assert!(env.sync.find_reference("/uploads/event/none.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_placeholder_path_is_orphaned() {
        let env = TestEnv::new().await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let event = seed_event(&env.db, merchant.id, None).await;
        set_event_asset(&env.db, event.id, AssetSlot::HeroImage, Some("/placeholder.png")).await;

        let (_, state) = env.sync.slot_state(event.id, AssetSlot::HeroImage).await.unwrap();
        assert_eq!(state, SlotState::Orphaned);
    }

    #[tokio::test]
    async fn test_mirror_to_another_deployment() {
        let mirror = TestEnv::with_mirror_secret("shared").await;
        let mirror_url = serve(mirror.router()).await;

        let env = TestEnv::with_mirror_secret("shared").await;
        seed_template(&env.db, 5, &mirror_url).await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let event = seed_event(&env.db, merchant.id, Some(5)).await;

        let first = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap();
        let mirrored = first.remote.as_ref().and_then(remote_url).unwrap().to_string();
        assert!(mirror.store.exists(&mirrored).await.unwrap());

        // Replacing deletes the previous path on the mirror too
        let second = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue2.jpg", 64))
            .await
            .unwrap();
        assert!(second.remote.is_some());
        assert_eq!(find_event(&env, event.id).await.image_venue, Some(second.url));
    }

    #[tokio::test]
    async fn test_mirror_with_wrong_secret_is_rejected() {
        let mirror = TestEnv::with_mirror_secret("shared").await;
        let mirror_url = serve(mirror.router()).await;

        let env = TestEnv::with_mirror_secret("guess").await;
        seed_template(&env.db, 5, &mirror_url).await;
        let merchant = seed_merchant(&env.db, "owner@example.com", "secret").await;
        let event = seed_event(&env.db, merchant.id, Some(5)).await;

        let err = env
            .sync
            .replace_event_asset(event.id, AssetSlot::ImageVenue, image("venue.jpg", 64))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::RemoteUploadFailed(ref msg) if msg.starts_with("HTTP 401")));
        assert!(env.store.list("event").await.unwrap().is_empty());
        assert!(mirror.store.list("event").await.unwrap().is_empty());
    }
}
