//! WebDAV Storage Provider
//!
//! One adapter for plain WebDAV servers, Nextcloud, ownCloud and Infomaniak
//! kDrive. The flavor only decides the endpoint URL and the reported provider
//! type; every request goes through `DavStorage`.
//!
//! Entity ids are absolute paths inside the endpoint. Listings are complete
//! per folder, so search and sort run locally.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::dav::{self, DavEntry, DavStorage};
use super::naming;
use super::session;
use super::{
    AccessPolicy, ConflictResolution, DeleteMode, Entity, EntityMeta, FileEntry, FileProvider, FolderEntry,
    ItemOutcome, ListingState, ProviderError, ProviderType, RootFolderType, TransferMode, User,
};
use crate::config::CoreConfig;

const KDRIVE_ENDPOINT: &str = "https://connect.drive.infomaniak.com";
const FILES_ENDPOINT: &str = "/remote.php/dav/files";

/// Which WebDAV-speaking backend an endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavFlavor {
    WebDav,
    Nextcloud,
    OwnCloud,
    KDrive,
}

impl DavFlavor {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            DavFlavor::WebDav => ProviderType::WebDav,
            DavFlavor::Nextcloud => ProviderType::Nextcloud,
            DavFlavor::OwnCloud => ProviderType::OwnCloud,
            DavFlavor::KDrive => ProviderType::KDrive,
        }
    }

    pub fn from_provider_type(kind: ProviderType) -> Option<Self> {
        match kind {
            ProviderType::WebDav => Some(DavFlavor::WebDav),
            ProviderType::Nextcloud => Some(DavFlavor::Nextcloud),
            ProviderType::OwnCloud => Some(DavFlavor::OwnCloud),
            ProviderType::KDrive => Some(DavFlavor::KDrive),
            _ => None,
        }
    }

    fn root_folder_type(&self) -> RootFolderType {
        match self {
            DavFlavor::WebDav => RootFolderType::WebdavAll,
            DavFlavor::Nextcloud => RootFolderType::NextcloudAll,
            DavFlavor::OwnCloud => RootFolderType::OwncloudAll,
            DavFlavor::KDrive => RootFolderType::KdriveAll,
        }
    }

    /// Endpoint URL for a server address typed by the user
    pub fn endpoint(&self, url: &str, username: &str) -> String {
        if *self == DavFlavor::KDrive {
            return KDRIVE_ENDPOINT.to_string();
        }

        let url = url.trim();
        let base = if url.contains("://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        let base = base.trim_end_matches('/');

        match self {
            DavFlavor::Nextcloud | DavFlavor::OwnCloud if !base.contains(FILES_ENDPOINT) => {
                format!("{}{}/{}", base, FILES_ENDPOINT, urlencoding::encode(username))
            }
            _ => base.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DavSession {
    #[serde(rename = "type")]
    kind: ProviderType,
    base_url: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    id: Option<String>,
}

/// WebDAV family provider
pub struct WebDavProvider {
    config: Arc<CoreConfig>,
    flavor: DavFlavor,
    base_url: String,
    storage: DavStorage,
    user: Option<User>,
    listing: ListingState,
}

impl WebDavProvider {
    pub fn new(
        flavor: DavFlavor,
        url: &str,
        username: &str,
        password: SecretString,
        config: Arc<CoreConfig>,
    ) -> Result<Self, ProviderError> {
        if username.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("User name is required".to_string()));
        }
        let base_url = flavor.endpoint(url, username);
        Self::with_endpoint(flavor, base_url, username, password, None, config)
    }

    /// Rebuild from a stored session
    pub fn deserialize(raw: &str, config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        let stored: DavSession = session::decode(raw)?;
        let flavor = DavFlavor::from_provider_type(stored.kind)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("Not a WebDAV session: {}", stored.kind)))?;
        let username = stored
            .user
            .as_ref()
            .and_then(|u| u.user_id.clone())
            .ok_or_else(|| ProviderError::InvalidConfig("WebDAV session has no user".to_string()))?;

        Self::with_endpoint(
            flavor,
            stored.base_url.trim_end_matches('/').to_string(),
            &username,
            SecretString::from(stored.password),
            stored.user,
            config,
        )
    }

    fn with_endpoint(
        flavor: DavFlavor,
        base_url: String,
        username: &str,
        password: SecretString,
        user: Option<User>,
        config: Arc<CoreConfig>,
    ) -> Result<Self, ProviderError> {
        let storage = DavStorage::new(&base_url, username, password, &config)?;
        let user = user.unwrap_or_else(|| account(flavor, username));
        tracing::debug!("[WebDAV] {} endpoint {}", flavor.provider_type(), base_url);
        Ok(Self {
            config,
            flavor,
            base_url,
            storage,
            user: Some(user),
            listing: ListingState::default(),
        })
    }

    pub fn flavor(&self) -> DavFlavor {
        self.flavor
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entity_from(&self, entry: DavEntry) -> Entity {
        let title = if entry.path == "/" {
            self.flavor.provider_type().to_string()
        } else {
            entry.name
        };
        let mut meta = EntityMeta::new(entry.path.clone(), title);
        meta.created = entry.created.or(entry.modified);
        meta.updated = entry.modified;
        meta.parent_id = dav::parent_path(&entry.path);
        meta.root_folder_type = self.flavor.root_folder_type();
        meta.provider_type = Some(self.flavor.provider_type());
        meta.created_by = self.user.clone();

        if entry.is_dir {
            Entity::Folder(FolderEntry::new(meta))
        } else {
            Entity::File(FileEntry::new(meta, entry.size))
        }
    }

    async fn taken_names(&self, folder: &str) -> Result<HashSet<String>, ProviderError> {
        Ok(self
            .storage
            .list(folder)
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }
}

/// The account a WebDAV login represents; the login is the user id
fn account(flavor: DavFlavor, username: &str) -> User {
    User {
        department: Some(flavor.provider_type().to_string()),
        ..User::new(username, username)
    }
}

#[async_trait]
impl FileProvider for WebDavProvider {
    fn provider_type(&self) -> ProviderType {
        self.flavor.provider_type()
    }

    fn id(&self) -> Option<String> {
        let user_id = self.user.as_ref().and_then(|u| u.user_id.as_deref()).unwrap_or_default();
        Some(session::session_id(&[
            &self.base_url,
            self.storage.password().expose_secret(),
            user_id,
        ]))
    }

    fn root_folder(&self) -> FolderEntry {
        let mut meta = EntityMeta::new("/", self.flavor.provider_type().to_string());
        meta.root_folder_type = self.flavor.root_folder_type();
        meta.provider_type = Some(self.flavor.provider_type());
        FolderEntry::new(meta)
    }

    fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::Open
    }

    fn listing(&self) -> &ListingState {
        &self.listing
    }

    fn listing_mut(&mut self) -> &mut ListingState {
        &mut self.listing
    }

    fn serialize(&self) -> Result<String, ProviderError> {
        session::encode(&DavSession {
            kind: self.flavor.provider_type(),
            base_url: self.base_url.clone(),
            password: self.storage.password().expose_secret().to_string(),
            user: self.user.clone(),
            id: self.id(),
        })
    }

    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError> {
        let mut copy = Self::deserialize(&self.serialize()?, self.config.clone())?;
        copy.listing = self.listing.clone();
        Ok(Box::new(copy))
    }

    async fn is_reachable(&mut self) -> Result<(), ProviderError> {
        tracing::info!("[WebDAV] Checking {}", self.base_url);
        self.storage.stat("/").await?;
        self.user_info().await?;
        Ok(())
    }

    async fn user_info(&mut self) -> Result<User, ProviderError> {
        let user = match self.user.take() {
            Some(user) => user,
            None => account(self.flavor, self.storage.username()),
        };
        self.user = Some(user.clone());
        Ok(user)
    }

    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let entries = self.storage.list(&folder.meta.id).await?;
        Ok(entries.into_iter().map(|entry| self.entity_from(entry)).collect())
    }

    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError> {
        let title = naming::renamed_title(entity.title(), new_name, entity.is_folder());
        let parent = dav::parent_path(entity.id()).unwrap_or_else(|| "/".to_string());
        let target = dav::join_path(&parent, &title);
        tracing::info!("[WebDAV] Renaming {} to {}", entity.id(), target);

        self.storage.move_to(entity.id(), &target, false).await?;

        let mut renamed = entity.clone();
        let meta = renamed.meta_mut();
        meta.id = target;
        meta.title = title;
        meta.updated = Some(Utc::now());
        Ok(renamed)
    }

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError> {
        let path = dav::join_path(&parent.meta.id, name.trim());
        self.storage.mkcol(&path).await?;

        let mut meta = EntityMeta::new(path, name.trim());
        meta.created = Some(Utc::now());
        meta.updated = meta.created;
        meta.parent_id = Some(dav::normalize_path(&parent.meta.id));
        meta.root_folder_type = self.flavor.root_folder_type();
        meta.provider_type = Some(self.flavor.provider_type());
        meta.created_by = self.user.clone();
        let mut folder = FolderEntry::new(meta);
        folder.files_count = 0;
        folder.folders_count = 0;
        Ok(folder)
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        self.storage.get(&file.meta.id).await
    }

    async fn upload(
        &self,
        parent: &FolderEntry,
        name: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<FileEntry, ProviderError> {
        let path = dav::join_path(&parent.meta.id, name);
        tracing::debug!("[WebDAV] Uploading {} ({} bytes)", path, data.len());
        self.storage.put(&path, data, overwrite).await?;

        match self.entity_from(self.storage.stat(&path).await?) {
            Entity::File(file) => Ok(file),
            Entity::Folder(_) => Err(ProviderError::NameConflict(format!("{} is a folder", path))),
        }
    }

    async fn delete_item(&self, entity: &Entity, _mode: DeleteMode) -> Result<(), ProviderError> {
        tracing::info!("[WebDAV] Deleting {}", entity.id());
        self.storage.delete(entity.id()).await
    }

    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError> {
        let source = dav::normalize_path(item.id());
        let mut target = dav::join_path(&dest.meta.id, dav::last_component(&source));

        let overwrite = if self.storage.exists(&target).await? {
            match resolution {
                ConflictResolution::Skip => return Ok(ItemOutcome::Skipped),
                ConflictResolution::Overwrite if target == source => {
                    return Ok(ItemOutcome::Transferred(item.clone()));
                }
                ConflictResolution::Overwrite => true,
                ConflictResolution::Duplicate => {
                    let taken = self.taken_names(&dest.meta.id).await?;
                    let name = naming::unique_name(item.title(), |candidate| taken.contains(candidate));
                    target = dav::join_path(&dest.meta.id, &name);
                    false
                }
            }
        } else {
            false
        };

        tracing::debug!("[WebDAV] {:?} {} -> {} (overwrite: {})", mode, source, target, overwrite);
        match mode {
            TransferMode::Copy => self.storage.copy_to(&source, &target, overwrite).await?,
            TransferMode::Move => self.storage.move_to(&source, &target, overwrite).await?,
        }

        let entry = self.storage.stat(&target).await?;
        Ok(ItemOutcome::Transferred(self.entity_from(entry)))
    }
}
