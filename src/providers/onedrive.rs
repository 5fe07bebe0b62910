//! OneDrive Storage Provider
//!
//! Microsoft Graph API, id-addressed (`root` is the root folder id). Requests
//! carry a bearer token that is refreshed through the `oauth2` crate when it is
//! about to expire or when Graph answers 401. Refreshed tokens are pushed to
//! the session sink so a restart does not resurrect a revoked pair.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;
use url::Url;

use super::http_retry::{build_client, check_status, map_send_error, send_with_retry};
use super::oauth2::{StoredTokens, TokenRefresher};
use super::session::{self, SessionSink};
use super::{
    parse_timestamp, AccessPolicy, ConflictResolution, DeleteMode, Entity, EntityMeta, FileEntry, FileProvider,
    FolderEntry, ItemOutcome, ListingState, ProviderError, ProviderType, RootFolderType, TransferMode, User,
};
use crate::config::CoreConfig;

const ROOT_ID: &str = "root";

/// OneDrive item metadata
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
    #[serde(default)]
    folder: Option<FolderFacet>,
    #[serde(default)]
    parent_reference: Option<ParentReference>,
    #[serde(default)]
    created_by: Option<IdentitySet>,
    #[serde(default)]
    last_modified_by: Option<IdentitySet>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    child_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ParentReference {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentitySet {
    user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    id: Option<String>,
    display_name: Option<String>,
}

impl IdentitySet {
    fn to_user(&self) -> Option<User> {
        let identity = self.user.as_ref()?;
        Some(User {
            user_id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            ..Default::default()
        })
    }
}

/// List children response
#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

/// Status document behind the `Location` of an async copy
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopyMonitor {
    status: String,
    resource_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OneDriveSession {
    #[serde(rename = "type")]
    kind: ProviderType,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    expiration: Option<f64>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    id: Option<String>,
}

/// OneDrive provider
pub struct OneDriveProvider {
    config: Arc<CoreConfig>,
    api_base: String,
    client: Client,
    tokens: RwLock<StoredTokens>,
    refresher: TokenRefresher,
    /// Serializes refresh exchanges
    refresh_lock: tokio::sync::Mutex<()>,
    sink: Option<Arc<dyn SessionSink>>,
    user: Option<User>,
    listing: ListingState,
}

impl OneDriveProvider {
    /// Adapter for tokens obtained by an external login flow
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        config: Arc<CoreConfig>,
    ) -> Result<Self, ProviderError> {
        Self::with_tokens(StoredTokens::new(access_token, refresh_token, expires_in), None, config)
    }

    /// Rebuild from a stored session. Expired tokens still load; the first
    /// request refreshes them.
    pub fn deserialize(raw: &str, config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        let stored: OneDriveSession = session::decode(raw)?;
        if stored.kind != ProviderType::OneDrive {
            return Err(ProviderError::InvalidConfig(format!("Not a OneDrive session: {}", stored.kind)));
        }
        let tokens = StoredTokens {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at: stored.expiration.map(|secs| secs as i64),
        };
        Self::with_tokens(tokens, stored.user, config)
    }

    fn with_tokens(tokens: StoredTokens, user: Option<User>, config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        Ok(Self {
            api_base: config.onedrive.api_base.trim_end_matches('/').to_string(),
            client: build_client(&config.http)?,
            refresher: TokenRefresher::new(&config.onedrive, &config.http)?,
            tokens: RwLock::new(tokens),
            refresh_lock: tokio::sync::Mutex::new(()),
            sink: None,
            user,
            listing: ListingState::default(),
            config,
        })
    }

    fn read_tokens(&self) -> RwLockReadGuard<'_, StoredTokens> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner())
    }

    fn store_tokens(&self, tokens: StoredTokens) {
        *self.tokens.write().unwrap_or_else(|e| e.into_inner()) = tokens;
    }

    /// Build path for item ID
    fn api_item(&self, item_id: &str) -> String {
        if item_id == ROOT_ID {
            format!("{}/me/drive/root", self.api_base)
        } else {
            format!("{}/me/drive/items/{}", self.api_base, urlencoding::encode(item_id))
        }
    }

    /// `url` with `@microsoft.graph.conflictBehavior` set
    fn with_conflict_behavior(url: &str, behavior: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(url).map_err(|e| ProviderError::InvalidConfig(format!("Invalid URL {}: {}", url, e)))?;
        url.query_pairs_mut().append_pair("@microsoft.graph.conflictBehavior", behavior);
        Ok(url)
    }

    /// Current access token, refreshed first when it is about to expire
    async fn access_token(&self) -> Result<String, ProviderError> {
        let (token, expired) = {
            let tokens = self.read_tokens();
            (tokens.access_token.clone(), tokens.is_expired())
        };
        if !expired {
            return Ok(token);
        }
        tracing::info!("[OneDrive] Access token expired, refreshing");
        self.refresh(&token).await?;
        Ok(self.read_tokens().access_token.clone())
    }

    /// Exchange the refresh token unless another request already replaced
    /// `stale` while this one waited for the lock
    async fn refresh(&self, stale: &str) -> Result<(), ProviderError> {
        let _guard = self.refresh_lock.lock().await;
        let refresh_token = {
            let tokens = self.read_tokens();
            if tokens.access_token != stale {
                return Ok(());
            }
            tokens.refresh_token.clone()
        };
        let refresh_token = refresh_token.ok_or_else(|| ProviderError::AuthExpired {
            message: "Access token expired".to_string(),
            refresh_failure: Some("no refresh token stored".to_string()),
        })?;

        let tokens = self.refresher.refresh(&refresh_token).await?;
        self.store_tokens(tokens);
        self.publish_session();
        Ok(())
    }

    /// Push the current session to the sink
    fn publish_session(&self) {
        let (Some(sink), Some(id)) = (self.sink.as_ref(), self.id()) else {
            return;
        };
        match self.serialize() {
            Ok(raw) => sink.session_updated(&id, &raw),
            Err(e) => tracing::warn!("[OneDrive] Failed to encode refreshed session: {}", e),
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let request = builder.build().map_err(map_send_error)?;
        send_with_retry(&self.client, request, &self.config.retry)
            .await
            .map_err(map_send_error)
    }

    /// Send an authorized request. A 401 triggers one refresh and one retry.
    async fn send<F>(&self, build: F, context: &str) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.access_token().await?;
        let response = self.execute(build(&self.client).bearer_auth(&token)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, context).await;
        }

        tracing::info!("[OneDrive] Token rejected, refreshing");
        self.refresh(&token).await?;
        let token = self.read_tokens().access_token.clone();
        let response = self.execute(build(&self.client).bearer_auth(&token)).await?;
        check_status(response, context).await
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Graph response: {}", e)))
    }

    async fn get_item(&self, item_id: &str) -> Result<DriveItem, ProviderError> {
        let url = self.api_item(item_id);
        let response = self.send(|c| c.get(&url), &format!("get item {}", item_id)).await?;
        Self::json(response).await
    }

    /// List children with pagination
    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>, ProviderError> {
        let mut all_items = Vec::new();
        let mut url = format!("{}/children", self.api_item(item_id));

        loop {
            let response = self.send(|c| c.get(&url), &format!("list {}", item_id)).await?;
            let page: ChildrenResponse = Self::json(response).await?;
            all_items.extend(page.value);

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(all_items)
    }

    fn to_entity(&self, item: DriveItem) -> Entity {
        let mut meta = EntityMeta::new(item.id, item.name);
        meta.created = item.created_date_time.as_deref().and_then(parse_timestamp);
        meta.updated = item.last_modified_date_time.as_deref().and_then(parse_timestamp);
        meta.parent_id = item.parent_reference.and_then(|p| p.id);
        meta.root_folder_type = RootFolderType::OnedriveAll;
        meta.provider_type = Some(ProviderType::OneDrive);
        meta.created_by = item
            .created_by
            .as_ref()
            .and_then(IdentitySet::to_user)
            .or_else(|| self.user.clone());
        meta.updated_by = item.last_modified_by.as_ref().and_then(IdentitySet::to_user);

        match item.folder {
            Some(facet) => {
                let mut folder = FolderEntry::new(meta);
                if facet.child_count == Some(0) {
                    folder.files_count = 0;
                    folder.folders_count = 0;
                }
                Entity::Folder(folder)
            }
            None => Entity::File(FileEntry::new(meta, item.size)),
        }
    }

    fn to_file(&self, item: DriveItem) -> Result<FileEntry, ProviderError> {
        match self.to_entity(item) {
            Entity::File(file) => Ok(file),
            Entity::Folder(folder) => Err(ProviderError::NameConflict(format!("{} is a folder", folder.meta.title))),
        }
    }

    /// Wait for an async copy behind `monitor` and return the new item id
    async fn wait_for_copy(&self, monitor: &str) -> Result<String, ProviderError> {
        let interval = Duration::from_millis(self.config.operations.poll_interval_ms);
        for _ in 0..self.config.operations.max_polls {
            let response = self
                .execute(self.client.get(monitor))
                .await
                .map_err(|e| ProviderError::OperationFailed(format!("Copy status unavailable: {}", e)))?;
            let response = check_status(response, "copy status")
                .await
                .map_err(|e| ProviderError::OperationFailed(e.to_string()))?;
            let status: CopyMonitor = Self::json(response)
                .await
                .map_err(|e| ProviderError::OperationFailed(e.to_string()))?;

            match status.status.as_str() {
                "completed" => {
                    return status
                        .resource_id
                        .ok_or_else(|| ProviderError::OperationFailed("Copy finished without an item id".to_string()));
                }
                "failed" => {
                    let detail = status.error.map(|e| e.to_string()).unwrap_or_default();
                    return Err(ProviderError::OperationFailed(format!("Copy failed {}", detail).trim().to_string()));
                }
                other => tracing::debug!("[OneDrive] Copy {}", other),
            }
            tokio::time::sleep(interval).await;
        }
        Err(ProviderError::OperationFailed("Copy did not finish in time".to_string()))
    }
}

#[async_trait]
impl FileProvider for OneDriveProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OneDrive
    }

    /// The token pair rotates; the account does not
    fn id(&self) -> Option<String> {
        let user_id = self.user.as_ref()?.user_id.as_deref()?;
        Some(session::session_id(&[&self.api_base, user_id]))
    }

    fn root_folder(&self) -> FolderEntry {
        let mut meta = EntityMeta::new(ROOT_ID, ProviderType::OneDrive.to_string());
        meta.root_folder_type = RootFolderType::OnedriveAll;
        meta.provider_type = Some(ProviderType::OneDrive);
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
        let tokens = self.read_tokens().clone();
        session::encode(&OneDriveSession {
            kind: ProviderType::OneDrive,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expiration: tokens.expires_at.map(|secs| secs as f64),
            user: self.user.clone(),
            id: self.id(),
        })
    }

    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError> {
        let mut copy = Self::deserialize(&self.serialize()?, self.config.clone())?;
        copy.listing = self.listing.clone();
        copy.sink = self.sink.clone();
        Ok(Box::new(copy))
    }

    fn set_session_sink(&mut self, sink: Arc<dyn SessionSink>) {
        self.sink = Some(sink);
    }

    async fn is_reachable(&mut self) -> Result<(), ProviderError> {
        self.user_info().await.map(|_| ())
    }

    async fn user_info(&mut self) -> Result<User, ProviderError> {
        let url = format!("{}/me", self.api_base);
        let response = self.send(|c| c.get(&url), "user info").await?;
        let me: GraphUser = Self::json(response).await?;

        let user = User {
            user_id: Some(me.id),
            display_name: me.display_name,
            email: me.mail.or(me.user_principal_name),
            department: Some(ProviderType::OneDrive.to_string()),
            ..Default::default()
        };
        tracing::info!("[OneDrive] Signed in as {}", user.display_name.as_deref().unwrap_or("unknown"));
        self.user = Some(user.clone());
        Ok(user)
    }

    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let items = self.list_children(&folder.meta.id).await?;
        Ok(items.into_iter().map(|item| self.to_entity(item)).collect())
    }

    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError> {
        let title = super::naming::renamed_title(entity.title(), new_name, entity.is_folder());
        let url = self.api_item(entity.id());
        let body = serde_json::json!({ "name": title });

        let response = self
            .send(|c| c.patch(&url).json(&body), &format!("rename {}", entity.title()))
            .await?;
        tracing::info!("[OneDrive] Renamed {} to {}", entity.title(), title);
        Ok(self.to_entity(Self::json(response).await?))
    }

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError> {
        let url = format!("{}/children", self.api_item(&parent.meta.id));
        let body = serde_json::json!({
            "name": name.trim(),
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        });

        let response = self.send(|c| c.post(&url).json(&body), &format!("create {}", name)).await?;
        match self.to_entity(Self::json(response).await?) {
            Entity::Folder(folder) => Ok(folder),
            Entity::File(file) => Err(ProviderError::NameConflict(format!("{} is a file", file.meta.title))),
        }
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/content", self.api_item(&file.meta.id));
        let response = self.send(|c| c.get(&url), &format!("download {}", file.meta.title)).await?;
        let bytes = response.bytes().await.map_err(map_send_error)?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        parent: &FolderEntry,
        name: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<FileEntry, ProviderError> {
        let path = format!("{}:/{}:/content", self.api_item(&parent.meta.id), urlencoding::encode(name));
        let url = Self::with_conflict_behavior(&path, if overwrite { "replace" } else { "fail" })?;
        let content_type = mime_guess::from_path(name).first_or_octet_stream();
        tracing::debug!("[OneDrive] Uploading {} ({} bytes)", name, data.len());

        let response = self
            .send(
                |c| {
                    c.put(url.clone())
                        .header("Content-Type", content_type.as_ref())
                        .body(data.clone())
                },
                &format!("upload {}", name),
            )
            .await?;
        self.to_file(Self::json(response).await?)
    }

    /// Graph moves deleted items to the recycle bin
    async fn delete_item(&self, entity: &Entity, _mode: DeleteMode) -> Result<(), ProviderError> {
        let url = self.api_item(entity.id());
        self.send(|c| c.delete(&url), &format!("delete {}", entity.title())).await?;
        tracing::info!("[OneDrive] Deleted {}", entity.title());
        Ok(())
    }

    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError> {
        let existing = self.list_children(&dest.meta.id).await?;
        if let Some(conflict) = existing.iter().find(|i| i.name == item.title()) {
            match resolution {
                ConflictResolution::Skip => return Ok(ItemOutcome::Skipped),
                ConflictResolution::Overwrite if conflict.id == item.id() => {
                    return Ok(ItemOutcome::Transferred(item.clone()));
                }
                _ => {}
            }
        }

        let behavior = match resolution {
            ConflictResolution::Skip => "fail",
            ConflictResolution::Overwrite => "replace",
            ConflictResolution::Duplicate => "rename",
        };
        let body = serde_json::json!({
            "parentReference": { "id": dest.meta.id },
            "name": item.title(),
        });

        match mode {
            TransferMode::Move => {
                let url = Self::with_conflict_behavior(&self.api_item(item.id()), behavior)?;
                let response = self
                    .send(|c| c.patch(url.clone()).json(&body), &format!("move {}", item.title()))
                    .await?;
                Ok(ItemOutcome::Transferred(self.to_entity(Self::json(response).await?)))
            }
            TransferMode::Copy => {
                let url = Self::with_conflict_behavior(&format!("{}/copy", self.api_item(item.id())), behavior)?;
                let response = self
                    .send(|c| c.post(url.clone()).json(&body), &format!("copy {}", item.title()))
                    .await?;
                let monitor = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| ProviderError::OperationFailed("Copy accepted without a monitor URL".to_string()))?;

                let copied = self.wait_for_copy(&monitor).await?;
                Ok(ItemOutcome::Transferred(self.to_entity(self.get_item(&copied).await?)))
            }
        }
    }
}
