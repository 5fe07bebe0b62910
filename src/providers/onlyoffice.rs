//! ONLYOFFICE document server provider
//!
//! REST API under `api/2.0`. Every response is wrapped in a
//! `{"response": ..., "total": n}` envelope; failures carry `error.message`.
//! Listings are paginated server-side and copy, move and delete run as
//! server-side jobs that are polled until they finish.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::http_retry::{build_client, map_send_error, send_with_retry, status_error};
use super::session;
use super::{
    naming, parse_timestamp, AccessPolicy, ConflictResolution, DeleteMode, Entity, EntityAccess, EntityMeta,
    FetchError, FetchParams, FileEntry, FileProvider, FolderEntry, FolderListing, ItemOutcome, ListingState,
    ProviderError, ProviderType, RootFolderType, TransferMode, User,
};
use crate::config::CoreConfig;
use crate::transfer;

const API_PREFIX: &str = "api/2.0";
const ROOT_ID: &str = "@my";

/// File status bits
const STATUS_EDITING: u32 = 1;
const STATUS_FAVORITE: u32 = 32;

// ============ Wire Types ============

/// Ids arrive as numbers or strings depending on the server build
fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default)]
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    display_name: Option<String>,
    department: Option<String>,
    email: Option<String>,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    is_visitor: bool,
    avatar: Option<String>,
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        User {
            user_id: wire.id,
            display_name: wire.display_name,
            department: wire.department,
            email: wire.email,
            is_admin: wire.is_admin,
            is_visitor: wire.is_visitor,
            avatar: wire.avatar,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    #[serde(deserialize_with = "de_id")]
    id: String,
    title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    folder_id: Option<String>,
    #[serde(default)]
    pure_content_length: u64,
    /// Human readable size
    content_length: Option<String>,
    view_url: Option<String>,
    #[serde(default)]
    file_status: u32,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    access: EntityAccess,
    #[serde(default)]
    root_folder_type: RootFolderType,
    created: Option<String>,
    updated: Option<String>,
    created_by: Option<WireUser>,
    updated_by: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFolder {
    #[serde(deserialize_with = "de_id")]
    id: String,
    title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    parent_id: Option<String>,
    files_count: Option<i64>,
    folders_count: Option<i64>,
    #[serde(default)]
    provider_item: bool,
    #[serde(default)]
    access: EntityAccess,
    #[serde(default)]
    root_folder_type: RootFolderType,
    created: Option<String>,
    updated: Option<String>,
    created_by: Option<WireUser>,
    updated_by: Option<WireUser>,
}

/// Folder content page
#[derive(Debug, Deserialize)]
struct WirePath {
    #[serde(default)]
    files: Vec<WireFile>,
    #[serde(default)]
    folders: Vec<WireFolder>,
    current: Option<WireFolder>,
    total: Option<usize>,
}

/// Server-side job status
#[derive(Debug, Deserialize)]
struct FileOperation {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default)]
    progress: u32,
    #[serde(default)]
    finished: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    files: Vec<WireFile>,
    #[serde(default)]
    folders: Vec<WireFolder>,
}

impl FileOperation {
    fn failure(&self) -> Option<&str> {
        self.error.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    fn is_done(&self) -> bool {
        self.finished || self.progress >= 100
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalSession {
    #[serde(rename = "type")]
    kind: ProviderType,
    base_url: String,
    token: String,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
    #[serde(default)]
    server_version: Option<serde_json::Value>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    id: Option<String>,
}

// ============ Provider ============

/// ONLYOFFICE portal provider
pub struct OnlyofficeProvider {
    config: Arc<CoreConfig>,
    client: Client,
    base_url: String,
    token: SecretString,
    expires: Option<DateTime<Utc>>,
    server_version: Option<serde_json::Value>,
    user: Option<User>,
    listing: ListingState,
}

impl OnlyofficeProvider {
    /// Adapter for a portal token obtained by an external login
    pub fn new(
        base_url: &str,
        token: &str,
        expires: Option<DateTime<Utc>>,
        config: Arc<CoreConfig>,
    ) -> Result<Self, ProviderError> {
        if token.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("Portal token is empty".to_string()));
        }
        Ok(Self {
            client: build_client(&config.http)?,
            base_url: normalize_base_url(base_url)?,
            token: SecretString::from(token.to_string()),
            expires,
            server_version: None,
            user: None,
            listing: ListingState::default(),
            config,
        })
    }

    pub fn deserialize(raw: &str, config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        let stored: PortalSession = session::decode(raw)?;
        if stored.kind != ProviderType::Onlyoffice {
            return Err(ProviderError::InvalidConfig(format!("Not a portal session: {}", stored.kind)));
        }
        let mut provider = Self::new(&stored.base_url, &stored.token, stored.expires, config)?;
        provider.server_version = stored.server_version;
        provider.user = stored.user;
        Ok(provider)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn server_version(&self) -> Option<&serde_json::Value> {
        self.server_version.as_ref()
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path)
    }

    fn is_expired(&self) -> bool {
        self.expires.map(|expires| expires <= Utc::now()).unwrap_or(false)
    }

    /// Attach the token. Portal tokens cannot be refreshed, so an expired
    /// token fails before any request is made.
    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        if self.is_expired() {
            return Err(ProviderError::auth_expired("Portal token expired, sign in again"));
        }
        Ok(builder.header("Authorization", self.token.expose_secret()))
    }

    async fn execute(&self, builder: RequestBuilder, context: &str) -> Result<Response, ProviderError> {
        let request = self.authorize(builder)?.build().map_err(map_send_error)?;
        let response = send_with_retry(&self.client, request, &self.config.retry)
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or(body);
        Err(status_error(status, context, &message))
    }

    /// Send a request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<(T, Option<usize>), ProviderError> {
        let response = self.execute(builder, context).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", context, e)))?;
        let total = envelope.total;
        envelope
            .response
            .map(|value| (value, total))
            .ok_or_else(|| ProviderError::ParseError(format!("{}: empty response", context)))
    }

    fn meta(
        &self,
        id: String,
        title: String,
        parent_id: Option<String>,
        root_folder_type: RootFolderType,
        access: EntityAccess,
        dates: (Option<String>, Option<String>),
        authors: (Option<WireUser>, Option<WireUser>),
    ) -> EntityMeta {
        let mut meta = EntityMeta::new(id, title);
        meta.parent_id = parent_id;
        meta.root_folder_type = root_folder_type;
        meta.access = access;
        meta.provider_type = Some(ProviderType::Onlyoffice);
        meta.created = dates.0.as_deref().and_then(parse_timestamp);
        meta.updated = dates.1.as_deref().and_then(parse_timestamp);
        meta.created_by = authors.0.map(User::from);
        meta.updated_by = authors.1.map(User::from);
        meta
    }

    fn to_file(&self, wire: WireFile) -> FileEntry {
        let meta = self.meta(
            wire.id,
            wire.title,
            wire.folder_id,
            wire.root_folder_type,
            wire.access,
            (wire.created, wire.updated),
            (wire.created_by, wire.updated_by),
        );
        let mut file = FileEntry::new(meta, wire.pure_content_length);
        if let Some(display) = wire.content_length.filter(|s| !s.is_empty()) {
            file.display_content_length = display;
        }
        file.view_url = wire.view_url;
        file.is_favorite = wire.file_status & STATUS_FAVORITE != 0;
        file.is_editing = wire.file_status & STATUS_EDITING != 0;
        file.version = wire.version;
        file
    }

    fn to_folder(&self, wire: WireFolder) -> FolderEntry {
        let meta = self.meta(
            wire.id,
            wire.title,
            wire.parent_id,
            wire.root_folder_type,
            wire.access,
            (wire.created, wire.updated),
            (wire.created_by, wire.updated_by),
        );
        let mut folder = FolderEntry::new(meta);
        folder.files_count = wire.files_count.unwrap_or(-1);
        folder.folders_count = wire.folders_count.unwrap_or(-1);
        folder.is_third_party = wire.provider_item;
        folder
    }

    fn entities(&self, folders: Vec<WireFolder>, files: Vec<WireFile>) -> Vec<Entity> {
        folders
            .into_iter()
            .map(|f| Entity::Folder(self.to_folder(f)))
            .chain(files.into_iter().map(|f| Entity::File(self.to_file(f))))
            .collect()
    }

    /// `fileIds` / `folderIds` request fields for `items`
    fn id_lists(items: &[Entity]) -> (Vec<String>, Vec<String>) {
        let mut file_ids = Vec::new();
        let mut folder_ids = Vec::new();
        for item in items {
            match item {
                Entity::File(f) => file_ids.push(f.meta.id.clone()),
                Entity::Folder(f) => folder_ids.push(f.meta.id.clone()),
            }
        }
        (file_ids, folder_ids)
    }

    fn id_body(item: &Entity) -> serde_json::Value {
        match item {
            Entity::File(f) => serde_json::json!({ "fileIds": [f.meta.id] }),
            Entity::Folder(f) => serde_json::json!({ "folderIds": [f.meta.id] }),
        }
    }

    /// Files in `dest` that `items` would collide with
    async fn conflicts(&self, items: &[Entity], dest: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let (file_ids, folder_ids) = Self::id_lists(items);
        let mut query = vec![("destFolderId", dest.meta.id.clone())];
        query.extend(file_ids.into_iter().map(|id| ("fileIds", id)));
        query.extend(folder_ids.into_iter().map(|id| ("folderIds", id)));

        let request = self.client.get(self.api_url("files/fileops/move")).query(&query);
        let (existing, _): (Vec<WireFile>, _) = self.call(request, "check transfer").await?;
        let existing: Vec<Entity> = existing.into_iter().map(|f| Entity::File(self.to_file(f))).collect();
        Ok(transfer::conflicting(items, &existing))
    }

    /// Submit a file operation and wait for it
    async fn run_job(&self, endpoint: &str, body: serde_json::Value, context: &str) -> Result<FileOperation, ProviderError> {
        let request = self.client.put(self.api_url(endpoint)).json(&body);
        let (submitted, _): (OneOrMany<FileOperation>, _) = self.call(request, context).await?;
        let submitted = submitted
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::OperationFailed(format!("{}: no job started", context)))?;
        if let Some(error) = submitted.failure() {
            return Err(ProviderError::OperationFailed(error.to_string()));
        }
        if submitted.is_done() {
            return Ok(submitted);
        }
        self.wait_for_job(submitted.id.as_deref(), context).await
    }

    /// Poll `files/fileops` until the job with `job_id` (or the first one
    /// reported) finishes
    async fn wait_for_job(&self, job_id: Option<&str>, context: &str) -> Result<FileOperation, ProviderError> {
        let interval = Duration::from_millis(self.config.operations.poll_interval_ms);
        for poll in 0..self.config.operations.max_polls {
            if poll > 0 {
                tokio::time::sleep(interval).await;
            }

            let request = self.client.get(self.api_url("files/fileops"));
            let (jobs, _): (Vec<FileOperation>, _) = self
                .call(request, "job status")
                .await
                .map_err(|e| ProviderError::OperationFailed(format!("{}: {}", context, e)))?;

            let position = job_id
                .and_then(|id| jobs.iter().position(|j| j.id.as_deref() == Some(id)))
                .unwrap_or(0);
            let job = jobs
                .into_iter()
                .nth(position)
                .ok_or_else(|| ProviderError::OperationFailed(format!("{}: job vanished", context)))?;

            if let Some(error) = job.failure() {
                return Err(ProviderError::OperationFailed(error.to_string()));
            }
            if job.is_done() {
                return Ok(job);
            }
            tracing::debug!("[ONLYOFFICE] {} at {}%", context, job.progress);
        }
        Err(ProviderError::OperationFailed(format!("{}: job did not finish in time", context)))
    }
}

/// Trim the trailing slash and default the scheme to https
fn normalize_base_url(raw: &str) -> Result<String, ProviderError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    url::Url::parse(&with_scheme).map_err(|e| ProviderError::InvalidConfig(format!("Invalid portal URL {}: {}", raw, e)))?;
    Ok(with_scheme)
}

#[async_trait]
impl FileProvider for OnlyofficeProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Onlyoffice
    }

    fn id(&self) -> Option<String> {
        Some(session::session_id(&[&self.base_url, self.token.expose_secret()]))
    }

    fn root_folder(&self) -> FolderEntry {
        let mut meta = EntityMeta::new(ROOT_ID, "My Documents");
        meta.root_folder_type = RootFolderType::User;
        meta.provider_type = Some(ProviderType::Onlyoffice);
        FolderEntry::new(meta)
    }

    fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::Portal
    }

    fn listing(&self) -> &ListingState {
        &self.listing
    }

    fn listing_mut(&mut self) -> &mut ListingState {
        &mut self.listing
    }

    fn serialize(&self) -> Result<String, ProviderError> {
        session::encode(&PortalSession {
            kind: ProviderType::Onlyoffice,
            base_url: self.base_url.clone(),
            token: self.token.expose_secret().to_string(),
            expires: self.expires,
            server_version: self.server_version.clone(),
            user: self.user.clone(),
            id: self.id(),
        })
    }

    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError> {
        let mut copy = Self::deserialize(&self.serialize()?, self.config.clone())?;
        copy.listing = self.listing.clone();
        Ok(Box::new(copy))
    }

    /// Paginated listings keep the server total
    fn update_sort(&mut self) {
        self.listing.resort();
    }

    async fn is_reachable(&mut self) -> Result<(), ProviderError> {
        self.user_info().await?;

        let request = self.client.get(self.api_url("settings/version/build"));
        match self.call::<serde_json::Value>(request, "server version").await {
            Ok((version, _)) => self.server_version = Some(version),
            Err(e) => tracing::warn!("[ONLYOFFICE] Server version unavailable: {}", e),
        }
        Ok(())
    }

    async fn user_info(&mut self) -> Result<User, ProviderError> {
        let request = self.client.get(self.api_url("people/@self"));
        let (wire, _): (WireUser, _) = self.call(request, "user info").await?;
        let user = User::from(wire);
        tracing::info!("[ONLYOFFICE] Signed in as {}", user.display_name.as_deref().unwrap_or("unknown"));
        self.user = Some(user.clone());
        Ok(user)
    }

    /// First page of `folder` in server order
    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let url = self.api_url(&format!("files/{}", urlencoding::encode(&folder.meta.id)));
        let request = self
            .client
            .get(url)
            .query(&[("startIndex", "0".to_string()), ("count", self.config.operations.page_size.to_string())]);
        let (path, _): (WirePath, _) = self.call(request, &format!("list {}", folder.meta.title)).await?;
        Ok(self.entities(path.folders, path.files))
    }

    async fn fetch(&mut self, folder: &FolderEntry, params: FetchParams) -> Result<FolderListing, FetchError> {
        let page_size = params.page_size.unwrap_or(self.config.operations.page_size).max(1);
        let start_index = params.page * page_size;

        // Past the end of an already loaded listing: nothing left to ask for
        if params.page > 0 && self.listing.is_same_folder(folder) && start_index > self.listing.total {
            tracing::debug!("[ONLYOFFICE] Page {} is past the {} known items", params.page, self.listing.total);
            return Ok(FolderListing {
                folder: folder.clone(),
                items: self.listing.items.clone(),
                total: self.listing.total,
            });
        }

        if self.is_expired() {
            return Err(FetchError::not_attempted(ProviderError::auth_expired(
                "Portal token expired, sign in again",
            )));
        }

        if self.user.is_none() {
            self.user_info().await.map_err(FetchError::attempted)?;
        }

        let mut query = vec![
            ("startIndex", start_index.to_string()),
            ("count", page_size.to_string()),
            ("sortBy", params.sort.sort_type.as_str().to_string()),
            ("sortOrder", params.sort.order.as_str().to_string()),
        ];
        if let Some(text) = params.search_text() {
            query.push(("filterBy", "title".to_string()));
            query.push(("filterOp", "contains".to_string()));
            query.push(("filterValue", text.to_string()));
        }
        if let Some(ref filter) = params.filter {
            query.push(("filterType", filter.clone()));
        }

        let url = self.api_url(&format!("files/{}", urlencoding::encode(&folder.meta.id)));
        let request = self.client.get(url).query(&query);
        let (path, envelope_total): (WirePath, _) = self
            .call(request, &format!("list {}", folder.meta.title))
            .await
            .map_err(FetchError::attempted)?;

        let current = path.current.map(|c| self.to_folder(c));
        let total = path.total.or(envelope_total);
        let items = self.entities(path.folders, path.files);
        tracing::debug!("[ONLYOFFICE] {} item(s) from {} at {}", items.len(), folder.meta.id, start_index);

        self.listing.apply_page(folder.clone(), params, items, None);
        self.listing.total = total.unwrap_or(self.listing.items.len());

        Ok(FolderListing {
            folder: current.unwrap_or_else(|| folder.clone()),
            items: self.listing.items.clone(),
            total: self.listing.total,
        })
    }

    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError> {
        let title = naming::renamed_title(entity.title(), new_name, entity.is_folder());
        let body = serde_json::json!({ "title": title });
        let id = urlencoding::encode(entity.id()).into_owned();
        let context = format!("rename {}", entity.title());

        match entity {
            Entity::File(_) => {
                let request = self.client.put(self.api_url(&format!("files/file/{}", id))).json(&body);
                let (wire, _): (WireFile, _) = self.call(request, &context).await?;
                Ok(Entity::File(self.to_file(wire)))
            }
            Entity::Folder(_) => {
                let request = self.client.put(self.api_url(&format!("files/folder/{}", id))).json(&body);
                let (wire, _): (WireFolder, _) = self.call(request, &context).await?;
                Ok(Entity::Folder(self.to_folder(wire)))
            }
        }
    }

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError> {
        let url = self.api_url(&format!("files/folder/{}", urlencoding::encode(&parent.meta.id)));
        let request = self.client.post(url).json(&serde_json::json!({ "title": name.trim() }));
        let (wire, _): (WireFolder, _) = self.call(request, &format!("create folder {}", name)).await?;
        Ok(self.to_folder(wire))
    }

    /// The server fills the document from its own templates
    async fn create_document(&self, parent: &FolderEntry, name: &str, ext: &str) -> Result<FileEntry, ProviderError> {
        let title = format!("{}.{}", name.trim(), ext.trim_start_matches('.'));
        let url = self.api_url(&format!("files/{}/file", urlencoding::encode(&parent.meta.id)));
        let request = self.client.post(url).json(&serde_json::json!({ "title": title }));
        let (wire, _): (WireFile, _) = self.call(request, &format!("create {}", title)).await?;
        Ok(self.to_file(wire))
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        let view_url = file
            .view_url
            .as_deref()
            .ok_or_else(|| ProviderError::NotFound(format!("{} has no content URL", file.meta.title)))?;
        let url = if view_url.starts_with("http://") || view_url.starts_with("https://") {
            view_url.to_string()
        } else {
            format!("{}/{}", self.base_url, view_url.trim_start_matches('/'))
        };

        let response = self.execute(self.client.get(url), &format!("download {}", file.meta.title)).await?;
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
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(name.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("title", name.to_string())
            .text("createNewIfExist", (!overwrite).to_string());

        let url = self.api_url(&format!("files/{}/insert", urlencoding::encode(&parent.meta.id)));
        let (wire, _): (WireFile, _) = self
            .call(self.client.post(url).multipart(form), &format!("upload {}", name))
            .await?;
        tracing::info!("[ONLYOFFICE] Uploaded {}", name);
        Ok(self.to_file(wire))
    }

    async fn favorite(&self, file: &FileEntry, favorite: bool) -> Result<FileEntry, ProviderError> {
        let url = self.api_url("files/favorites");
        let body = serde_json::json!({ "fileIds": [file.meta.id] });
        let request = if favorite {
            self.client.post(url)
        } else {
            self.client.delete(url)
        };

        let (done, _): (bool, _) = self.call(request.json(&body), "favorite").await?;
        if !done {
            return Err(ProviderError::ServerError(format!("Favorite of {} was not changed", file.meta.title)));
        }
        let mut updated = file.clone();
        updated.is_favorite = favorite;
        Ok(updated)
    }

    async fn delete_item(&self, entity: &Entity, mode: DeleteMode) -> Result<(), ProviderError> {
        let mut body = Self::id_body(entity);
        body["deleteAfter"] = serde_json::json!(false);
        body["immediately"] = serde_json::json!(mode == DeleteMode::Permanent);

        self.run_job("files/fileops/delete", body, &format!("delete {}", entity.title()))
            .await?;
        tracing::info!("[ONLYOFFICE] Deleted {}", entity.title());
        Ok(())
    }

    async fn check_transfer(&self, items: &[Entity], dest: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        self.conflicts(items, dest).await
    }

    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError> {
        if resolution == ConflictResolution::Skip
            && !self.conflicts(std::slice::from_ref(item), dest).await?.is_empty()
        {
            return Ok(ItemOutcome::Skipped);
        }

        let (endpoint, label) = match mode {
            TransferMode::Copy => ("files/fileops/copy", "copy"),
            TransferMode::Move => ("files/fileops/move", "move"),
        };
        let conflict_resolve_type = match resolution {
            ConflictResolution::Skip => 0,
            ConflictResolution::Overwrite => 1,
            ConflictResolution::Duplicate => 2,
        };
        let mut body = Self::id_body(item);
        body["destFolderId"] = serde_json::json!(dest.meta.id);
        body["conflictResolveType"] = serde_json::json!(conflict_resolve_type);
        body["deleteAfter"] = serde_json::json!(false);

        let job = self.run_job(endpoint, body, &format!("{} {}", label, item.title())).await?;

        let transferred = match (job.files.into_iter().next(), job.folders.into_iter().next()) {
            (Some(file), _) if !item.is_folder() => Entity::File(self.to_file(file)),
            (_, Some(folder)) if item.is_folder() => Entity::Folder(self.to_folder(folder)),
            _ => {
                let mut moved = item.clone();
                moved.meta_mut().parent_id = Some(dest.meta.id.clone());
                moved
            }
        };
        Ok(ItemOutcome::Transferred(transferred))
    }
}
