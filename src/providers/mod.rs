//! File Providers Module
//!
//! This module provides one contract for every storage backend docbridge can
//! talk to. All adapters implement the `FileProvider` trait, so listing,
//! mutating and transferring entities works the same way against a document
//! server, a WebDAV share, OneDrive or the local disk.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  FileProvider Trait                  │
//! │  fetch, rename, create, delete, transfer, serialize  │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!      ┌──────────────┬────┴─────────┬─────────────┐
//!      ▼              ▼              ▼             ▼
//! ┌──────────┐ ┌──────────────┐ ┌──────────┐ ┌─────────┐
//! │ONLYOFFICE│ │WebDAV family │ │ OneDrive │ │  Local  │
//! └──────────┘ │ (DavStorage) │ └──────────┘ └─────────┘
//!              └──────────────┘
//! ```

pub mod access;
pub mod dav;
pub mod http_retry;
pub mod listing;
pub mod local;
pub mod naming;
pub mod oauth2;
pub mod onedrive;
pub mod onlyoffice;
pub mod session;
pub mod sort;
pub mod templates;
pub mod types;
pub mod webdav;

pub use access::{AccessPolicy, ActionSet};
pub use listing::ListingState;
pub use local::LocalProvider;
pub use onedrive::OneDriveProvider;
pub use onlyoffice::OnlyofficeProvider;
pub use session::SessionSink;
pub use templates::DocumentTemplates;
pub use types::*;
pub use webdav::{DavFlavor, WebDavProvider};

use async_trait::async_trait;
use std::sync::Arc;

use crate::transfer::{self, BatchReport, EventSender, TransferContext, TransferRequest};

/// Unified file provider trait
///
/// Every backend implements this trait. Network primitives take `&self`;
/// only operations that change the cached listing or the cached account take
/// `&mut self`.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Get the provider type identifier
    fn provider_type(&self) -> ProviderType;

    /// Session id (content hash of endpoint and credential), once known
    fn id(&self) -> Option<String>;

    /// The folder listings start from
    fn root_folder(&self) -> FolderEntry;

    /// Account cached by the last `user_info`
    fn user(&self) -> Option<&User>;

    fn access_policy(&self) -> AccessPolicy;

    fn listing(&self) -> &ListingState;

    fn listing_mut(&mut self) -> &mut ListingState;

    /// Encode the session (endpoint, credential, cached user) as a JSON object
    fn serialize(&self) -> Result<String, ProviderError>;

    /// Independent adapter with the same session and a copy of the listing
    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError>;

    /// Where refreshed sessions are pushed
    fn set_session_sink(&mut self, _sink: Arc<dyn SessionSink>) {}

    /// Bundled templates for `create_document`, when the adapter uses them
    fn templates(&self) -> Option<&DocumentTemplates> {
        None
    }

    /// Forget the cached listing
    fn reset(&mut self) {
        self.listing_mut().reset();
    }

    /// Cancel every batch this adapter has started. In-flight items finish.
    fn cancel(&self) {
        self.listing().batches.cancel_all();
    }

    /// Permitted operations on `entity` inside the current listing
    fn actions(&self, entity: &Entity) -> ActionSet {
        access::resolve(entity, self.user(), self.listing().folder.as_ref(), self.access_policy())
    }

    /// Re-apply the last sort to the cached items without a network call
    fn update_sort(&mut self) {
        let listing = self.listing_mut();
        listing.resort();
        listing.total = listing.items.len();
    }

    /// One-shot probe used while connecting; caches the account on success
    async fn is_reachable(&mut self) -> Result<(), ProviderError>;

    /// Fetch and cache the signed-in account
    async fn user_info(&mut self) -> Result<User, ProviderError>;

    /// Every entity directly inside `folder`, in backend order
    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError>;

    /// List `folder` into the cached listing.
    ///
    /// Full-listing backends load every child, filter and sort locally and
    /// report `total == items.len()`.
    async fn fetch(&mut self, folder: &FolderEntry, params: FetchParams) -> Result<FolderListing, FetchError> {
        tracing::debug!("[{}] Fetching {}", self.provider_type(), folder.meta.id);
        let items = self.children(folder).await.map_err(FetchError::attempted)?;
        let items = sort::apply(items, &params);

        let listing = self.listing_mut();
        listing.apply_page(folder.clone(), params, items, None);
        Ok(FolderListing {
            folder: folder.clone(),
            items: listing.items.clone(),
            total: listing.total,
        })
    }

    /// Rename keeping the file extension
    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError>;

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError>;

    async fn create_file(&self, parent: &FolderEntry, name: &str, data: Vec<u8>) -> Result<FileEntry, ProviderError> {
        self.upload(parent, name, data, false).await
    }

    /// Create `<name>.<ext>` from the bundled empty template
    async fn create_document(&self, parent: &FolderEntry, name: &str, ext: &str) -> Result<FileEntry, ProviderError> {
        let templates = self
            .templates()
            .ok_or_else(|| ProviderError::Unsupported("document templates".to_string()))?;
        let data = templates.load(ext).await?;
        let title = format!("{}.{}", name.trim(), ext.trim_start_matches('.'));
        self.create_file(parent, &title, data).await
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError>;

    async fn upload(&self, parent: &FolderEntry, name: &str, data: Vec<u8>, overwrite: bool)
        -> Result<FileEntry, ProviderError>;

    async fn favorite(&self, _file: &FileEntry, _favorite: bool) -> Result<FileEntry, ProviderError> {
        Err(ProviderError::Unsupported(format!("favorites on {}", self.provider_type())))
    }

    /// Delete one entity
    async fn delete_item(&self, entity: &Entity, mode: DeleteMode) -> Result<(), ProviderError>;

    /// Delete several entities one after another
    async fn delete(
        &self,
        entities: &[Entity],
        from: &FolderEntry,
        mode: DeleteMode,
        events: Option<EventSender>,
    ) -> BatchReport {
        let ctx = TransferContext::new(self.listing().batches.begin(), events);
        transfer::run_delete(self, entities, from, mode, &ctx).await
    }

    /// Items whose title already exists in `dest`. Must run before a
    /// destructive transfer so the caller can choose a resolution.
    async fn check_transfer(&self, items: &[Entity], dest: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let existing = self.children(dest).await?;
        Ok(transfer::conflicting(items, &existing))
    }

    /// Copy or move one entity into `dest`
    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError>;

    /// Copy or move several entities within this provider
    async fn transfer(&self, request: &TransferRequest, events: Option<EventSender>) -> BatchReport {
        let ctx = TransferContext::new(self.listing().batches.begin(), events);
        transfer::run_transfer(self, request, &ctx).await
    }
}
