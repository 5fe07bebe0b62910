//! Local Filesystem Provider
//!
//! Documents stored on this device. Entity ids are absolute paths. Deleting
//! outside the trash moves items into a trash directory under a unique name;
//! deleting inside the trash removes them for good.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::naming;
use super::session;
use super::{
    AccessPolicy, ConflictResolution, DeleteMode, DocumentTemplates, Entity, EntityMeta, FileEntry, FileProvider,
    FolderEntry, ItemOutcome, ListingState, ProviderError, ProviderType, RootFolderType, TransferMode, User,
};
use crate::config::CoreConfig;

const DEVICE_ID: &str = "device";

#[derive(Debug, Serialize, Deserialize)]
struct LocalSession {
    #[serde(rename = "type")]
    kind: ProviderType,
    #[serde(default = "device_id")]
    id: String,
}

fn device_id() -> String {
    DEVICE_ID.to_string()
}

/// Local documents provider
pub struct LocalProvider {
    config: Arc<CoreConfig>,
    documents_dir: PathBuf,
    trash_dir: PathBuf,
    templates: DocumentTemplates,
    listing: ListingState,
    user: Option<User>,
}

impl LocalProvider {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self {
            documents_dir: config.local.documents_dir.clone(),
            trash_dir: config.local.trash_dir.clone(),
            templates: DocumentTemplates::from_config(&config.templates),
            config,
            listing: ListingState::default(),
            user: None,
        }
    }

    /// Rebuild from a stored session. The session carries no credential.
    pub fn deserialize(raw: &str, config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        let stored: LocalSession = session::decode(raw)?;
        if stored.kind != ProviderType::Local {
            return Err(ProviderError::InvalidConfig(format!("Not a local session: {}", stored.kind)));
        }
        Ok(Self::new(config))
    }

    pub fn trash_folder(&self) -> FolderEntry {
        let mut meta = EntityMeta::new(path_id(&self.trash_dir), "Trash");
        meta.root_folder_type = RootFolderType::DeviceTrash;
        meta.provider_type = Some(ProviderType::Local);
        FolderEntry::new(meta)
    }

    fn root_type_of(&self, path: &Path) -> RootFolderType {
        if path.starts_with(&self.trash_dir) {
            RootFolderType::DeviceTrash
        } else {
            RootFolderType::DeviceDocuments
        }
    }

    async fn entity_at(&self, path: &Path) -> Result<Entity, ProviderError> {
        let metadata = tokio::fs::metadata(path).await?;
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_id(path));

        let mut meta = EntityMeta::new(path_id(path), title);
        meta.created = metadata.created().ok().map(DateTime::<Utc>::from);
        meta.updated = metadata.modified().ok().map(DateTime::<Utc>::from);
        meta.parent_id = path.parent().map(path_id);
        meta.root_folder_type = self.root_type_of(path);
        meta.provider_type = Some(ProviderType::Local);
        meta.created_by = self.user.clone();

        if metadata.is_dir() {
            let mut folder = FolderEntry::new(meta);
            let (files, folders) = count_children(path).await?;
            folder.files_count = files;
            folder.folders_count = folders;
            Ok(Entity::Folder(folder))
        } else {
            Ok(Entity::File(FileEntry::new(meta, metadata.len())))
        }
    }

    async fn file_at(&self, path: &Path) -> Result<FileEntry, ProviderError> {
        match self.entity_at(path).await? {
            Entity::File(file) => Ok(file),
            Entity::Folder(_) => Err(ProviderError::NameConflict(format!("{} is a folder", path.display()))),
        }
    }

    async fn folder_at(&self, path: &Path) -> Result<FolderEntry, ProviderError> {
        match self.entity_at(path).await? {
            Entity::Folder(folder) => Ok(folder),
            Entity::File(_) => Err(ProviderError::NameConflict(format!("{} is a file", path.display()))),
        }
    }

    async fn move_into_trash(&self, path: &Path, title: &str) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.trash_dir).await?;
        let taken = names_in(&self.trash_dir).await?;
        let name = naming::unique_name(title, |candidate| taken.contains(candidate));
        let target = self.trash_dir.join(&name);
        tracing::debug!("[Local] Moving {} to trash as {}", path.display(), name);
        move_path(path, &target).await
    }

    /// Overwrite `to` with `from`. The new content is staged in a hidden
    /// sibling and swapped in only once it is complete, so a failed copy
    /// leaves the existing entry untouched.
    async fn replace(&self, from: &Path, to: &Path, mode: TransferMode) -> Result<ItemOutcome, ProviderError> {
        let dir = to
            .parent()
            .ok_or_else(|| ProviderError::Unsupported("overwriting a root folder".to_string()))?;
        let title = to.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let taken = names_in(dir).await?;
        let staging = dir.join(naming::unique_name(&format!(".{}.partial", title), |c| taken.contains(c)));

        let staged = match mode {
            TransferMode::Copy => copy_path(from, &staging).await,
            TransferMode::Move => move_path(from, &staging).await,
        };
        if let Err(e) = staged {
            tracing::warn!("[Local] Overwrite of {} failed: {}", to.display(), e);
            if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
                if let Err(cleanup) = remove_path(&staging).await {
                    tracing::warn!("[Local] Could not remove {}: {}", staging.display(), cleanup);
                }
            }
            return Err(e);
        }

        remove_path(to).await?;
        tokio::fs::rename(&staging, to).await?;
        tracing::debug!("[Local] Replaced {}", to.display());
        self.entity_at(to).await.map(ItemOutcome::Transferred)
    }
}

fn path_id(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Run blocking filesystem work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProviderError::ServerError(format!("Filesystem task failed: {}", e)))?
}

/// Immediate children counts (files, folders); -1 when unreadable
async fn count_children(path: &Path) -> Result<(i64, i64), ProviderError> {
    let path = path.to_path_buf();
    blocking(move || {
        let mut files = 0;
        let mut folders = 0;
        for entry in WalkDir::new(&path).min_depth(1).max_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => folders += 1,
                Ok(_) => files += 1,
                Err(_) => return Ok((-1, -1)),
            }
        }
        Ok((files, folders))
    })
    .await
}

/// Names present in `dir`, hidden ones included
async fn names_in(dir: &Path) -> Result<HashSet<String>, ProviderError> {
    let mut names = HashSet::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        names.insert(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

async fn remove_path(path: &Path) -> Result<(), ProviderError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}

/// Rename, falling back to copy + remove across filesystems
async fn move_path(from: &Path, to: &Path) -> Result<(), ProviderError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    copy_path(from, to).await?;
    remove_path(from).await
}

/// Copy a file or a whole folder tree
async fn copy_path(from: &Path, to: &Path) -> Result<(), ProviderError> {
    let from = from.to_path_buf();
    let to = to.to_path_buf();
    blocking(move || copy_tree(&from, &to)).await
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), ProviderError> {
    if from.is_file() {
        std::fs::copy(from, to)?;
        return Ok(());
    }
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| ProviderError::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ProviderError::ServerError(e.to_string()))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl FileProvider for LocalProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    fn id(&self) -> Option<String> {
        Some(DEVICE_ID.to_string())
    }

    fn root_folder(&self) -> FolderEntry {
        let mut meta = EntityMeta::new(path_id(&self.documents_dir), "On Device");
        meta.root_folder_type = RootFolderType::DeviceDocuments;
        meta.provider_type = Some(ProviderType::Local);
        FolderEntry::new(meta)
    }

    fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::Device
    }

    fn listing(&self) -> &ListingState {
        &self.listing
    }

    fn listing_mut(&mut self) -> &mut ListingState {
        &mut self.listing
    }

    fn serialize(&self) -> Result<String, ProviderError> {
        session::encode(&LocalSession {
            kind: ProviderType::Local,
            id: DEVICE_ID.to_string(),
        })
    }

    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError> {
        let mut copy = Self::deserialize(&self.serialize()?, self.config.clone())?;
        copy.user = self.user.clone();
        copy.listing = self.listing.clone();
        Ok(Box::new(copy))
    }

    fn templates(&self) -> Option<&DocumentTemplates> {
        Some(&self.templates)
    }

    async fn is_reachable(&mut self) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.documents_dir).await?;
        tokio::fs::create_dir_all(&self.trash_dir).await?;
        self.user_info().await?;
        Ok(())
    }

    async fn user_info(&mut self) -> Result<User, ProviderError> {
        let user = User {
            user_id: Some(DEVICE_ID.to_string()),
            display_name: Some("On Device".to_string()),
            department: Some(ProviderType::Local.to_string()),
            ..Default::default()
        };
        self.user = Some(user.clone());
        Ok(user)
    }

    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let path = PathBuf::from(&folder.meta.id);
        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(folder.meta.id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_hidden(&name) {
                continue;
            }
            let child = entry.path();
            // The trash may live inside the documents directory
            if child == self.trash_dir {
                continue;
            }
            match self.entity_at(&child).await {
                Ok(entity) => items.push(entity),
                Err(e) => tracing::warn!("[Local] Skipping {}: {}", child.display(), e),
            }
        }
        Ok(items)
    }

    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError> {
        let from = PathBuf::from(entity.id());
        let title = naming::renamed_title(entity.title(), new_name, entity.is_folder());
        let parent = from
            .parent()
            .ok_or_else(|| ProviderError::Unsupported("renaming a root folder".to_string()))?;
        let to = parent.join(&title);

        if to != from && tokio::fs::try_exists(&to).await? {
            return Err(ProviderError::NameConflict(title));
        }
        tokio::fs::rename(&from, &to).await?;
        tracing::info!("[Local] Renamed {} to {}", entity.title(), title);
        self.entity_at(&to).await
    }

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError> {
        let path = Path::new(&parent.meta.id).join(name.trim());
        if tokio::fs::try_exists(&path).await? {
            return Err(ProviderError::NameConflict(name.to_string()));
        }
        tokio::fs::create_dir(&path).await?;
        self.folder_at(&path).await
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        match tokio::fs::read(&file.meta.id).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProviderError::NotFound(file.meta.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, parent: &FolderEntry, name: &str, data: Vec<u8>, overwrite: bool)
        -> Result<FileEntry, ProviderError> {
        let path = Path::new(&parent.meta.id).join(name);
        if !overwrite && tokio::fs::try_exists(&path).await? {
            return Err(ProviderError::NameConflict(name.to_string()));
        }
        tokio::fs::write(&path, &data).await?;
        self.file_at(&path).await
    }

    async fn delete_item(&self, entity: &Entity, mode: DeleteMode) -> Result<(), ProviderError> {
        let path = PathBuf::from(entity.id());
        if !tokio::fs::try_exists(&path).await? {
            return Err(ProviderError::NotFound(entity.id().to_string()));
        }

        let in_trash = path.starts_with(&self.trash_dir);
        if in_trash || mode == DeleteMode::Permanent {
            tracing::debug!("[Local] Removing {}", path.display());
            remove_path(&path).await
        } else {
            self.move_into_trash(&path, entity.title()).await
        }
    }

    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError> {
        let from = PathBuf::from(item.id());
        let dest_dir = PathBuf::from(&dest.meta.id);
        if dest_dir.starts_with(&from) {
            return Err(ProviderError::Unsupported(format!(
                "{} cannot be placed inside itself",
                item.title()
            )));
        }
        let mut to = dest_dir.join(item.title());

        if tokio::fs::try_exists(&to).await? {
            match resolution {
                ConflictResolution::Skip => return Ok(ItemOutcome::Skipped),
                ConflictResolution::Overwrite => {
                    if to == from {
                        return self.entity_at(&to).await.map(ItemOutcome::Transferred);
                    }
                    if from.starts_with(&to) {
                        return Err(ProviderError::Unsupported(format!(
                            "{} cannot replace a folder that contains it",
                            item.title()
                        )));
                    }
                    return self.replace(&from, &to, mode).await;
                }
                ConflictResolution::Duplicate => {
                    let taken = names_in(&dest_dir).await?;
                    let name = naming::unique_name(item.title(), |candidate| taken.contains(candidate));
                    to = dest_dir.join(name);
                }
            }
        }

        match mode {
            TransferMode::Copy => copy_path(&from, &to).await?,
            TransferMode::Move => move_path(&from, &to).await?,
        }
        self.entity_at(&to).await.map(ItemOutcome::Transferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ActionSet, FetchParams, SortOrder, SortSpec, SortType};
    use crate::transfer::TransferRequest;

    struct Fixture {
        _dir: tempfile::TempDir,
        provider: LocalProvider,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::default();
        config.local.documents_dir = dir.path().join("Documents");
        config.local.trash_dir = dir.path().join("Trash");
        config.templates.template_dir = dir.path().join("templates");
        let templates = dir.path().join("templates").join("new").join("en-US");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("new.docx"), b"empty docx").unwrap();

        let mut provider = LocalProvider::new(Arc::new(config));
        provider.is_reachable().await.unwrap();
        Fixture { _dir: dir, provider }
    }

    fn write(parent: &FolderEntry, name: &str, data: &[u8]) -> PathBuf {
        let path = Path::new(&parent.meta.id).join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_fetch_sorts_folders_first() {
        let mut f = fixture().await;
        let root = f.provider.root_folder();
        write(&root, "b.txt", b"bb");
        write(&root, "a.txt", b"a");
        std::fs::create_dir(Path::new(&root.meta.id).join("Zed")).unwrap();
        write(&root, ".hidden", b"");

        let params = FetchParams {
            sort: SortSpec::new(SortType::Title, SortOrder::Ascending),
            ..Default::default()
        };
        let listing = f.provider.fetch(&root, params).await.unwrap();
        let titles: Vec<&str> = listing.items.iter().map(Entity::title).collect();
        assert_eq!(titles, vec!["Zed", "a.txt", "b.txt"]);
        assert_eq!(listing.total, 3);
        assert_eq!(f.provider.listing().total, 3);
    }

    #[tokio::test]
    async fn test_fetch_missing_folder_is_attempted_error() {
        let mut f = fixture().await;
        let mut ghost = f.provider.root_folder();
        ghost.meta.id = format!("{}/ghost", ghost.meta.id);
        let err = f.provider.fetch(&ghost, FetchParams::default()).await.unwrap_err();
        assert!(err.attempted);
        assert!(matches!(err.error, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_keeps_extension() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let path = write(&root, "a.xlsx", b"sheet");
        let entity = f.provider.entity_at(&path).await.unwrap();

        let renamed = f.provider.rename(&entity, "b").await.unwrap();
        assert_eq!(renamed.title(), "b.xlsx");
        assert!(Path::new(&root.meta.id).join("b.xlsx").exists());

        write(&root, "c.xlsx", b"");
        let err = f.provider.rename(&renamed, "c").await.unwrap_err();
        assert!(matches!(err, ProviderError::NameConflict(_)));
    }

    #[tokio::test]
    async fn test_delete_moves_to_trash_then_removes() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let path = write(&root, "Report.docx", b"v1");
        let first = f.provider.entity_at(&path).await.unwrap();
        f.provider.delete_item(&first, DeleteMode::Auto).await.unwrap();
        assert!(!path.exists());

        let path = write(&root, "Report.docx", b"v2");
        let second = f.provider.entity_at(&path).await.unwrap();
        f.provider.delete_item(&second, DeleteMode::Auto).await.unwrap();

        let trash = f.provider.trash_folder();
        let mut trashed: Vec<String> = f
            .provider
            .children(&trash)
            .await
            .unwrap()
            .iter()
            .map(|e| e.title().to_string())
            .collect();
        trashed.sort();
        assert_eq!(trashed, vec!["Report 1.docx", "Report.docx"]);

        let in_trash = f.provider.entity_at(&f.provider.trash_dir.join("Report.docx")).await.unwrap();
        assert_eq!(f.provider.actions(&in_trash), ActionSet::DELETE | ActionSet::RESTORE);
        f.provider.delete_item(&in_trash, DeleteMode::Auto).await.unwrap();
        assert_eq!(f.provider.children(&trash).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_delete_bypasses_trash() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let path = write(&root, "gone.txt", b"x");
        let entity = f.provider.entity_at(&path).await.unwrap();
        f.provider.delete_item(&entity, DeleteMode::Permanent).await.unwrap();
        assert!(f.provider.children(&f.provider.trash_folder()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_conflicts() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let dest = f.provider.create_folder(&root, "Dest").await.unwrap();
        let src = write(&root, "Report.docx", b"new");
        write(&dest, "Report.docx", b"old");
        let item = f.provider.entity_at(&src).await.unwrap();

        let conflicts = f.provider.check_transfer(&[item.clone()], &dest).await.unwrap();
        assert_eq!(conflicts.len(), 1);

        let skip = TransferRequest::new(vec![item.clone()], dest.clone(), TransferMode::Copy, ConflictResolution::Skip);
        let report = f.provider.transfer(&skip, None).await;
        assert!(report.results.is_empty());
        assert_eq!(std::fs::read(Path::new(&dest.meta.id).join("Report.docx")).unwrap(), b"old");

        let dup = TransferRequest::new(vec![item.clone()], dest.clone(), TransferMode::Copy, ConflictResolution::Duplicate);
        let report = f.provider.transfer(&dup, None).await;
        assert_eq!(report.results[0].title(), "Report 1.docx");

        let over = TransferRequest::new(vec![item], dest.clone(), TransferMode::Move, ConflictResolution::Overwrite);
        let report = f.provider.transfer(&over, None).await;
        assert!(report.is_success());
        assert_eq!(std::fs::read(Path::new(&dest.meta.id).join("Report.docx")).unwrap(), b"new");
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn test_overwrite_of_containing_folder_is_rejected() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let outer = f.provider.create_folder(&root, "Docs").await.unwrap();
        let inner = f.provider.create_folder(&outer, "Docs").await.unwrap();
        let only_copy = write(&inner, "only-copy.docx", b"keep");

        for mode in [TransferMode::Copy, TransferMode::Move] {
            let result = f
                .provider
                .transfer_item(&Entity::Folder(inner.clone()), &root, mode, ConflictResolution::Overwrite)
                .await;
            assert!(matches!(result, Err(ProviderError::Unsupported(_))));
            assert_eq!(std::fs::read(&only_copy).unwrap(), b"keep");
        }
    }

    #[tokio::test]
    async fn test_transfer_into_own_subfolder_is_rejected() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let docs = f.provider.create_folder(&root, "Docs").await.unwrap();
        let nested = f.provider.create_folder(&docs, "Nested").await.unwrap();

        for resolution in [ConflictResolution::Duplicate, ConflictResolution::Overwrite] {
            let result = f
                .provider
                .transfer_item(&Entity::Folder(docs.clone()), &nested, TransferMode::Copy, resolution)
                .await;
            assert!(matches!(result, Err(ProviderError::Unsupported(_))));
        }
        let result = f
            .provider
            .transfer_item(&Entity::Folder(docs.clone()), &docs, TransferMode::Move, ConflictResolution::Duplicate)
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
        assert_eq!(std::fs::read_dir(&nested.meta.id).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_overwrite_keeps_destination() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let dest = f.provider.create_folder(&root, "Dest").await.unwrap();
        let src = write(&root, "Report.docx", b"new");
        let existing = write(&dest, "Report.docx", b"old");
        let item = f.provider.entity_at(&src).await.unwrap();
        std::fs::remove_file(&src).unwrap();

        for mode in [TransferMode::Copy, TransferMode::Move] {
            let result = f.provider.transfer_item(&item, &dest, mode, ConflictResolution::Overwrite).await;
            assert!(result.is_err());
            assert_eq!(std::fs::read(&existing).unwrap(), b"old");
            assert_eq!(std::fs::read_dir(&dest.meta.id).unwrap().count(), 1);
        }
    }

    #[tokio::test]
    async fn test_overwrite_folder_replaces_contents() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let docs = f.provider.create_folder(&root, "Docs").await.unwrap();
        write(&docs, "fresh.txt", b"fresh");
        let dest = f.provider.create_folder(&root, "Backup").await.unwrap();
        let stale = f.provider.create_folder(&dest, "Docs").await.unwrap();
        write(&stale, "stale.txt", b"stale");

        let outcome = f
            .provider
            .transfer_item(&Entity::Folder(docs), &dest, TransferMode::Copy, ConflictResolution::Overwrite)
            .await;
        assert!(matches!(outcome, Ok(ItemOutcome::Transferred(Entity::Folder(_)))));
        let copied = Path::new(&dest.meta.id).join("Docs");
        assert!(copied.join("fresh.txt").exists());
        assert!(!copied.join("stale.txt").exists());
        assert_eq!(std::fs::read_dir(&dest.meta.id).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_copy_folder_recursively() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let docs = f.provider.create_folder(&root, "Docs").await.unwrap();
        let nested = f.provider.create_folder(&docs, "Nested").await.unwrap();
        write(&nested, "deep.txt", b"deep");
        let dest = f.provider.create_folder(&root, "Backup").await.unwrap();

        let outcome = f
            .provider
            .transfer_item(&Entity::Folder(docs), &dest, TransferMode::Copy, ConflictResolution::Skip)
            .await
            .unwrap();
        let ItemOutcome::Transferred(Entity::Folder(copied)) = outcome else {
            panic!("expected a folder");
        };
        assert_eq!(copied.folders_count, 1);
        assert!(Path::new(&dest.meta.id).join("Docs/Nested/deep.txt").exists());
    }

    #[tokio::test]
    async fn test_create_document_from_template() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        let file = f.provider.create_document(&root, "Memo", "docx").await.unwrap();
        assert_eq!(file.meta.title, "Memo.docx");
        assert_eq!(f.provider.download(&file).await.unwrap(), b"empty docx");

        let err = f.provider.create_document(&root, "Sheet", "xlsx").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_conflict_and_overwrite() {
        let f = fixture().await;
        let root = f.provider.root_folder();
        f.provider.upload(&root, "n.txt", b"1".to_vec(), false).await.unwrap();
        let err = f.provider.upload(&root, "n.txt", b"2".to_vec(), false).await.unwrap_err();
        assert!(matches!(err, ProviderError::NameConflict(_)));
        let file = f.provider.upload(&root, "n.txt", b"22".to_vec(), true).await.unwrap();
        assert_eq!(file.content_length, 2);
    }

    #[tokio::test]
    async fn test_serialize_round_trip() {
        let mut f = fixture().await;
        let root = f.provider.root_folder();
        write(&root, "x.docx", b"x");
        let raw = f.provider.serialize().unwrap();
        assert_eq!(raw, r#"{"type":"local","id":"device"}"#);

        let mut restored = LocalProvider::deserialize(&raw, f.provider.config.clone()).unwrap();
        let a = f.provider.fetch(&root, FetchParams::default()).await.unwrap();
        let b = restored.fetch(&root, FetchParams::default()).await.unwrap();
        assert_eq!(a.items.len(), b.items.len());
        assert_eq!(a.items[0].id(), b.items[0].id());
    }
}
