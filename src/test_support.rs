//! Test fixtures: in-process HTTP backends and an in-memory provider

use async_trait::async_trait;
use axum::Router;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::providers::naming;
use crate::providers::{
    AccessPolicy, ConflictResolution, DeleteMode, Entity, EntityMeta, FileEntry, FileProvider, FolderEntry,
    ItemOutcome, ListingState, ProviderError, ProviderType, TransferMode, User,
};

/// Serve `app` on an ephemeral local port, returning its base URL
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn folder_entry(id: &str, parent: Option<&str>) -> FolderEntry {
    let mut meta = EntityMeta::new(id, id.rsplit('/').next().unwrap_or(id));
    meta.parent_id = parent.map(str::to_string);
    FolderEntry::new(meta)
}

/// Pauses a transfer of one item until released
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Debug, Clone)]
struct Node {
    title: String,
    parent: String,
    data: Option<Vec<u8>>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    next_id: u64,
    failing: HashSet<String>,
    fatal: HashSet<String>,
    gates: HashMap<String, Arc<Gate>>,
}

impl Tree {
    fn insert(&mut self, parent: &str, title: &str, data: Option<Vec<u8>>) -> String {
        self.next_id += 1;
        let id = format!("m{}", self.next_id);
        self.nodes.insert(
            id.clone(),
            Node {
                title: title.to_string(),
                parent: parent.to_string(),
                data,
            },
        );
        id
    }

    fn child(&self, parent: &str, title: &str) -> Option<String> {
        self.nodes
            .iter()
            .find(|(_, n)| n.parent == parent && n.title == title)
            .map(|(id, _)| id.clone())
    }

    fn remove_tree(&mut self, id: &str) {
        let children: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == id)
            .map(|(child, _)| child.clone())
            .collect();
        for child in children {
            self.remove_tree(&child);
        }
        self.nodes.remove(id);
    }

    fn copy_tree(&mut self, id: &str, parent: &str, title: &str) -> Option<String> {
        let node = self.nodes.get(id)?.clone();
        let copy = self.insert(parent, title, node.data.clone());
        let children: Vec<(String, String)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == id)
            .map(|(child, n)| (child.clone(), n.title.clone()))
            .collect();
        for (child, child_title) in children {
            self.copy_tree(&child, &copy, &child_title);
        }
        Some(copy)
    }

    fn entity(&self, id: &str) -> Option<Entity> {
        let node = self.nodes.get(id)?;
        let mut meta = EntityMeta::new(id, &node.title);
        meta.parent_id = Some(node.parent.clone());
        meta.provider_type = Some(ProviderType::Local);
        Some(match &node.data {
            Some(data) => Entity::File(FileEntry::new(meta, data.len() as u64)),
            None => Entity::Folder(FolderEntry::new(meta)),
        })
    }
}

/// Provider backed by an in-memory tree. Root id is "/".
pub struct MemoryProvider {
    tree: Mutex<Tree>,
    listing: ListingState,
    user: Option<User>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Tree::default()),
            listing: ListingState::default(),
            user: None,
        }
    }

    fn tree(&self) -> std::sync::MutexGuard<'_, Tree> {
        self.tree.lock().unwrap()
    }

    pub fn add_folder(&self, parent: &str, title: &str) -> FolderEntry {
        let mut tree = self.tree();
        let id = tree.insert(parent, title, None);
        match tree.entity(&id) {
            Some(Entity::Folder(folder)) => folder,
            _ => unreachable!(),
        }
    }

    pub fn add_file(&self, parent: &str, title: &str, data: &[u8]) -> Entity {
        let mut tree = self.tree();
        let id = tree.insert(parent, title, Some(data.to_vec()));
        tree.entity(&id).unwrap()
    }

    pub fn content_of(&self, parent: &str, title: &str) -> Option<Vec<u8>> {
        let tree = self.tree();
        let id = tree.child(parent, title)?;
        tree.nodes.get(&id)?.data.clone()
    }

    pub fn child_id(&self, parent: &str, title: &str) -> Option<String> {
        self.tree().child(parent, title)
    }

    /// Transfers of `title` fail with a per-item error
    pub fn fail_on(&self, title: &str) {
        self.tree().failing.insert(title.to_string());
    }

    /// Transfers of `title` fail like a broken server-side job
    pub fn fail_fatally_on(&self, title: &str) {
        self.tree().fatal.insert(title.to_string());
    }

    pub fn gate_on(&self, title: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.tree().gates.insert(title.to_string(), gate.clone());
        gate
    }

    /// Transfers and uploads of a gated title wait here until released
    async fn pass_gate(&self, title: &str) {
        let gate = self.tree().gates.get(title).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl FileProvider for MemoryProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    fn id(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn root_folder(&self) -> FolderEntry {
        folder_entry("/", None)
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
        Ok(r#"{"type":"local","id":"memory"}"#.to_string())
    }

    fn copy_provider(&self) -> Result<Box<dyn FileProvider>, ProviderError> {
        Err(ProviderError::Unsupported("copy of memory provider".to_string()))
    }

    async fn is_reachable(&mut self) -> Result<(), ProviderError> {
        self.user_info().await.map(|_| ())
    }

    async fn user_info(&mut self) -> Result<User, ProviderError> {
        let user = User::new("tester", "Tester");
        self.user = Some(user.clone());
        Ok(user)
    }

    async fn children(&self, folder: &FolderEntry) -> Result<Vec<Entity>, ProviderError> {
        let tree = self.tree();
        Ok(tree
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == folder.meta.id)
            .filter_map(|(id, _)| tree.entity(id))
            .collect())
    }

    async fn rename(&self, entity: &Entity, new_name: &str) -> Result<Entity, ProviderError> {
        let mut tree = self.tree();
        let title = naming::renamed_title(entity.title(), new_name, entity.is_folder());
        let node = tree
            .nodes
            .get(entity.id())
            .ok_or_else(|| ProviderError::NotFound(entity.id().to_string()))?;
        if tree.child(&node.parent, &title).is_some() {
            return Err(ProviderError::NameConflict(title));
        }
        if let Some(node) = tree.nodes.get_mut(entity.id()) {
            node.title = title;
        }
        tree.entity(entity.id())
            .ok_or_else(|| ProviderError::NotFound(entity.id().to_string()))
    }

    async fn create_folder(&self, parent: &FolderEntry, name: &str) -> Result<FolderEntry, ProviderError> {
        let mut tree = self.tree();
        if tree.child(&parent.meta.id, name).is_some() {
            return Err(ProviderError::NameConflict(name.to_string()));
        }
        let id = tree.insert(&parent.meta.id, name, None);
        match tree.entity(&id) {
            Some(Entity::Folder(folder)) => Ok(folder),
            _ => Err(ProviderError::NotFound(id)),
        }
    }

    async fn download(&self, file: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        self.tree()
            .nodes
            .get(&file.meta.id)
            .and_then(|n| n.data.clone())
            .ok_or_else(|| ProviderError::NotFound(file.meta.id.clone()))
    }

    async fn upload(&self, parent: &FolderEntry, name: &str, data: Vec<u8>, overwrite: bool)
        -> Result<FileEntry, ProviderError> {
        self.pass_gate(name).await;
        let mut tree = self.tree();
        let id = match tree.child(&parent.meta.id, name) {
            Some(_) if !overwrite => return Err(ProviderError::NameConflict(name.to_string())),
            Some(existing) => {
                if let Some(node) = tree.nodes.get_mut(&existing) {
                    node.data = Some(data);
                }
                existing
            }
            None => tree.insert(&parent.meta.id, name, Some(data)),
        };
        match tree.entity(&id) {
            Some(Entity::File(file)) => Ok(file),
            _ => Err(ProviderError::NotFound(id)),
        }
    }

    async fn delete_item(&self, entity: &Entity, _mode: DeleteMode) -> Result<(), ProviderError> {
        let mut tree = self.tree();
        if !tree.nodes.contains_key(entity.id()) {
            return Err(ProviderError::NotFound(entity.id().to_string()));
        }
        tree.remove_tree(entity.id());
        Ok(())
    }

    async fn transfer_item(
        &self,
        item: &Entity,
        dest: &FolderEntry,
        mode: TransferMode,
        resolution: ConflictResolution,
    ) -> Result<ItemOutcome, ProviderError> {
        self.pass_gate(item.title()).await;

        let mut tree = self.tree();
        if tree.fatal.contains(item.title()) {
            return Err(ProviderError::OperationFailed(format!("job for {} failed", item.title())));
        }
        if tree.failing.contains(item.title()) {
            return Err(ProviderError::ServerError(format!("cannot transfer {}", item.title())));
        }

        let mut title = item.title().to_string();
        if let Some(existing) = tree.child(&dest.meta.id, &title) {
            match resolution {
                ConflictResolution::Skip => return Ok(ItemOutcome::Skipped),
                ConflictResolution::Overwrite => tree.remove_tree(&existing),
                ConflictResolution::Duplicate => {
                    let parent = dest.meta.id.clone();
                    let taken: Vec<String> = tree
                        .nodes
                        .values()
                        .filter(|n| n.parent == parent)
                        .map(|n| n.title.clone())
                        .collect();
                    title = naming::unique_name(&title, |name| taken.iter().any(|t| t == name));
                }
            }
        }

        let id = match mode {
            TransferMode::Copy => tree
                .copy_tree(item.id(), &dest.meta.id, &title)
                .ok_or_else(|| ProviderError::NotFound(item.id().to_string()))?,
            TransferMode::Move => {
                let node = tree
                    .nodes
                    .get_mut(item.id())
                    .ok_or_else(|| ProviderError::NotFound(item.id().to_string()))?;
                node.parent = dest.meta.id.clone();
                node.title = title;
                item.id().to_string()
            }
        };
        tree.entity(&id)
            .map(ItemOutcome::Transferred)
            .ok_or(ProviderError::NotFound(id))
    }
}
